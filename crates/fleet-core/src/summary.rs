//! Post-build summary: version and size before and after, per service.

use serde::Serialize;

use crate::domain::version::VersionCore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub service: String,
    pub before: VersionCore,
    pub after: VersionCore,
    pub size_before: Option<u64>,
    pub size_after: Option<u64>,
}

impl SummaryRow {
    /// Size change in bytes, when both sizes are known.
    pub fn size_delta(&self) -> Option<i64> {
        Some(self.size_after? as i64 - self.size_before? as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub rows: Vec<SummaryRow>,
}

impl BuildSummary {
    pub fn from_rows(rows: Vec<SummaryRow>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One plain line per service.
    pub fn render(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(|r| r.service.len())
            .max()
            .unwrap_or(0);
        let mut out = String::new();
        for row in &self.rows {
            let size = match (row.size_before, row.size_after) {
                (_, None) => "size unknown".to_string(),
                (None, Some(after)) => format!("{} (new)", human_size(after)),
                (Some(before), Some(after)) => {
                    let delta = after as i64 - before as i64;
                    let sign = if delta < 0 { "-" } else { "+" };
                    format!(
                        "{} -> {} ({sign}{})",
                        human_size(before),
                        human_size(after),
                        human_size(delta.unsigned_abs())
                    )
                }
            };
            out.push_str(&format!(
                "{:<width$}  {} -> {}  {}\n",
                row.service, row.before, row.after, size
            ));
        }
        out
    }
}

/// Binary-prefixed size with one decimal, e.g. `4.2 MiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(service: &str, before: Option<u64>, after: Option<u64>) -> SummaryRow {
        SummaryRow {
            service: service.to_string(),
            before: VersionCore::new(1, 2, 3),
            after: VersionCore::new(1, 3, 0),
            size_before: before,
            size_after: after,
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_render_lines() {
        let summary = BuildSummary::from_rows(vec![
            row("gateway", Some(2048), Some(3072)),
            row("ui", None, Some(512)),
            row("billing", Some(4096), Some(2048)),
        ]);
        let text = summary.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "gateway  1.2.3 -> 1.3.0  2.0 KiB -> 3.0 KiB (+1.0 KiB)");
        assert_eq!(lines[1], "ui       1.2.3 -> 1.3.0  512 B (new)");
        assert!(lines[2].ends_with("(-2.0 KiB)"));
    }

    #[test]
    fn test_size_delta() {
        assert_eq!(row("a", Some(10), Some(4)).size_delta(), Some(-6));
        assert_eq!(row("a", None, Some(4)).size_delta(), None);
    }
}
