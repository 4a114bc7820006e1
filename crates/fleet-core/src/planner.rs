//! Build planning.
//!
//! `major` and `minor` move the whole buildable fleet to one shared version;
//! `patch`/`auto` bump each changed service on its own. A component already at
//! `u64::MAX` cannot be bumped and is left out of the plan.

use serde::Serialize;
use tracing::{info, warn};

use fleet_exec::CommandRunner;

use crate::domain::service::ServiceDefinition;
use crate::domain::task::{BuildPlan, BuildTask, IncrementKind};
use crate::domain::version::VersionCore;
use crate::git;
use crate::resolver::{ResolvedVersion, VersionResolver};

/// What the planner needs to know about one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub definition: ServiceDefinition,
    pub current: VersionCore,
    pub has_changes: bool,
    pub source_present: bool,
}

/// Planner knobs taken from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub increment: IncrementKind,
    /// Rebuild every buildable service under patch semantics.
    pub force: bool,
    /// Also build the CLI entry point.
    pub include_source: bool,
}

impl ServiceState {
    fn buildable(&self, include_source: bool) -> bool {
        self.source_present
            && (self.definition.buildable_category()
                || (include_source && self.definition.is_cli()))
    }
}

/// Compute the build plan. Pure: no I/O.
pub fn plan(states: &[ServiceState], opts: PlanOptions) -> BuildPlan {
    let buildable: Vec<&ServiceState> = states
        .iter()
        .filter(|s| s.buildable(opts.include_source))
        .collect();

    let fleet_target = |increment: IncrementKind| -> Option<VersionCore> {
        let max_major = buildable.iter().map(|s| s.current.major).max()?;
        let max_minor = buildable.iter().map(|s| s.current.minor).max()?;
        let target = match increment {
            IncrementKind::Major => max_major.checked_add(1).map(|m| VersionCore::new(m, 0, 0)),
            IncrementKind::Minor => max_minor
                .checked_add(1)
                .map(|m| VersionCore::new(max_major, m, 0)),
            _ => return None,
        };
        if target.is_none() {
            warn!(increment = %increment, "fleet version cannot be incremented further");
        }
        target
    };

    let tasks: Vec<BuildTask> = match opts.increment {
        inc @ (IncrementKind::Major | IncrementKind::Minor) => match fleet_target(inc) {
            Some(target) => buildable
                .iter()
                .map(|s| BuildTask {
                    service: s.definition.clone(),
                    current: s.current,
                    target,
                })
                .collect(),
            None => Vec::new(),
        },
        IncrementKind::Patch | IncrementKind::Auto => buildable
            .iter()
            .filter(|s| opts.force || s.has_changes)
            .filter_map(|s| {
                let Some(target) = s.current.next_patch() else {
                    warn!(
                        service = %s.definition.id,
                        current = %s.current,
                        "patch number exhausted"
                    );
                    return None;
                };
                Some(BuildTask {
                    service: s.definition.clone(),
                    current: s.current,
                    target,
                })
            })
            .collect(),
    };

    BuildPlan {
        increment: opts.increment,
        release_type: opts.increment.release_type(),
        tasks,
    }
}

/// Gather [`ServiceState`] for every service.
///
/// Returns the per-source candidates alongside so callers can report them.
pub async fn survey(
    resolver: &VersionResolver,
    runner: &dyn CommandRunner,
    services: &[ServiceDefinition],
) -> Vec<(ServiceState, ResolvedVersion)> {
    let manifest = resolver.load_manifest().await;
    let mut states = Vec::with_capacity(services.len());

    for svc in services {
        let source_present = svc.source.is_dir();
        let resolved = resolver.candidates(&manifest, svc).await;
        let has_changes = if source_present {
            let build_output = svc.checkout_artifact(resolver.bin_dir());
            let status =
                git::has_uncommitted_changes(runner, &svc.source, build_output.as_deref()).await;
            match status {
                Ok(changed) => changed,
                Err(e) => {
                    warn!(service = %svc.id, error = %e, "cannot read git status; assuming clean");
                    false
                }
            }
        } else {
            false
        };
        states.push((
            ServiceState {
                definition: svc.clone(),
                current: resolved.resolved,
                has_changes,
                source_present,
            },
            resolved,
        ));
    }

    info!(services = states.len(), "fleet surveyed");
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{test_service, Category};

    fn state(id: &str, category: Category, v: (u64, u64, u64), changed: bool) -> ServiceState {
        ServiceState {
            definition: test_service(id, category, format!("/src/{id}")),
            current: VersionCore::new(v.0, v.1, v.2),
            has_changes: changed,
            source_present: true,
        }
    }

    fn opts(increment: IncrementKind) -> PlanOptions {
        PlanOptions {
            increment,
            ..Default::default()
        }
    }

    fn fleet() -> Vec<ServiceState> {
        vec![
            state("gateway", Category::Core, (1, 2, 3), true),
            state("billing", Category::Backend, (1, 2, 1), false),
            state("console", Category::Frontend, (0, 9, 4), false),
            state("fleet", Category::Cli, (3, 0, 0), true),
            state("cache", Category::Infra, (7, 0, 0), true),
        ]
    }

    #[test]
    fn major_syncs_whole_buildable_fleet() {
        let p = plan(&fleet(), opts(IncrementKind::Major));
        assert_eq!(p.service_ids(), vec!["gateway", "billing", "console"]);
        for t in &p.tasks {
            assert_eq!(t.target, VersionCore::new(2, 0, 0));
        }
        assert_eq!(p.release_type, fleet_state::ReleaseType::Major);
    }

    #[test]
    fn minor_uses_fleet_maxima() {
        let p = plan(&fleet(), opts(IncrementKind::Minor));
        assert_eq!(p.tasks.len(), 3);
        for t in &p.tasks {
            assert_eq!(t.target, VersionCore::new(1, 10, 0));
        }
    }

    #[test]
    fn minor_scenario_two_services() {
        let states = vec![
            state("a", Category::Core, (1, 2, 3), true),
            state("b", Category::Backend, (1, 2, 1), true),
        ];
        let p = plan(&states, opts(IncrementKind::Minor));
        let targets: Vec<_> = p.tasks.iter().map(|t| t.target.to_string()).collect();
        assert_eq!(targets, vec!["1.3.0", "1.3.0"]);
        assert_eq!(p.tasks[1].current, VersionCore::new(1, 2, 1));
    }

    #[test]
    fn auto_only_changed_services_bump_individually() {
        let p = plan(&fleet(), opts(IncrementKind::Auto));
        assert_eq!(p.service_ids(), vec!["gateway"]);
        assert_eq!(p.tasks[0].target, VersionCore::new(1, 2, 4));
    }

    #[test]
    fn unchanged_service_excluded_under_auto() {
        let states = vec![state("c", Category::Backend, (2, 0, 0), false)];
        let p = plan(&states, opts(IncrementKind::Auto));
        assert!(p.is_noop());
    }

    #[test]
    fn patch_without_changes_or_force_is_noop() {
        let states = vec![
            state("a", Category::Core, (1, 0, 0), false),
            state("b", Category::Frontend, (0, 1, 0), false),
        ];
        assert!(plan(&states, opts(IncrementKind::Patch)).is_noop());
    }

    #[test]
    fn force_rebuilds_all_buildable_with_patch_bumps() {
        let p = plan(
            &fleet(),
            PlanOptions {
                increment: IncrementKind::Auto,
                force: true,
                include_source: false,
            },
        );
        let targets: Vec<_> = p
            .tasks
            .iter()
            .map(|t| (t.service.id.as_str(), t.target.to_string()))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("gateway", "1.2.4".to_string()),
                ("billing", "1.2.2".to_string()),
                ("console", "0.9.5".to_string()),
            ]
        );
    }

    #[test]
    fn source_flag_adds_cli_but_never_infra() {
        let p = plan(
            &fleet(),
            PlanOptions {
                increment: IncrementKind::Auto,
                force: false,
                include_source: true,
            },
        );
        assert_eq!(p.service_ids(), vec!["gateway", "fleet"]);
        assert_eq!(p.tasks[1].target, VersionCore::new(3, 0, 1));

        let major = plan(
            &fleet(),
            PlanOptions {
                increment: IncrementKind::Major,
                force: false,
                include_source: true,
            },
        );
        assert!(major.tasks.iter().all(|t| t.target == VersionCore::new(4, 0, 0)));
        assert!(!major.service_ids().contains(&"cache"));
    }

    #[test]
    fn missing_source_is_not_buildable() {
        let mut states = fleet();
        states[0].source_present = false;
        let p = plan(&states, opts(IncrementKind::Major));
        assert!(!p.service_ids().contains(&"gateway"));
        // The absent service no longer contributes to the fleet maximum.
        assert!(p.tasks.iter().all(|t| t.target == VersionCore::new(2, 0, 0)));
    }

    #[test]
    fn exhausted_components_do_not_wrap() {
        let top = u64::MAX;
        let states = vec![
            state("gateway", Category::Core, (1, 2, top), true),
            state("billing", Category::Backend, (1, top, 0), true),
        ];
        let auto = plan(&states, opts(IncrementKind::Auto));
        assert_eq!(auto.service_ids(), vec!["billing"]);
        assert_eq!(auto.tasks[0].target, VersionCore::new(1, top, 1));

        assert!(plan(&states, opts(IncrementKind::Minor)).is_noop());
        let major = plan(&states, opts(IncrementKind::Major));
        assert!(major.tasks.iter().all(|t| t.target == VersionCore::new(2, 0, 0)));

        let maxed = vec![state("gateway", Category::Core, (top, 0, 0), true)];
        assert!(plan(&maxed, opts(IncrementKind::Major)).is_noop());
    }

    #[test]
    fn empty_fleet_major_is_noop() {
        let states = vec![state("cache", Category::Infra, (1, 0, 0), true)];
        assert!(plan(&states, opts(IncrementKind::Major)).is_noop());
    }
}
