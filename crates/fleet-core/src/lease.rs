//! Cross-invocation exclusivity.
//!
//! Only one process may mutate fleet state at a time. Waiting runs announce
//! themselves with a short-lived `waiting:<holder>` marker; the winner holds
//! `busy:fleet-build:<holder>` and keeps it alive from a heartbeat task.
//! Markers carry a TTL, so a crashed holder frees the fleet within seconds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_state::CoordinationStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinationConfig;
use crate::domain::error::{FleetError, Result};

pub const BUSY_KEY: &str = "busy:fleet-build";
pub const BUSY_PREFIX: &str = "busy:";
pub const IDLE_FLAG: &str = "system:idle";
pub const COOLDOWN_FLAG: &str = "system:cooldown_until";

/// Busy marker owned by `holder`.
pub fn busy_key(holder: &str) -> String {
    format!("{BUSY_KEY}:{holder}")
}

/// Why the lease is not yet available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
    Busy { key: String, holder: String },
    NotIdle(String),
    Cooldown(DateTime<Utc>),
}

/// Absent or truthy means idle.
fn idle_allows(flag: Option<&str>) -> bool {
    match flag.map(|v| v.trim().to_ascii_lowercase()) {
        None => true,
        Some(v) => matches!(v.as_str(), "" | "1" | "true" | "yes" | "idle"),
    }
}

/// RFC 3339 or unix seconds.
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

pub struct LeaseManager {
    store: Arc<dyn CoordinationStore>,
    holder: String,
    heartbeat: Duration,
    ttl: Duration,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn CoordinationStore>, holder: impl Into<String>) -> Self {
        Self {
            store,
            holder: holder.into(),
            heartbeat: Duration::from_secs(1),
            ttl: Duration::from_secs(5),
        }
    }

    pub fn from_config(
        store: Arc<dyn CoordinationStore>,
        holder: impl Into<String>,
        config: &CoordinationConfig,
    ) -> Self {
        Self::new(store, holder).with_timing(
            Duration::from_millis(config.heartbeat_ms),
            Duration::from_secs(config.ttl_secs),
        )
    }

    pub fn with_timing(mut self, heartbeat: Duration, ttl: Duration) -> Self {
        self.heartbeat = heartbeat;
        self.ttl = ttl;
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn waiting_key(&self) -> String {
        format!("waiting:{}", self.holder)
    }

    /// First condition currently blocking the lease, if any.
    pub async fn blocker(&self) -> Result<Option<Blocker>> {
        let busy = self.store.live_markers(BUSY_PREFIX).await?;
        if let Some(m) = busy.into_iter().find(|m| m.holder != self.holder) {
            return Ok(Some(Blocker::Busy {
                key: m.key,
                holder: m.holder,
            }));
        }

        let idle = self.store.flag(IDLE_FLAG).await?;
        if !idle_allows(idle.as_deref()) {
            return Ok(Some(Blocker::NotIdle(idle.unwrap_or_default())));
        }

        if let Some(raw) = self.store.flag(COOLDOWN_FLAG).await? {
            match parse_instant(&raw) {
                Some(until) if until > Utc::now() => return Ok(Some(Blocker::Cooldown(until))),
                Some(_) => {}
                None => warn!(value = %raw, "unparseable cooldown flag ignored"),
            }
        }
        Ok(None)
    }

    /// Wait until the fleet is free, then take the lease.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LeaseGuard> {
        let waiting = self.waiting_key();
        let mut announced = false;
        loop {
            if cancel.is_cancelled() {
                self.store.remove_marker(&waiting).await.ok();
                return Err(FleetError::Cancelled);
            }
            self.store.put_marker(&waiting, &self.holder, self.ttl).await?;

            match self.blocker().await? {
                None => {
                    if self.claim().await? {
                        break;
                    }
                    debug!("lost the race for the lease; waiting");
                }
                Some(blocker) => {
                    if !announced {
                        info!(holder = %self.holder, ?blocker, "waiting for the fleet to become free");
                        announced = true;
                    } else {
                        debug!(?blocker, "still waiting");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.store.remove_marker(&waiting).await.ok();
                    return Err(FleetError::Cancelled);
                }
                _ = tokio::time::sleep(self.heartbeat) => {}
            }
        }

        self.store.remove_marker(&waiting).await?;
        self.start_heartbeat()
    }

    /// Write our busy marker, then look again: if any other busy marker
    /// showed up in between, withdraw and keep waiting.
    async fn claim(&self) -> Result<bool> {
        let ours = busy_key(&self.holder);
        self.store.put_marker(&ours, &self.holder, self.ttl).await?;
        let contested = self
            .store
            .live_markers(BUSY_PREFIX)
            .await?
            .iter()
            .any(|m| m.holder != self.holder);
        if contested {
            self.store.remove_marker(&ours).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Take the lease without waiting (`--force`).
    pub async fn acquire_forced(&self) -> Result<LeaseGuard> {
        if let Some(blocker) = self.blocker().await? {
            warn!(?blocker, "forcing past an active lease");
        }
        self.store
            .put_marker(&busy_key(&self.holder), &self.holder, self.ttl)
            .await?;
        self.start_heartbeat()
    }

    fn start_heartbeat(&self) -> Result<LeaseGuard> {
        let stop = CancellationToken::new();
        let task = tokio::spawn(heartbeat(
            self.store.clone(),
            self.holder.clone(),
            self.heartbeat,
            self.ttl,
            stop.clone(),
        ));
        info!(holder = %self.holder, "lease acquired");
        Ok(LeaseGuard {
            store: self.store.clone(),
            holder: self.holder.clone(),
            stop,
            task: Some(task),
        })
    }
}

async fn heartbeat(
    store: Arc<dyn CoordinationStore>,
    holder: String,
    every: Duration,
    ttl: Duration,
    stop: CancellationToken,
) {
    let key = busy_key(&holder);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(every) => {}
        }
        if let Err(e) = store.put_marker(&key, &holder, ttl).await {
            warn!(error = %e, "lease heartbeat failed");
        }
    }
}

/// Held lease. Dropping it stops the heartbeat; the busy marker then expires
/// on its own. [`LeaseGuard::release`] removes it immediately, and only ever
/// touches this holder's markers.
pub struct LeaseGuard {
    store: Arc<dyn CoordinationStore>,
    holder: String,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LeaseGuard {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn release(mut self) -> Result<()> {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
        self.store.remove_marker(&busy_key(&self.holder)).await?;
        self.store
            .remove_marker(&format!("waiting:{}", self.holder))
            .await?;
        info!(holder = %self.holder, "lease released");
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
