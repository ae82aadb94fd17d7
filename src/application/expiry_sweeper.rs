//! ExpirySweeper - Background service that times out idle sessions.
//!
//! Each cycle times out sessions whose inactivity deadline passed more than
//! `grace` ago, purges lapsed idempotency entries, then prunes session locks
//! nobody is using. A session whose lock is held has a turn in flight and is
//! skipped until the next cycle.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 60s | How often to sweep |
//! | `grace` | 5s | Sessions past their deadline by less than this are left alone |
//!
//! ## Graceful Shutdown
//!
//! The service listens for a shutdown signal and runs one last sweep before
//! stopping. A failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use super::session_locks::SessionLocks;
use crate::config::SessionConfig;
use crate::domain::foundation::Timestamp;
use crate::ports::{CleanupReport, SessionStore, StoreError};

/// Configuration for the ExpirySweeper service.
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// How often to sweep.
    pub interval: Duration,

    /// How long past its deadline a session must be before it is swept, in seconds.
    pub grace_secs: u64,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            grace_secs: 5,
        }
    }
}

impl ExpirySweeperConfig {
    pub fn from_session_config(config: &SessionConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            grace_secs: config.sweep_grace_secs,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_grace_secs(mut self, grace_secs: u64) -> Self {
        self.grace_secs = grace_secs;
        self
    }
}

pub struct ExpirySweeper {
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn SessionStore>, locks: Arc<SessionLocks>) -> Self {
        Self::with_config(store, locks, ExpirySweeperConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn SessionStore>,
        locks: Arc<SessionLocks>,
        config: ExpirySweeperConfig,
    ) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// Sweeps on every tick until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        self.sweep_logged().await;
                        tracing::info!("expiry sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_logged().await;
                }
            }
        }
    }

    /// Runs exactly one sweep.
    pub async fn sweep_once(&self) -> Result<CleanupReport, StoreError> {
        let now = Timestamp::now();
        let grace = self.config.grace_secs;
        let mut report = CleanupReport::default();
        let mut busy = 0usize;

        for id in self.store.expired_sessions(now, grace).await? {
            let Some(_guard) = self.locks.try_acquire(id) else {
                busy += 1;
                continue;
            };
            if self.store.time_out_session(&id, now, grace).await? {
                report.timed_out.push(id);
            }
        }
        report.purged_idempotency = self.store.purge_idempotency(now).await?;
        let pruned = self.locks.prune();

        if report.is_empty() {
            tracing::debug!(pruned_locks = pruned, busy, "expiry sweep found nothing to do");
        } else {
            tracing::info!(
                timed_out = report.timed_out.len(),
                purged_idempotency = report.purged_idempotency,
                pruned_locks = pruned,
                busy,
                "expiry sweep completed"
            );
        }
        Ok(report)
    }

    async fn sweep_logged(&self) {
        if let Err(error) = self.sweep_once().await {
            tracing::warn!(%error, "expiry sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySessionStore;
    use crate::domain::conversation::ConversationSession;
    use crate::domain::dialogue::DialogueState;
    use crate::domain::foundation::{SessionId, UserId};
    use std::collections::BTreeMap;

    fn session_created_at(at: Timestamp, timeout_secs: u64) -> ConversationSession {
        ConversationSession::new_at(
            SessionId::new(),
            UserId::new("listener").unwrap(),
            10,
            timeout_secs,
            BTreeMap::new(),
            at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sweep_times_out_idle_sessions_only() {
        let store = Arc::new(InMemorySessionStore::new());
        let idle = session_created_at(Timestamp::now().minus_secs(120), 60);
        let fresh = session_created_at(Timestamp::now(), 60);
        store.create_session(&idle).await.unwrap();
        store.create_session(&fresh).await.unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), Arc::new(SessionLocks::new()));
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(report.timed_out, vec![*idle.id()]);
        let idle = store.get_session(idle.id()).await.unwrap().unwrap();
        assert_eq!(idle.state(), DialogueState::Timeout);
        assert!(!idle.is_active());
        assert!(store.get_session(fresh.id()).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn sweep_skips_sessions_with_a_turn_in_flight() {
        let store = Arc::new(InMemorySessionStore::new());
        let locks = Arc::new(SessionLocks::new());
        let idle = session_created_at(Timestamp::now().minus_secs(120), 60);
        store.create_session(&idle).await.unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), locks.clone());
        let turn = locks.acquire(*idle.id()).await;
        let report = sweeper.sweep_once().await.unwrap();
        assert!(report.timed_out.is_empty());
        assert!(store.get_session(idle.id()).await.unwrap().unwrap().is_active());

        drop(turn);
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.timed_out, vec![*idle.id()]);
    }

    #[tokio::test]
    async fn sweep_waits_out_the_grace_period() {
        let store = Arc::new(InMemorySessionStore::new());
        // Deadline passed 2 s ago.
        let recent = session_created_at(Timestamp::now().minus_secs(62), 60);
        store.create_session(&recent).await.unwrap();

        let sweeper = ExpirySweeper::with_config(
            store.clone(),
            Arc::new(SessionLocks::new()),
            ExpirySweeperConfig::default().with_grace_secs(30),
        );
        assert!(sweeper.sweep_once().await.unwrap().timed_out.is_empty());
        assert!(store.get_session(recent.id()).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn sweep_prunes_unused_locks() {
        let store = Arc::new(InMemorySessionStore::new());
        let locks = Arc::new(SessionLocks::new());
        drop(locks.acquire(SessionId::new()).await);

        let sweeper = ExpirySweeper::new(store, locks.clone());
        sweeper.sweep_once().await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(InMemorySessionStore::new());
        let sweeper = ExpirySweeper::with_config(
            store,
            Arc::new(SessionLocks::new()),
            ExpirySweeperConfig::default().with_interval(Duration::from_millis(10)),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sweeper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[test]
    fn config_follows_session_settings() {
        let config = ExpirySweeperConfig::from_session_config(&SessionConfig::default());
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.grace_secs, 5);
    }
}
