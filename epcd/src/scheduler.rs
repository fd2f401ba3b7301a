//! Reconcile scheduling: periodic ticks, per-Environment serialization.
//!
//! Passes for different Environments run concurrently; passes for the same
//! Environment are serialized through a per-key lock, because a pass reads
//! the prior status and then performs a non-atomic multi-step update.
//! Failures are logged and surfaced in the status; the next tick retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use epc_common::{events::names, EnvironmentKey, EventBus};
use serde_json::json;

use crate::reconciler::EnvironmentReconciler;
use crate::store::ObjectStore;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between reconcile ticks.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Drives reconciliation for every Environment in the store.
pub struct Scheduler {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<EnvironmentReconciler>,
    events: EventBus,
    config: SchedulerConfig,
    /// One lock per Environment identity; at most one pass in flight each.
    locks: Arc<RwLock<HashMap<EnvironmentKey, Arc<Mutex<()>>>>>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reconciler: Arc<EnvironmentReconciler>,
        events: EventBus,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            events,
            config,
            locks: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    async fn lock_for(&self, key: &EnvironmentKey) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(key) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Run one serialized reconciliation pass for `key`.
    pub async fn reconcile_once(&self, key: &EnvironmentKey) -> anyhow::Result<()> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let Some((namespace, name)) = key.as_str().split_once('/') else {
            anyhow::bail!("malformed environment key {key}");
        };
        let Some(mut env) = self.store.get_environment(namespace, name).await? else {
            debug!("environment {key} disappeared, skipping");
            return Ok(());
        };

        // Health annotation commits on its own, before the sync pass.
        if let Some(status) = self.reconciler.refresh_health(&env).await {
            self.store
                .patch_environment_status(namespace, name, status.clone())
                .await?;
            env.status = status;
        }

        let before_available = env.status.available_states.len();
        let before_promoted = env.status.states.len();

        let outcome = self.reconciler.sync(&env).await;
        let mut status = outcome.status;
        match &outcome.error {
            Some(err) => {
                warn!("reconciliation of {key} failed: {err}");
                status.error = Some(err.to_string());
                self.events.emit(
                    names::RECONCILE_FAILED,
                    key.as_str(),
                    &json!({ "error": err.to_string() }),
                );
            }
            None => {
                status.error = None;
            }
        }

        if status.available_states.len() != before_available
            || status
                .available_states
                .first()
                .map(|s| s.id.as_str())
                != env.status.available_states.first().map(|s| s.id.as_str())
        {
            if let Some(observed) = status.available_states.first() {
                self.events.emit(
                    names::STATE_OBSERVED,
                    key.as_str(),
                    &json!({ "state_id": observed.id }),
                );
            }
        }
        if status.states.len() > before_promoted {
            if let Some(promoted) = status.states.first() {
                self.events.emit(
                    names::PROMOTION_SUCCEEDED,
                    key.as_str(),
                    &json!({ "state_id": promoted.id }),
                );
            }
        }

        self.store
            .patch_environment_status(namespace, name, status)
            .await?;
        Ok(())
    }

    /// Start the periodic reconcile loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            *scheduler.running.write().await = true;
            let mut ticker = interval(scheduler.config.poll_interval);

            info!(
                "Reconcile scheduler started (interval: {:?})",
                scheduler.config.poll_interval
            );

            loop {
                ticker.tick().await;

                if !*scheduler.running.read().await {
                    info!("Reconcile scheduler stopping");
                    break;
                }

                let keys = match scheduler.store.list_environments().await {
                    Ok(keys) => keys,
                    Err(err) => {
                        warn!("failed to list environments: {err}");
                        continue;
                    }
                };
                debug!("reconciling {} environments", keys.len());

                let mut passes = Vec::with_capacity(keys.len());
                for key in keys {
                    let scheduler = scheduler.clone();
                    passes.push(tokio::spawn(async move {
                        if let Err(err) = scheduler.reconcile_once(&key).await {
                            warn!("reconcile pass for {key} errored: {err}");
                        }
                    }));
                }
                for pass in passes {
                    let _ = pass.await;
                }
            }
        })
    }

    /// Stop the reconcile loop after the current tick.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}
