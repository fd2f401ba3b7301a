//! The sync orchestrator: one reconciliation pass per Environment.
//!
//! A pass resolves the latest observable state, decides novelty and
//! auto-promotion eligibility, and conditionally executes promotion. The
//! ordering invariant: availability bookkeeping is committed before
//! promotion is attempted, and promotion history is only updated after
//! promotion unambiguously succeeds. A failed observation leaves the
//! status exactly as it was.

use std::sync::Arc;
use tracing::{debug, info};

use epc_common::{
    Environment, EnvironmentState, EnvironmentStatus, PromotionMechanisms, ReconcileError,
};

use crate::freshness;
use crate::health::HealthChecker;
use crate::promote::Promoter;
use crate::state::StateSource;

/// Result of one reconciliation pass: the status to persist, plus the
/// error when observation or promotion broke partway. Availability updates
/// committed before the failure are reflected in `status` either way.
#[derive(Debug)]
pub struct SyncOutcome {
    pub status: EnvironmentStatus,
    pub error: Option<ReconcileError>,
}

impl SyncOutcome {
    fn ok(status: EnvironmentStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn failed(status: EnvironmentStatus, error: impl Into<ReconcileError>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }
}

/// Drives reconciliation for Environments. All pluggable behavior is
/// injected as trait objects; production wiring binds the remote-backed
/// implementations, tests bind stand-ins.
pub struct EnvironmentReconciler {
    state_source: Arc<dyn StateSource>,
    promoter: Arc<dyn Promoter>,
    health_checker: Arc<dyn HealthChecker>,
}

impl EnvironmentReconciler {
    pub fn new(
        state_source: Arc<dyn StateSource>,
        promoter: Arc<dyn Promoter>,
        health_checker: Arc<dyn HealthChecker>,
    ) -> Self {
        Self {
            state_source,
            promoter,
            health_checker,
        }
    }

    /// Re-evaluate and annotate the health of the most recently promoted
    /// state. Returns the updated status, or `None` when there is nothing
    /// to annotate or the verdict is unchanged. Runs as its own status
    /// commit, separate from [`sync`](Self::sync).
    pub async fn refresh_health(&self, env: &Environment) -> Option<EnvironmentStatus> {
        let checks = env.spec.health_checks.as_ref()?;
        let current = env.status.states.first()?.clone();
        let health = self
            .health_checker
            .check_health(&env.metadata, &current, checks)
            .await;
        if current.health.as_ref() == Some(&health) {
            return None;
        }
        debug!(
            "health of {} state {} is now {}",
            env.key(),
            current.id,
            health.status
        );
        let mut status = env.status.clone();
        if let Some(state) = status.states.first_mut() {
            state.health = Some(health);
        }
        Some(status)
    }

    /// One pass of the promotion state machine.
    pub async fn sync(&self, env: &Environment) -> SyncOutcome {
        let status = env.status.clone();

        let Some(subscriptions) = env.spec.subscriptions.as_ref().filter(|s| !s.is_empty())
        else {
            // Nothing to observe; the pass is a no-op.
            return SyncOutcome::ok(status);
        };

        let (status, target) = if let Some(repos) = &subscriptions.repos {
            match self
                .state_source
                .latest_state_from_repos(&env.metadata.namespace, repos)
                .await
            {
                Err(err) => return SyncOutcome::failed(status, err),
                Ok(None) => {
                    debug!("{}: nothing observable yet", env.key());
                    return SyncOutcome::ok(status);
                }
                Ok(Some(candidate)) => {
                    if !freshness::is_new_state(&status, &candidate) {
                        debug!("{}: state {} is not new", env.key(), candidate.id);
                        return SyncOutcome::ok(status);
                    }
                    let mut status = status;
                    status.available_states.push(candidate.clone());
                    (status, candidate)
                }
            }
        } else {
            match self
                .state_source
                .available_states_from_upstream(&subscriptions.upstream_envs)
                .await
            {
                Err(err) => return SyncOutcome::failed(status, err),
                Ok(states) => {
                    let mut status = status;
                    status.available_states.replace(states);
                    if !freshness::upstream_eligible(&status.available_states) {
                        debug!(
                            "{}: {} upstream states, not auto-promotion eligible",
                            env.key(),
                            status.available_states.len()
                        );
                        return SyncOutcome::ok(status);
                    }
                    let Some(target) = status.available_states.first().cloned() else {
                        return SyncOutcome::ok(status);
                    };
                    (status, target)
                }
            }
        };

        if !env.spec.enable_auto_promotion {
            debug!("{}: auto-promotion disabled", env.key());
            return SyncOutcome::ok(status);
        }

        self.execute_promotion(env, status, target).await
    }

    async fn execute_promotion(
        &self,
        env: &Environment,
        mut status: EnvironmentStatus,
        target: EnvironmentState,
    ) -> SyncOutcome {
        let mechanisms = env
            .spec
            .promotion_mechanisms
            .clone()
            .unwrap_or_else(PromotionMechanisms::default);
        match self
            .promoter
            .promote(&env.metadata, &mechanisms, target)
            .await
        {
            Ok(promoted) => {
                info!("{}: promoted state {}", env.key(), promoted.id);
                status.states.push(promoted);
                SyncOutcome::ok(status)
            }
            // Availability stays recorded; history is not touched.
            Err(err) => SyncOutcome::failed(status, err),
        }
    }
}
