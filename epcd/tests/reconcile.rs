//! Reconciler behavior under stand-in collaborators.
//!
//! Each case builds an Environment, binds stub state sources / promoters /
//! health checkers, runs one sync pass, and asserts on the resulting
//! status and error.

use async_trait::async_trait;
use std::sync::Arc;

use epc_common::{
    Environment, EnvironmentSpec, EnvironmentState, EnvironmentStatus, EnvironmentSubscription,
    GitCommit, Health, HealthChecks, HealthStatus, Image, MechanismKind, ObjectMeta,
    PromotionError, PromotionMechanisms, ReconcileError, RepoSubscriptions, StateStack,
    Subscriptions, SyncError,
};
use epcd::health::HealthChecker;
use epcd::promote::Promoter;
use epcd::reconciler::EnvironmentReconciler;
use epcd::state::StateSource;

// ── Stand-ins ──────────────────────────────────────────────────────────────

type RepoResult = Result<Option<EnvironmentState>, String>;
type UpstreamResult = Result<Vec<EnvironmentState>, String>;

/// State source returning canned results.
struct StubSource {
    from_repos: RepoResult,
    from_upstream: UpstreamResult,
}

impl Default for StubSource {
    fn default() -> Self {
        Self {
            from_repos: Ok(None),
            from_upstream: Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl StateSource for StubSource {
    async fn latest_state_from_repos(
        &self,
        _namespace: &str,
        _subscriptions: &RepoSubscriptions,
    ) -> Result<Option<EnvironmentState>, SyncError> {
        self.from_repos
            .clone()
            .map_err(|msg| SyncError::Git(anyhow::anyhow!(msg)))
    }

    async fn available_states_from_upstream(
        &self,
        _subscriptions: &[EnvironmentSubscription],
    ) -> Result<Vec<EnvironmentState>, SyncError> {
        self.from_upstream
            .clone()
            .map_err(|msg| SyncError::Upstream(anyhow::anyhow!(msg)))
    }
}

/// Promoter that succeeds by returning the target state unchanged, or
/// fails with a canned error.
struct StubPromoter {
    fail_with: Option<String>,
}

impl StubPromoter {
    fn succeeding() -> Self {
        Self { fail_with: None }
    }

    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl Promoter for StubPromoter {
    async fn promote(
        &self,
        _meta: &ObjectMeta,
        _mechanisms: &PromotionMechanisms,
        target_state: EnvironmentState,
    ) -> Result<EnvironmentState, PromotionError> {
        match &self.fail_with {
            Some(message) => Err(PromotionError::new(
                MechanismKind::GitKustomize,
                anyhow::anyhow!(message.clone()),
            )),
            None => Ok(target_state),
        }
    }
}

/// Health checker returning a fixed verdict.
struct StubHealth(HealthStatus);

#[async_trait]
impl HealthChecker for StubHealth {
    async fn check_health(
        &self,
        _meta: &ObjectMeta,
        _state: &EnvironmentState,
        _checks: &HealthChecks,
    ) -> Health {
        Health {
            status: self.0,
            issues: Vec::new(),
        }
    }
}

fn reconciler(source: StubSource, promoter: StubPromoter) -> EnvironmentReconciler {
    EnvironmentReconciler::new(
        Arc::new(source),
        Arc::new(promoter),
        Arc::new(StubHealth(HealthStatus::Healthy)),
    )
}

// ── Fixtures ───────────────────────────────────────────────────────────────

fn fake_commit() -> GitCommit {
    GitCommit {
        repo_url: "fake-url".to_string(),
        id: "fake-commit".to_string(),
    }
}

fn fake_image() -> Image {
    Image {
        repo_url: "fake-url".to_string(),
        tag: "fake-tag".to_string(),
    }
}

fn fake_state() -> EnvironmentState {
    EnvironmentState {
        commits: vec![fake_commit()],
        images: vec![fake_image()],
        ..Default::default()
    }
}

fn environment(spec: EnvironmentSpec, status: EnvironmentStatus) -> Environment {
    Environment {
        metadata: ObjectMeta {
            name: "foo".to_string(),
            namespace: "bar".to_string(),
        },
        spec,
        status,
    }
}

fn repo_spec(auto_promotion: bool) -> EnvironmentSpec {
    EnvironmentSpec {
        subscriptions: Some(Subscriptions {
            repos: Some(RepoSubscriptions::default()),
            upstream_envs: Vec::new(),
        }),
        promotion_mechanisms: Some(PromotionMechanisms::default()),
        enable_auto_promotion: auto_promotion,
        health_checks: Some(HealthChecks::default()),
    }
}

fn upstream_spec() -> EnvironmentSpec {
    EnvironmentSpec {
        subscriptions: Some(Subscriptions {
            repos: None,
            upstream_envs: vec![EnvironmentSubscription {
                name: "fake-name".to_string(),
                namespace: "fake-namespace".to_string(),
            }],
        }),
        promotion_mechanisms: Some(PromotionMechanisms::default()),
        enable_auto_promotion: false,
        health_checks: Some(HealthChecks::default()),
    }
}

// ── Sync state machine ─────────────────────────────────────────────────────

#[tokio::test]
async fn no_subscriptions_is_a_noop() {
    let spec = EnvironmentSpec {
        subscriptions: Some(Subscriptions::default()),
        promotion_mechanisms: Some(PromotionMechanisms::default()),
        health_checks: Some(HealthChecks::default()),
        enable_auto_promotion: false,
    };
    let env = environment(spec, EnvironmentStatus::default());

    let outcome = reconciler(StubSource::default(), StubPromoter::succeeding())
        .sync(&env)
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status, env.status);
}

#[tokio::test]
async fn repo_fetch_error_leaves_status_untouched() {
    let source = StubSource {
        from_repos: Err("something went wrong".to_string()),
        ..Default::default()
    };
    let env = environment(repo_spec(false), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    let err = outcome.error.expect("sync should fail");
    assert!(err.to_string().contains("something went wrong"));
    assert!(matches!(err, ReconcileError::Sync(_)));
    assert_eq!(outcome.status, env.status);
}

#[tokio::test]
async fn no_observable_state_is_a_noop() {
    let source = StubSource {
        from_repos: Ok(None),
        ..Default::default()
    };
    let env = environment(repo_spec(false), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status, env.status);
}

#[tokio::test]
async fn known_state_is_not_new_even_with_different_health() {
    // The same materials are already recorded both as available and as
    // promoted (with health attached); observing them again changes
    // nothing.
    let mut promoted = fake_state();
    promoted.health = Some(Health {
        status: HealthStatus::Healthy,
        issues: Vec::new(),
    });
    let initial = EnvironmentStatus {
        available_states: StateStack::from(vec![fake_state()]),
        states: StateStack::from(vec![promoted]),
        error: None,
    };
    let source = StubSource {
        from_repos: Ok(Some(fake_state())),
        ..Default::default()
    };
    let env = environment(repo_spec(false), initial);

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status, env.status);
}

#[tokio::test]
async fn upstream_resolution_error_leaves_status_untouched() {
    let source = StubSource {
        from_upstream: Err("something went wrong".to_string()),
        ..Default::default()
    };
    let env = environment(upstream_spec(), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    let err = outcome.error.expect("sync should fail");
    assert!(err.to_string().contains("something went wrong"));
    assert_eq!(outcome.status, env.status);
}

#[tokio::test]
async fn divergent_upstreams_update_availability_but_stop_there() {
    let source = StubSource {
        from_upstream: Ok(vec![EnvironmentState::default(), EnvironmentState::default()]),
        ..Default::default()
    };
    let env = environment(upstream_spec(), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status.available_states.len(), 2);
    // Everything else is unchanged.
    let mut stripped = outcome.status.clone();
    stripped.available_states = env.status.available_states.clone();
    assert_eq!(stripped, env.status);
}

#[tokio::test]
async fn promotion_error_preserves_availability_but_not_history() {
    let source = StubSource {
        from_repos: Ok(Some(fake_state())),
        ..Default::default()
    };
    let env = environment(repo_spec(true), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::failing("something went wrong"))
        .sync(&env)
        .await;

    let err = outcome.error.expect("sync should fail");
    assert!(err.to_string().contains("something went wrong"));
    assert!(matches!(err, ReconcileError::Promotion(_)));
    assert!(!outcome.status.available_states.is_empty());
    // Only availability changed.
    let mut stripped = outcome.status.clone();
    stripped.available_states = env.status.available_states.clone();
    assert_eq!(stripped, env.status);
}

#[tokio::test]
async fn successful_promotion_appends_history() {
    let source = StubSource {
        from_repos: Ok(Some(fake_state())),
        ..Default::default()
    };
    let env = environment(repo_spec(true), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status.available_states.len(), 1);
    assert_eq!(outcome.status.states.len(), 1);
    assert!(outcome.status.states.first().unwrap().same_materials(&fake_state()));
}

#[tokio::test]
async fn single_upstream_state_is_promoted_when_enabled() {
    let source = StubSource {
        from_upstream: Ok(vec![fake_state()]),
        ..Default::default()
    };
    let mut spec = upstream_spec();
    spec.enable_auto_promotion = true;
    let env = environment(spec, EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::succeeding()).sync(&env).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status.available_states.len(), 1);
    assert_eq!(outcome.status.states.len(), 1);
}

#[tokio::test]
async fn auto_promotion_disabled_stops_after_availability() {
    let source = StubSource {
        from_repos: Ok(Some(fake_state())),
        ..Default::default()
    };
    let env = environment(repo_spec(false), EnvironmentStatus::default());

    let outcome = reconciler(source, StubPromoter::failing("must not be called"))
        .sync(&env)
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.status.available_states.len(), 1);
    assert!(outcome.status.states.is_empty());
}

// ── Health annotation ──────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_health_annotates_most_recent_promoted_state() {
    let initial = EnvironmentStatus {
        states: StateStack::from(vec![fake_state()]),
        ..Default::default()
    };
    let env = environment(repo_spec(false), initial);

    let reconciler = EnvironmentReconciler::new(
        Arc::new(StubSource::default()),
        Arc::new(StubPromoter::succeeding()),
        Arc::new(StubHealth(HealthStatus::Degraded)),
    );

    let status = reconciler
        .refresh_health(&env)
        .await
        .expect("health should be annotated");
    assert_eq!(
        status.states.first().unwrap().health.as_ref().unwrap().status,
        HealthStatus::Degraded
    );
    // Materials are untouched by annotation.
    assert!(status.states.first().unwrap().same_materials(&fake_state()));
}

#[tokio::test]
async fn refresh_health_is_idempotent_for_unchanged_verdict() {
    let mut promoted = fake_state();
    promoted.health = Some(Health {
        status: HealthStatus::Healthy,
        issues: Vec::new(),
    });
    let initial = EnvironmentStatus {
        states: StateStack::from(vec![promoted]),
        ..Default::default()
    };
    let env = environment(repo_spec(false), initial);

    let reconciler = EnvironmentReconciler::new(
        Arc::new(StubSource::default()),
        Arc::new(StubPromoter::succeeding()),
        Arc::new(StubHealth(HealthStatus::Healthy)),
    );

    assert!(reconciler.refresh_health(&env).await.is_none());
}

#[tokio::test]
async fn refresh_health_skips_environments_without_promoted_states() {
    let env = environment(repo_spec(false), EnvironmentStatus::default());
    let reconciler = EnvironmentReconciler::new(
        Arc::new(StubSource::default()),
        Arc::new(StubPromoter::succeeding()),
        Arc::new(StubHealth(HealthStatus::Healthy)),
    );
    assert!(reconciler.refresh_health(&env).await.is_none());
}
