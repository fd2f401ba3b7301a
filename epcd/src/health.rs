//! Health evaluation of promoted states.
//!
//! Health is read from the Argo CD Applications named by the Environment's
//! health checks and collapsed into one normalized verdict. Evaluation
//! never fails: an unreachable or missing Application degrades the verdict
//! to Unknown with an issue description.

use async_trait::async_trait;
use std::sync::Arc;

use epc_common::{EnvironmentState, Health, HealthChecks, HealthStatus, ObjectMeta};

use crate::store::{AppHealthState, Application, ObjectStore};

/// Evaluates the health of a promoted state.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check_health(
        &self,
        meta: &ObjectMeta,
        state: &EnvironmentState,
        checks: &HealthChecks,
    ) -> Health;
}

/// Argo CD-backed health checker.
pub struct ArgoCdHealthChecker {
    store: Arc<dyn ObjectStore>,
}

impl ArgoCdHealthChecker {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

/// Verdict for a single Application, before aggregation.
fn evaluate_app(app: &Application, state: &EnvironmentState) -> (HealthStatus, Option<String>) {
    let qualified = format!("{}/{}", app.metadata.namespace, app.metadata.name);

    // An Application synced to some other revision says nothing about this
    // state's rollout yet.
    if let Some(commit) = state.commit_for_repo(&app.spec.source.repo_url) {
        if app.status.sync.revision != commit.id {
            return (
                HealthStatus::Progressing,
                Some(format!(
                    "Argo CD Application {qualified} is not synced to revision {}",
                    commit.id
                )),
            );
        }
    }

    match app.status.health.status {
        AppHealthState::Healthy => (HealthStatus::Healthy, None),
        AppHealthState::Degraded => {
            let detail = app
                .status
                .health
                .message
                .clone()
                .unwrap_or_else(|| "no detail reported".to_string());
            (
                HealthStatus::Degraded,
                Some(format!("Argo CD Application {qualified} is degraded: {detail}")),
            )
        }
        AppHealthState::Progressing | AppHealthState::Suspended => (
            HealthStatus::Progressing,
            Some(format!("Argo CD Application {qualified} is still progressing")),
        ),
        AppHealthState::Missing | AppHealthState::Unknown => (
            HealthStatus::Unknown,
            Some(format!(
                "Argo CD Application {qualified} reports no usable health"
            )),
        ),
    }
}

/// Collapse per-app verdicts: any Degraded wins, then Unknown, then
/// Progressing; Healthy only when every app is healthy.
fn worst_of(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    fn rank(status: HealthStatus) -> u8 {
        match status {
            HealthStatus::Degraded => 3,
            HealthStatus::Unknown => 2,
            HealthStatus::Progressing => 1,
            HealthStatus::Healthy => 0,
        }
    }
    if rank(b) > rank(a) { b } else { a }
}

#[async_trait]
impl HealthChecker for ArgoCdHealthChecker {
    async fn check_health(
        &self,
        meta: &ObjectMeta,
        state: &EnvironmentState,
        checks: &HealthChecks,
    ) -> Health {
        if checks.argocd_app_checks.is_empty() {
            return Health::unknown("no health checks configured");
        }

        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();
        for check in &checks.argocd_app_checks {
            let namespace = check
                .app_namespace
                .as_deref()
                .unwrap_or(meta.namespace.as_str());
            let (app_status, issue) = match self
                .store
                .get_application(namespace, &check.app_name)
                .await
            {
                Ok(Some(app)) => evaluate_app(&app, state),
                Ok(None) => (
                    HealthStatus::Unknown,
                    Some(format!(
                        "Argo CD Application {namespace}/{} not found",
                        check.app_name
                    )),
                ),
                Err(err) => (
                    HealthStatus::Unknown,
                    Some(format!(
                        "error finding Argo CD Application {namespace}/{}: {err}",
                        check.app_name
                    )),
                ),
            };
            status = worst_of(status, app_status);
            if let Some(issue) = issue {
                issues.push(issue);
            }
        }
        Health { status, issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epc_common::{ArgoCdAppCheck, GitCommit};
    use crate::store::{
        ApplicationHealthStatus, ApplicationSource, ApplicationSpec, ApplicationStatus,
        ApplicationSyncStatus, InMemoryObjectStore,
    };

    fn meta() -> ObjectMeta {
        ObjectMeta {
            name: "prod".to_string(),
            namespace: "apps".to_string(),
        }
    }

    fn checks() -> HealthChecks {
        HealthChecks {
            argocd_app_checks: vec![ArgoCdAppCheck {
                app_name: "web".to_string(),
                app_namespace: None,
            }],
        }
    }

    fn state(commit: &str) -> EnvironmentState {
        EnvironmentState {
            commits: vec![GitCommit {
                repo_url: "https://git.example.com/config.git".to_string(),
                id: commit.to_string(),
            }],
            ..Default::default()
        }
    }

    fn app(health: AppHealthState, synced_revision: &str) -> Application {
        Application {
            metadata: ObjectMeta {
                name: "web".to_string(),
                namespace: "apps".to_string(),
            },
            spec: ApplicationSpec {
                source: ApplicationSource {
                    repo_url: "https://git.example.com/config.git".to_string(),
                    ..Default::default()
                },
            },
            status: ApplicationStatus {
                sync: ApplicationSyncStatus {
                    revision: synced_revision.to_string(),
                    ..Default::default()
                },
                health: ApplicationHealthStatus {
                    status: health,
                    message: None,
                },
            },
        }
    }

    async fn checker_with(app: Option<Application>) -> ArgoCdHealthChecker {
        let store = Arc::new(InMemoryObjectStore::new());
        if let Some(app) = app {
            store.put_application(app).await;
        }
        ArgoCdHealthChecker::new(store)
    }

    #[tokio::test]
    async fn synced_healthy_app_is_healthy() {
        let checker = checker_with(Some(app(AppHealthState::Healthy, "abc"))).await;
        let health = checker.check_health(&meta(), &state("abc"), &checks()).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.issues.is_empty());
    }

    #[tokio::test]
    async fn unsynced_app_is_progressing() {
        let checker = checker_with(Some(app(AppHealthState::Healthy, "old"))).await;
        let health = checker.check_health(&meta(), &state("abc"), &checks()).await;
        assert_eq!(health.status, HealthStatus::Progressing);
        assert_eq!(health.issues.len(), 1);
        assert!(health.issues[0].contains("not synced to revision abc"));
    }

    #[tokio::test]
    async fn degraded_app_is_degraded() {
        let checker = checker_with(Some(app(AppHealthState::Degraded, "abc"))).await;
        let health = checker.check_health(&meta(), &state("abc"), &checks()).await;
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn missing_app_is_unknown_not_an_error() {
        let checker = checker_with(None).await;
        let health = checker.check_health(&meta(), &state("abc"), &checks()).await;
        assert_eq!(health.status, HealthStatus::Unknown);
        assert!(health.issues[0].contains("apps/web not found"));
    }

    #[tokio::test]
    async fn no_configured_checks_is_unknown() {
        let checker = checker_with(None).await;
        let health = checker
            .check_health(&meta(), &state("abc"), &HealthChecks::default())
            .await;
        assert_eq!(health.status, HealthStatus::Unknown);
        assert_eq!(health.issues, vec!["no health checks configured".to_string()]);
    }

    #[test]
    fn worst_of_ranks_degraded_over_unknown_over_progressing() {
        assert_eq!(
            worst_of(HealthStatus::Unknown, HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            worst_of(HealthStatus::Progressing, HealthStatus::Unknown),
            HealthStatus::Unknown
        );
        assert_eq!(
            worst_of(HealthStatus::Healthy, HealthStatus::Progressing),
            HealthStatus::Progressing
        );
    }
}
