//! State aggregation: one snapshot per reconciliation.
//!
//! Two mutually exclusive modes. Repo subscriptions are polled through the
//! three fetchers and collapsed into a single fresh [`EnvironmentState`];
//! upstream subscriptions are resolved by reading each upstream
//! Environment's available states from the object store.

use async_trait::async_trait;
use std::sync::Arc;

use epc_common::{
    EnvironmentState, EnvironmentSubscription, RepoSubscriptions, SyncError,
};

use crate::fetchers::{ChartFetcher, CommitFetcher, ImageFetcher};
use crate::store::ObjectStore;

/// Source of observable states for an Environment.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Latest observable state of the repo subscriptions, or `None` when
    /// there is nothing observable yet (no subscriptions produced output).
    /// The first fetcher failure aborts, tagged with its subscription kind.
    async fn latest_state_from_repos(
        &self,
        namespace: &str,
        subscriptions: &RepoSubscriptions,
    ) -> Result<Option<EnvironmentState>, SyncError>;

    /// Concatenation of each upstream Environment's available states,
    /// preserving per-upstream and inter-upstream order. Any lookup
    /// failure aborts the whole aggregation.
    async fn available_states_from_upstream(
        &self,
        subscriptions: &[EnvironmentSubscription],
    ) -> Result<Vec<EnvironmentState>, SyncError>;
}

/// Production state source backed by the fetchers and the object store.
pub struct RemoteStateSource {
    commits: Arc<dyn CommitFetcher>,
    images: Arc<dyn ImageFetcher>,
    charts: Arc<dyn ChartFetcher>,
    store: Arc<dyn ObjectStore>,
}

impl RemoteStateSource {
    pub fn new(
        commits: Arc<dyn CommitFetcher>,
        images: Arc<dyn ImageFetcher>,
        charts: Arc<dyn ChartFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            commits,
            images,
            charts,
            store,
        }
    }
}

#[async_trait]
impl StateSource for RemoteStateSource {
    async fn latest_state_from_repos(
        &self,
        namespace: &str,
        subscriptions: &RepoSubscriptions,
    ) -> Result<Option<EnvironmentState>, SyncError> {
        let commits = self
            .commits
            .latest_commits(namespace, &subscriptions.git)
            .await
            .map_err(SyncError::Git)?;
        let images = self
            .images
            .latest_images(namespace, &subscriptions.images)
            .await
            .map_err(SyncError::Image)?;
        let charts = self
            .charts
            .latest_charts(namespace, &subscriptions.charts)
            .await
            .map_err(SyncError::Chart)?;

        if commits.is_empty() && images.is_empty() && charts.is_empty() {
            // Nothing observable yet; not an empty state.
            return Ok(None);
        }
        Ok(Some(EnvironmentState::observed(commits, images, charts)))
    }

    async fn available_states_from_upstream(
        &self,
        subscriptions: &[EnvironmentSubscription],
    ) -> Result<Vec<EnvironmentState>, SyncError> {
        let mut states = Vec::new();
        for sub in subscriptions {
            let env = self
                .store
                .get_environment(&sub.namespace, &sub.name)
                .await
                .map_err(SyncError::Upstream)?
                .ok_or_else(|| {
                    SyncError::Upstream(anyhow::anyhow!(
                        "environment {}/{} not found",
                        sub.namespace,
                        sub.name
                    ))
                })?;
            states.extend(env.status.available_states.iter().cloned().map(|mut s| {
                // Health pertains to the upstream Environment, not this one.
                s.health = None;
                s
            }));
        }
        Ok(states)
    }
}
