//! Promotion execution: the declared mechanism chain.
//!
//! Mechanisms run in a fixed order (Git+Kustomize, Git+Helm, Argo CD),
//! each operating on the output of the previous, so one promotion can
//! update manifest image tags, chart dependency versions, and an Argo CD
//! Application source in one pass. The first failure aborts the chain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use epc_common::{
    CommitterConfig, CredentialsStore, EnvironmentState, GitRepoUpdate, MechanismKind,
    ObjectMeta, PromotionError, PromotionMechanisms,
};

use crate::git::GitWorkTree;
use crate::store::ObjectStore;
use crate::{argocd, helm, kustomize};

/// Executes a promotion of one state through the configured mechanisms.
#[async_trait]
pub trait Promoter: Send + Sync {
    /// Returns the state that was actually promoted. On failure the chain
    /// stops; nothing retries within the call.
    async fn promote(
        &self,
        meta: &ObjectMeta,
        mechanisms: &PromotionMechanisms,
        target_state: EnvironmentState,
    ) -> Result<EnvironmentState, PromotionError>;
}

/// Production promoter applying Git edits and Argo CD patches.
pub struct MechanismChain {
    credentials: Arc<dyn CredentialsStore>,
    store: Arc<dyn ObjectStore>,
    committer: CommitterConfig,
}

impl MechanismChain {
    pub fn new(
        credentials: Arc<dyn CredentialsStore>,
        store: Arc<dyn ObjectStore>,
        committer: CommitterConfig,
    ) -> Self {
        Self {
            credentials,
            store,
            committer,
        }
    }

    /// Fresh clone of the update's target repo, scoped to one mechanism
    /// invocation.
    async fn clone_target(&self, update: &GitRepoUpdate) -> anyhow::Result<GitWorkTree> {
        let creds = self.credentials.get(&update.repo_url).await;
        GitWorkTree::clone(
            &update.repo_url,
            update.branch.as_deref(),
            creds.as_ref(),
            &self.committer,
        )
        .await
    }

    async fn run_kustomize(
        &self,
        meta: &ObjectMeta,
        update: &GitRepoUpdate,
        target_state: &EnvironmentState,
    ) -> anyhow::Result<()> {
        let Some(mechanism) = &update.kustomize else {
            return Ok(());
        };
        let worktree = self.clone_target(update).await?;
        kustomize::apply(&worktree, mechanism, target_state)?;
        let pushed = worktree
            .commit_and_push(&format!(
                "promote {}/{} to state {}",
                meta.namespace, meta.name, target_state.id
            ))
            .await?;
        debug!("kustomize mechanism pushed: {pushed}");
        Ok(())
    }

    async fn run_helm(
        &self,
        meta: &ObjectMeta,
        update: &GitRepoUpdate,
        target_state: &EnvironmentState,
    ) -> anyhow::Result<()> {
        let Some(mechanism) = &update.helm else {
            return Ok(());
        };
        let worktree = self.clone_target(update).await?;
        if !helm::apply(&worktree, mechanism, target_state).await? {
            return Ok(());
        }
        worktree
            .commit_and_push(&format!(
                "promote {}/{} to state {}",
                meta.namespace, meta.name, target_state.id
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Promoter for MechanismChain {
    async fn promote(
        &self,
        meta: &ObjectMeta,
        mechanisms: &PromotionMechanisms,
        target_state: EnvironmentState,
    ) -> Result<EnvironmentState, PromotionError> {
        if let Some(update) = &mechanisms.git_repo_update {
            self.run_kustomize(meta, update, &target_state)
                .await
                .map_err(|cause| PromotionError::new(MechanismKind::GitKustomize, cause))?;
            self.run_helm(meta, update, &target_state)
                .await
                .map_err(|cause| PromotionError::new(MechanismKind::GitHelm, cause))?;
        }

        if !mechanisms.argocd_app_updates.is_empty() {
            argocd::apply(
                &self.store,
                meta,
                &mechanisms.argocd_app_updates,
                &target_state,
            )
            .await
            .map_err(|cause| PromotionError::new(MechanismKind::ArgoCd, cause))?;
        }

        info!(
            "promoted {}/{} to state {}",
            meta.namespace, meta.name, target_state.id
        );
        Ok(target_state)
    }
}
