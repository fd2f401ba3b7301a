//! Error taxonomy for the reconciliation core.
//!
//! Two step-level error kinds exist: a [`SyncError`] aborts observation
//! with the status left as it was before the failing step, and a
//! [`PromotionError`] aborts the remaining mechanism chain with promotion
//! history left untouched. Health evaluation never produces an error.

use thiserror::Error;

/// Which subscription kind a sync failure originated from. Callers must be
/// able to distinguish these without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Git,
    Image,
    Chart,
    Upstream,
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::Image => write!(f, "image"),
            Self::Chart => write!(f, "chart"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// A fetcher or upstream-resolution failure. Always aborts the current
/// reconciliation pass; never retried internally.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("error syncing git repo subscriptions: {0}")]
    Git(#[source] anyhow::Error),
    #[error("error syncing image repo subscriptions: {0}")]
    Image(#[source] anyhow::Error),
    #[error("error syncing chart repo subscriptions: {0}")]
    Chart(#[source] anyhow::Error),
    #[error("error resolving upstream environments: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl SyncError {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Self::Git(_) => SubscriptionKind::Git,
            Self::Image(_) => SubscriptionKind::Image,
            Self::Chart(_) => SubscriptionKind::Chart,
            Self::Upstream(_) => SubscriptionKind::Upstream,
        }
    }
}

/// Which promotion mechanism failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismKind {
    GitKustomize,
    GitHelm,
    ArgoCd,
}

impl std::fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitKustomize => write!(f, "git/kustomize"),
            Self::GitHelm => write!(f, "git/helm"),
            Self::ArgoCd => write!(f, "argocd"),
        }
    }
}

/// A promotion mechanism failure. Aborts the remaining mechanism chain;
/// availability updates already committed in the pass are preserved.
#[derive(Debug, Error)]
#[error("error promoting via {mechanism}: {cause}")]
pub struct PromotionError {
    pub mechanism: MechanismKind,
    #[source]
    pub cause: anyhow::Error,
}

impl PromotionError {
    pub fn new(mechanism: MechanismKind, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            mechanism,
            cause: cause.into(),
        }
    }
}

/// A failed reconciliation pass: either observation or promotion broke.
/// Messages pass through from the failing step unchanged.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Promotion(#[from] PromotionError),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnvValue { var: String, value: String },
}
