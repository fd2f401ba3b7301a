//! Shared types and configuration for the Environment Promotion Controller.
//!
//! Everything API-shaped lives here: the Environment data model and its
//! state/status types, subscription and promotion-mechanism configuration,
//! the error taxonomy, controller configuration loading, the credentials
//! contract, and the reconciliation event bus.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod mechanisms;
pub mod subscriptions;
pub mod types;

pub use config::{CommitterConfig, ControllerConfig, CredentialEntry};
pub use credentials::{Credentials, CredentialsStore, StaticCredentialsStore};
pub use errors::{
    ConfigError, MechanismKind, PromotionError, ReconcileError, SubscriptionKind, SyncError,
};
pub use events::EventBus;
pub use mechanisms::{
    ArgoCdAppCheck, ArgoCdAppUpdate, ArgoCdHelmImageUpdate, ArgoCdHelmParameterValue,
    ArgoCdKustomizeImageUpdate, GitRepoUpdate, HealthChecks, HelmChartDependencyUpdate,
    HelmImageUpdate, HelmPromotionMechanism, KustomizeImageUpdate, KustomizePromotionMechanism,
    PromotionMechanisms,
};
pub use subscriptions::{
    ChartSubscription, EnvironmentSubscription, GitSubscription, ImageSubscription,
    RepoSubscriptions, Subscriptions, TagSelectionStrategy,
};
pub use types::{
    Chart, Environment, EnvironmentKey, EnvironmentSpec, EnvironmentState, EnvironmentStatus,
    GitCommit, Health, HealthStatus, Image, ObjectMeta, StateStack, STATE_STACK_CAPACITY,
};
