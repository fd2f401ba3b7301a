//! Core data model for the Environment Promotion Controller.
//!
//! An [`Environment`] is a deployment target with subscriptions (inputs)
//! and a status (outputs: available and promoted states). An
//! [`EnvironmentState`] is an immutable snapshot of the commit/image/chart
//! references that make up one deployable version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::mechanisms::{HealthChecks, PromotionMechanisms};
use crate::subscriptions::Subscriptions;

/// Maximum retained entries in a state stack. States that fall off the end
/// are destroyed; history retention beyond this is not the controller's job.
pub const STATE_STACK_CAPACITY: usize = 10;

/// Identity of an Environment within the cluster, `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentKey(pub String);

impl EnvironmentKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object metadata forwarded opaquely to promotion mechanisms for commit
/// attribution. The controller never interprets it beyond forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

impl ObjectMeta {
    pub fn key(&self) -> EnvironmentKey {
        EnvironmentKey::new(&self.namespace, &self.name)
    }
}

/// A git commit reference observed from a subscribed repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    /// URL of the repository the commit was observed in.
    pub repo_url: String,
    /// Commit ID (SHA).
    pub id: String,
}

/// A container image reference observed from a subscribed image repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// URL of the image repository.
    pub repo_url: String,
    /// Selected tag (or resolved digest for digest-pinned subscriptions).
    pub tag: String,
}

/// A Helm chart version observed from a subscribed chart registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    /// URL of the chart registry.
    pub registry_url: String,
    /// Chart name within the registry.
    pub name: String,
    /// Selected chart version.
    pub version: String,
}

/// Normalized health of a promoted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The deployment tool reports the state fully rolled out and healthy.
    Healthy,
    /// The deployment tool reports a degraded condition.
    Degraded,
    /// Health could not be determined (tool unreachable, no checks, or the
    /// tool is not yet synced to this state).
    Unknown,
    /// A rollout of this state is still in progress.
    Progressing,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unknown => write!(f, "unknown"),
            Self::Progressing => write!(f, "progressing"),
        }
    }
}

/// Health of a promoted state, as evaluated against the deployment tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    /// Human-readable descriptions of anything preventing a Healthy verdict.
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Health {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            issues: Vec::new(),
        }
    }

    pub fn unknown(issue: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            issues: vec![issue.into()],
        }
    }
}

/// Immutable snapshot of "what could be deployed": one observed combination
/// of commits, images, and chart versions.
///
/// After creation a state is never mutated, except to attach [`Health`]
/// once it has been promoted and evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Opaque unique identifier, assigned at creation, never reused.
    #[serde(default)]
    pub id: String,
    /// Timestamp of first observation.
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    /// One commit per subscribed git repo, in subscription order.
    #[serde(default)]
    pub commits: Vec<GitCommit>,
    /// One image per subscribed image repo, in subscription order.
    #[serde(default)]
    pub images: Vec<Image>,
    /// One chart per subscribed chart repo, in subscription order.
    #[serde(default)]
    pub charts: Vec<Chart>,
    /// Present only for states that have been promoted and evaluated.
    #[serde(default)]
    pub health: Option<Health>,
}

impl EnvironmentState {
    /// Construct a freshly observed state with a new ID and `first_seen`.
    pub fn observed(commits: Vec<GitCommit>, images: Vec<Image>, charts: Vec<Chart>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            first_seen: Some(Utc::now()),
            commits,
            images,
            charts,
            health: None,
        }
    }

    /// Whether two states reference the same materials: equal commit,
    /// image, and chart sequences (order-sensitive). `id`, `first_seen`,
    /// and `health` are ignored; this is what freshness comparisons use.
    pub fn same_materials(&self, other: &Self) -> bool {
        self.commits == other.commits && self.images == other.images && self.charts == other.charts
    }

    /// The commit recorded for `repo_url`, if this state has one.
    pub fn commit_for_repo(&self, repo_url: &str) -> Option<&GitCommit> {
        self.commits.iter().find(|c| c.repo_url == repo_url)
    }

    /// The chart recorded for `registry_url`/`name`, if this state has one.
    pub fn chart_for(&self, registry_url: &str, name: &str) -> Option<&Chart> {
        self.charts
            .iter()
            .find(|c| c.registry_url == registry_url && c.name == name)
    }
}

/// Bounded most-recent-first history of environment states.
///
/// Both status stacks use this: `available_states` holds what is currently
/// observable, `states` holds what has actually been promoted. Entries past
/// [`STATE_STACK_CAPACITY`] are silently trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStack(VecDeque<EnvironmentState>);

impl StateStack {
    pub fn new() -> Self {
        Self(VecDeque::new())
    }

    /// Prepend a state, trimming the oldest entries past capacity.
    pub fn push(&mut self, state: EnvironmentState) {
        self.0.push_front(state);
        self.0.truncate(STATE_STACK_CAPACITY);
    }

    /// Replace the whole stack, trimming past capacity.
    pub fn replace(&mut self, states: Vec<EnvironmentState>) {
        self.0 = states.into_iter().take(STATE_STACK_CAPACITY).collect();
    }

    /// Whether any recorded state references the same materials as
    /// `candidate`. Health differences do not make a state look new.
    pub fn contains_materials(&self, candidate: &EnvironmentState) -> bool {
        self.0.iter().any(|s| s.same_materials(candidate))
    }

    /// Most recent entry.
    pub fn first(&self) -> Option<&EnvironmentState> {
        self.0.front()
    }

    /// Mutable access to the most recent entry (used only to attach health).
    pub fn first_mut(&mut self) -> Option<&mut EnvironmentState> {
        self.0.front_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentState> {
        self.0.iter()
    }
}

impl From<Vec<EnvironmentState>> for StateStack {
    fn from(states: Vec<EnvironmentState>) -> Self {
        let mut stack = Self::new();
        stack.replace(states);
        stack
    }
}

/// Persisted reconciliation result, owned exclusively by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    /// States currently observable from subscriptions, most-recent-first.
    #[serde(default)]
    pub available_states: StateStack,
    /// States that have actually been promoted, most-recent-first.
    #[serde(default)]
    pub states: StateStack,
    /// Message of the last failed reconciliation pass, cleared on success.
    #[serde(default)]
    pub error: Option<String>,
}

/// Desired behavior of an Environment: where states come from, how they
/// are promoted, and how health is judged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub subscriptions: Option<Subscriptions>,
    #[serde(default)]
    pub promotion_mechanisms: Option<PromotionMechanisms>,
    /// When false, new states are recorded as available but never promoted
    /// without manual intervention.
    #[serde(default)]
    pub enable_auto_promotion: bool,
    #[serde(default)]
    pub health_checks: Option<HealthChecks>,
}

/// A deployment target tracked by the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: EnvironmentSpec,
    #[serde(default)]
    pub status: EnvironmentStatus,
}

impl Environment {
    pub fn key(&self) -> EnvironmentKey {
        self.metadata.key()
    }
}
