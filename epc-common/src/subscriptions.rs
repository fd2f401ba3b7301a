//! Subscription types: where an Environment's deployable states come from.
//!
//! An Environment subscribes either to a set of repositories (git, image,
//! chart) or to one or more upstream Environments. The two modes are
//! mutually exclusive inputs to state determination.

use serde::{Deserialize, Serialize};

/// Inputs to state determination for an Environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscriptions {
    /// Direct repository subscriptions.
    #[serde(default)]
    pub repos: Option<RepoSubscriptions>,
    /// Upstream Environments whose available states feed this one. Ignored
    /// when `repos` is set.
    #[serde(default)]
    pub upstream_envs: Vec<EnvironmentSubscription>,
}

impl Subscriptions {
    /// Whether there is nothing to observe at all.
    pub fn is_empty(&self) -> bool {
        self.repos.is_none() && self.upstream_envs.is_empty()
    }
}

/// Zero or more git, image, and chart subscriptions, observed together as
/// one state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSubscriptions {
    #[serde(default)]
    pub git: Vec<GitSubscription>,
    #[serde(default)]
    pub images: Vec<ImageSubscription>,
    #[serde(default)]
    pub charts: Vec<ChartSubscription>,
}

/// Subscription to a git repository's branch head.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitSubscription {
    pub repo_url: String,
    /// Branch to track; the remote HEAD when unset.
    #[serde(default)]
    pub branch: Option<String>,
}

/// How a tag is selected from an image repository's tag list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSelectionStrategy {
    /// Highest semver tag, optionally constrained by `semver_constraint`.
    SemVer,
    /// Last tag in registry order after filtering.
    NewestTag,
    /// Resolve the pinned tag's manifest digest; the digest is reported as
    /// the tag value so digest rotation shows up as a new state.
    Digest,
}

impl Default for TagSelectionStrategy {
    fn default() -> Self {
        Self::SemVer
    }
}

/// Subscription to a container image repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSubscription {
    pub repo_url: String,
    #[serde(default)]
    pub tag_selection: TagSelectionStrategy,
    /// Semver range the selected tag must satisfy (SemVer strategy only).
    #[serde(default)]
    pub semver_constraint: Option<String>,
    /// Regex a tag must match to be considered at all.
    #[serde(default)]
    pub allow_tags: Option<String>,
    /// Exact tags that are never considered.
    #[serde(default)]
    pub ignore_tags: Vec<String>,
    /// Tag whose digest is tracked (Digest strategy only).
    #[serde(default)]
    pub digest_tag: Option<String>,
}

/// Subscription to a Helm chart in a classic chart registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSubscription {
    pub registry_url: String,
    pub name: String,
    /// Semver range the selected version must satisfy.
    #[serde(default)]
    pub semver_constraint: Option<String>,
}

/// Reference to an upstream Environment whose available states feed this
/// Environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSubscription {
    pub name: String,
    pub namespace: String,
}
