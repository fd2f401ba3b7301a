//! State fetchers: one per subscription kind.
//!
//! Each fetcher polls its subscriptions independently per reconciliation
//! and returns one observation per subscription, in subscription order.
//! Fetchers share no mutable state and never retry; scheduling retries is
//! the surrounding layer's job.

use anyhow::{bail, Context};
use async_trait::async_trait;
use regex::Regex;
use semver::{Version, VersionReq};
use std::sync::Arc;
use tracing::debug;

use epc_common::{
    Chart, ChartSubscription, CredentialsStore, GitCommit, GitSubscription, Image,
    ImageSubscription, TagSelectionStrategy,
};

use crate::git;
use crate::registry::{ChartIndexClient, RegistryClient};

/// Resolves the latest commit for each git subscription.
#[async_trait]
pub trait CommitFetcher: Send + Sync {
    async fn latest_commits(
        &self,
        namespace: &str,
        subscriptions: &[GitSubscription],
    ) -> anyhow::Result<Vec<GitCommit>>;
}

/// Resolves the selected tag for each image subscription.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn latest_images(
        &self,
        namespace: &str,
        subscriptions: &[ImageSubscription],
    ) -> anyhow::Result<Vec<Image>>;
}

/// Resolves the selected version for each chart subscription.
#[async_trait]
pub trait ChartFetcher: Send + Sync {
    async fn latest_charts(
        &self,
        namespace: &str,
        subscriptions: &[ChartSubscription],
    ) -> anyhow::Result<Vec<Chart>>;
}

/// `git ls-remote`-backed commit fetcher.
pub struct GitCommitFetcher {
    credentials: Arc<dyn CredentialsStore>,
}

impl GitCommitFetcher {
    pub fn new(credentials: Arc<dyn CredentialsStore>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CommitFetcher for GitCommitFetcher {
    async fn latest_commits(
        &self,
        _namespace: &str,
        subscriptions: &[GitSubscription],
    ) -> anyhow::Result<Vec<GitCommit>> {
        let mut commits = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions {
            let creds = self.credentials.get(&sub.repo_url).await;
            let id = git::ls_remote_head(&sub.repo_url, sub.branch.as_deref(), creds.as_ref())
                .await
                .with_context(|| format!("failed to resolve head of {}", sub.repo_url))?;
            debug!("resolved {} to {}", sub.repo_url, id);
            commits.push(GitCommit {
                repo_url: sub.repo_url.clone(),
                id,
            });
        }
        Ok(commits)
    }
}

/// Parse a tag as a semver version, tolerating a leading `v`.
fn parse_semver_tag(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Apply the subscription's allow/ignore filters to a registry tag list,
/// preserving registry order.
fn filter_tags(subscription: &ImageSubscription, tags: Vec<String>) -> anyhow::Result<Vec<String>> {
    let allow = subscription
        .allow_tags
        .as_deref()
        .map(Regex::new)
        .transpose()
        .with_context(|| {
            format!(
                "invalid allow_tags pattern for {}",
                subscription.repo_url
            )
        })?;
    Ok(tags
        .into_iter()
        .filter(|tag| allow.as_ref().is_none_or(|re| re.is_match(tag)))
        .filter(|tag| !subscription.ignore_tags.contains(tag))
        .collect())
}

/// Select one tag from the filtered list per the subscription's strategy.
/// `Digest` subscriptions are resolved by the caller; this handles the
/// list-based strategies.
fn select_tag(subscription: &ImageSubscription, tags: &[String]) -> anyhow::Result<String> {
    match subscription.tag_selection {
        TagSelectionStrategy::SemVer => {
            let constraint = subscription
                .semver_constraint
                .as_deref()
                .map(VersionReq::parse)
                .transpose()
                .with_context(|| {
                    format!("invalid semver constraint for {}", subscription.repo_url)
                })?;
            let best = tags
                .iter()
                .filter_map(|tag| parse_semver_tag(tag).map(|v| (v, tag)))
                .filter(|(v, _)| constraint.as_ref().is_none_or(|c| c.matches(v)))
                .max_by(|(a, _), (b, _)| a.cmp(b));
            match best {
                Some((_, tag)) => Ok(tag.clone()),
                None => bail!(
                    "no tag of {} satisfies the semver selection",
                    subscription.repo_url
                ),
            }
        }
        TagSelectionStrategy::NewestTag => tags.last().cloned().ok_or_else(|| {
            anyhow::anyhow!("no tag of {} survives filtering", subscription.repo_url)
        }),
        TagSelectionStrategy::Digest => {
            bail!("digest selection is resolved against the manifest, not the tag list")
        }
    }
}

/// Registry-API-backed image fetcher.
pub struct ImageTagFetcher {
    credentials: Arc<dyn CredentialsStore>,
    registry: RegistryClient,
}

impl ImageTagFetcher {
    pub fn new(credentials: Arc<dyn CredentialsStore>, registry: RegistryClient) -> Self {
        Self {
            credentials,
            registry,
        }
    }
}

#[async_trait]
impl ImageFetcher for ImageTagFetcher {
    async fn latest_images(
        &self,
        _namespace: &str,
        subscriptions: &[ImageSubscription],
    ) -> anyhow::Result<Vec<Image>> {
        let mut images = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions {
            let creds = self.credentials.get(&sub.repo_url).await;
            let tag = match sub.tag_selection {
                TagSelectionStrategy::Digest => {
                    let pinned = sub.digest_tag.as_deref().with_context(|| {
                        format!("digest subscription for {} names no tag", sub.repo_url)
                    })?;
                    self.registry
                        .manifest_digest(&sub.repo_url, pinned, creds.as_ref())
                        .await?
                }
                _ => {
                    let tags = self.registry.list_tags(&sub.repo_url, creds.as_ref()).await?;
                    let tags = filter_tags(sub, tags)?;
                    select_tag(sub, &tags)?
                }
            };
            debug!("selected {}:{}", sub.repo_url, tag);
            images.push(Image {
                repo_url: sub.repo_url.clone(),
                tag,
            });
        }
        Ok(images)
    }
}

/// Chart-index-backed chart fetcher.
pub struct ChartVersionFetcher {
    credentials: Arc<dyn CredentialsStore>,
    index: ChartIndexClient,
}

impl ChartVersionFetcher {
    pub fn new(credentials: Arc<dyn CredentialsStore>, index: ChartIndexClient) -> Self {
        Self { credentials, index }
    }
}

/// Pick the highest version satisfying the optional constraint.
fn select_chart_version(
    subscription: &ChartSubscription,
    versions: &[String],
) -> anyhow::Result<String> {
    let constraint = subscription
        .semver_constraint
        .as_deref()
        .map(VersionReq::parse)
        .transpose()
        .with_context(|| {
            format!(
                "invalid semver constraint for chart {}",
                subscription.name
            )
        })?;
    versions
        .iter()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (v, raw)))
        .filter(|(v, _)| constraint.as_ref().is_none_or(|c| c.matches(v)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no version of chart {} satisfies the selection",
                subscription.name
            )
        })
}

#[async_trait]
impl ChartFetcher for ChartVersionFetcher {
    async fn latest_charts(
        &self,
        _namespace: &str,
        subscriptions: &[ChartSubscription],
    ) -> anyhow::Result<Vec<Chart>> {
        let mut charts = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions {
            let creds = self.credentials.get(&sub.registry_url).await;
            let versions = self
                .index
                .chart_versions(&sub.registry_url, &sub.name, creds.as_ref())
                .await?;
            let version = select_chart_version(sub, &versions)?;
            debug!("selected chart {}/{} {}", sub.registry_url, sub.name, version);
            charts.push(Chart {
                registry_url: sub.registry_url.clone(),
                name: sub.name.clone(),
                version,
            });
        }
        Ok(charts)
    }
}
