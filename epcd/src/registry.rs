//! HTTP clients for container image registries and Helm chart registries.
//!
//! Image repositories are queried through the Docker Registry v2 API; chart
//! registries through the classic `index.yaml` document. Both clients are
//! read-only and carry no retry policy of their own.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;

use epc_common::Credentials;

/// Accept header for manifest digest resolution.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

/// Split an image repo URL like `registry.example.com/team/app` into the
/// registry base URL and the repository path.
fn split_image_repo(repo_url: &str) -> anyhow::Result<(String, String)> {
    let trimmed = repo_url
        .strip_prefix("https://")
        .or_else(|| repo_url.strip_prefix("http://"))
        .unwrap_or(repo_url);
    let (host, repository) = trimmed
        .split_once('/')
        .with_context(|| format!("image repo URL {repo_url} has no repository path"))?;
    if !host.contains('.') && !host.contains(':') {
        bail!("image repo URL {repo_url} does not name a registry host");
    }
    Ok((format!("https://{host}"), repository.to_string()))
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<String>,
}

/// Docker Registry v2 client.
#[derive(Debug, Clone, Default)]
pub struct RegistryClient {
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        credentials: Option<&Credentials>,
    ) -> reqwest::RequestBuilder {
        match credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    /// All tags of `repo_url`, in registry-reported order.
    pub async fn list_tags(
        &self,
        repo_url: &str,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Vec<String>> {
        let (base, repository) = split_image_repo(repo_url)?;
        let url = format!("{base}/v2/{repository}/tags/list");
        let response = self
            .authorized(self.http.get(&url), credentials)
            .send()
            .await
            .with_context(|| format!("failed to query {url}"))?
            .error_for_status()
            .with_context(|| format!("registry rejected tag listing for {repo_url}"))?;
        let list: TagList = response
            .json()
            .await
            .with_context(|| format!("invalid tag listing from {repo_url}"))?;
        Ok(list.tags)
    }

    /// Manifest digest of `tag` in `repo_url`, from the
    /// `Docker-Content-Digest` response header.
    pub async fn manifest_digest(
        &self,
        repo_url: &str,
        tag: &str,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<String> {
        let (base, repository) = split_image_repo(repo_url)?;
        let url = format!("{base}/v2/{repository}/manifests/{tag}");
        let response = self
            .authorized(self.http.head(&url), credentials)
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .with_context(|| format!("failed to query {url}"))?
            .error_for_status()
            .with_context(|| format!("registry rejected manifest query for {repo_url}:{tag}"))?;
        response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .with_context(|| format!("no digest header for {repo_url}:{tag}"))
    }
}

#[derive(Debug, Deserialize)]
struct ChartIndexEntry {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ChartIndex {
    #[serde(default)]
    entries: HashMap<String, Vec<ChartIndexEntry>>,
}

/// Classic Helm chart registry client (`<registry>/index.yaml`).
#[derive(Debug, Clone, Default)]
pub struct ChartIndexClient {
    http: reqwest::Client,
}

impl ChartIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published versions of `chart_name`, as listed by the registry
    /// index. Fails when the chart is absent from the index.
    pub async fn chart_versions(
        &self,
        registry_url: &str,
        chart_name: &str,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/index.yaml", registry_url.trim_end_matches('/'));
        let mut request = self.http.get(&url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let body = request
            .send()
            .await
            .with_context(|| format!("failed to query {url}"))?
            .error_for_status()
            .with_context(|| format!("chart registry rejected index request: {url}"))?
            .text()
            .await
            .with_context(|| format!("failed to read chart index from {url}"))?;

        let index: ChartIndex = serde_yaml::from_str(&body)
            .with_context(|| format!("invalid chart index at {url}"))?;
        let entries = index
            .entries
            .get(chart_name)
            .with_context(|| format!("chart {chart_name} not found in {registry_url}"))?;
        Ok(entries.iter().map(|e| e.version.clone()).collect())
    }
}
