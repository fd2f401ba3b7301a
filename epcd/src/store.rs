//! Cluster-style object store contract and the in-memory backend.
//!
//! The core depends only on get/patch semantics for Environments and Argo
//! CD Applications; watch machinery and wire formats are someone else's
//! problem. The in-memory backend serves the daemon (seeded from TOML
//! documents) and the test suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use epc_common::{Environment, EnvironmentKey, EnvironmentStatus, ObjectMeta};

/// Sync condition reported by Argo CD for an Application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppSyncState {
    Synced,
    OutOfSync,
    Unknown,
}

impl Default for AppSyncState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Health condition reported by Argo CD for an Application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppHealthState {
    Healthy,
    Degraded,
    Progressing,
    Suspended,
    Missing,
    Unknown,
}

impl Default for AppHealthState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Helm overrides on an Application source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSourceHelm {
    #[serde(default)]
    pub parameters: Vec<HelmParameter>,
}

/// One Helm parameter override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmParameter {
    pub name: String,
    pub value: String,
}

/// Kustomize overrides on an Application source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSourceKustomize {
    /// Image override entries, `repo:tag` form.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Where an Application's manifests come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSource {
    pub repo_url: String,
    #[serde(default)]
    pub target_revision: String,
    /// Chart name when the source is a chart registry rather than git.
    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub helm: Option<ApplicationSourceHelm>,
    #[serde(default)]
    pub kustomize: Option<ApplicationSourceKustomize>,
}

/// Desired state of an Argo CD Application, reduced to what promotion and
/// health evaluation need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub source: ApplicationSource,
}

/// Observed sync condition of an Application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationSyncStatus {
    #[serde(default)]
    pub status: AppSyncState,
    /// Revision the Application is currently synced to.
    #[serde(default)]
    pub revision: String,
}

/// Observed health condition of an Application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationHealthStatus {
    #[serde(default)]
    pub status: AppHealthState,
    #[serde(default)]
    pub message: Option<String>,
}

/// Observed state of an Argo CD Application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationStatus {
    #[serde(default)]
    pub sync: ApplicationSyncStatus,
    #[serde(default)]
    pub health: ApplicationHealthStatus,
}

/// An Argo CD Application resource, reduced to the fields this controller
/// reads and patches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Application {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApplicationSpec,
    #[serde(default)]
    pub status: ApplicationStatus,
}

/// Read/patch access to Environment and Application resources.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys of all Environments the controller should reconcile.
    async fn list_environments(&self) -> anyhow::Result<Vec<EnvironmentKey>>;

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<Environment>>;

    /// Replace an Environment's status. The spec is never written.
    async fn patch_environment_status(
        &self,
        namespace: &str,
        name: &str,
        status: EnvironmentStatus,
    ) -> anyhow::Result<()>;

    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<Application>>;

    /// Replace an Application's source specification. Argo CD picks the
    /// change up on its own; this controller never waits for it.
    async fn patch_application_source(
        &self,
        namespace: &str,
        name: &str,
        source: ApplicationSource,
    ) -> anyhow::Result<()>;
}

/// Documents seeding the in-memory store at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// In-memory object store backend.
#[derive(Default)]
pub struct InMemoryObjectStore {
    environments: RwLock<HashMap<EnvironmentKey, Environment>>,
    applications: RwLock<HashMap<EnvironmentKey, Application>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from seed documents.
    pub async fn seeded(seed: StoreSeed) -> Arc<Self> {
        let store = Arc::new(Self::new());
        for env in seed.environments {
            store.put_environment(env).await;
        }
        for app in seed.applications {
            store.put_application(app).await;
        }
        store
    }

    pub async fn put_environment(&self, env: Environment) {
        self.environments.write().await.insert(env.key(), env);
    }

    pub async fn put_application(&self, app: Application) {
        self.applications
            .write()
            .await
            .insert(app.metadata.key(), app);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_environments(&self) -> anyhow::Result<Vec<EnvironmentKey>> {
        let mut keys: Vec<EnvironmentKey> =
            self.environments.read().await.keys().cloned().collect();
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<Environment>> {
        let key = EnvironmentKey::new(namespace, name);
        Ok(self.environments.read().await.get(&key).cloned())
    }

    async fn patch_environment_status(
        &self,
        namespace: &str,
        name: &str,
        status: EnvironmentStatus,
    ) -> anyhow::Result<()> {
        let key = EnvironmentKey::new(namespace, name);
        let mut envs = self.environments.write().await;
        let env = envs
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("environment {key} not found"))?;
        env.status = status;
        Ok(())
    }

    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<Application>> {
        let key = EnvironmentKey::new(namespace, name);
        Ok(self.applications.read().await.get(&key).cloned())
    }

    async fn patch_application_source(
        &self,
        namespace: &str,
        name: &str,
        source: ApplicationSource,
    ) -> anyhow::Result<()> {
        let key = EnvironmentKey::new(namespace, name);
        let mut apps = self.applications.write().await;
        let app = apps
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("application {key} not found"))?;
        app.spec.source = source;
        Ok(())
    }
}
