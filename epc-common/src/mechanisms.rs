//! Promotion mechanism and health check configuration.
//!
//! The chain order is fixed and declared here rather than implied by the
//! executor: Git-based edits (Kustomize, then Helm) run first, Argo CD
//! Application patches last, each consuming the previous step's output.

use serde::{Deserialize, Serialize};

/// Which promotion mechanisms apply to an Environment, with their
/// mechanism-specific parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionMechanisms {
    /// Git-tracked configuration edits (Kustomize and/or Helm).
    #[serde(default)]
    pub git_repo_update: Option<GitRepoUpdate>,
    /// Argo CD Application source patches, applied after any git edits.
    #[serde(default)]
    pub argocd_app_updates: Vec<ArgoCdAppUpdate>,
}

impl PromotionMechanisms {
    /// Whether no mechanism is configured at all.
    pub fn is_empty(&self) -> bool {
        self.git_repo_update.is_none() && self.argocd_app_updates.is_empty()
    }
}

/// Git-tracked configuration updates applied to one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitRepoUpdate {
    pub repo_url: String,
    /// Branch to commit to; the remote default branch when unset.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub kustomize: Option<KustomizePromotionMechanism>,
    #[serde(default)]
    pub helm: Option<HelmPromotionMechanism>,
}

/// Kustomize image-override edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KustomizePromotionMechanism {
    #[serde(default)]
    pub images: Vec<KustomizeImageUpdate>,
}

/// One Kustomize image override: set `image`'s newTag in the
/// kustomization file under `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KustomizeImageUpdate {
    /// Image name as it appears in the kustomization `images` list.
    pub image: String,
    /// Directory containing the kustomization file, relative to repo root.
    pub path: String,
}

/// Helm chart dependency and values-file edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmPromotionMechanism {
    /// Image tags embedded in values files.
    #[serde(default)]
    pub images: Vec<HelmImageUpdate>,
    /// Chart dependency version alignments.
    #[serde(default)]
    pub charts: Vec<HelmChartDependencyUpdate>,
}

/// Set a values-file key to the tag of the named image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmImageUpdate {
    /// Image repo URL, matched against the target state's images.
    pub image: String,
    /// Values file path relative to repo root.
    pub values_file_path: String,
    /// Dotted key within the values file, e.g. `app.image.tag`.
    pub key: String,
}

/// Align one declared chart dependency with the target state's version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmChartDependencyUpdate {
    pub registry_url: String,
    pub name: String,
    /// Chart directory (containing Chart.yaml) relative to repo root.
    pub chart_path: String,
}

/// Patch one Argo CD Application's source to reference the target state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoCdAppUpdate {
    pub app_name: String,
    /// Namespace of the Application; the Environment's when unset.
    #[serde(default)]
    pub app_namespace: Option<String>,
    /// Point the source's targetRevision at the state's commit or chart
    /// version for the source's repo.
    #[serde(default)]
    pub update_target_revision: bool,
    /// Kustomize image overrides to set on the source.
    #[serde(default)]
    pub kustomize_image_updates: Vec<ArgoCdKustomizeImageUpdate>,
    /// Helm parameter overrides to set on the source.
    #[serde(default)]
    pub helm_image_updates: Vec<ArgoCdHelmImageUpdate>,
}

/// Kustomize image override on an Argo CD Application source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoCdKustomizeImageUpdate {
    /// Image repo URL, matched against the target state's images.
    pub image: String,
}

/// Helm parameter override on an Argo CD Application source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoCdHelmImageUpdate {
    /// Image repo URL, matched against the target state's images.
    pub image: String,
    /// Helm parameter name to receive the tag, e.g. `image.tag`.
    pub key: String,
    /// What the parameter value is built from.
    #[serde(default)]
    pub value: ArgoCdHelmParameterValue,
}

/// What an Argo CD Helm parameter override carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgoCdHelmParameterValue {
    /// Just the selected tag.
    Tag,
    /// The full `repo:tag` reference.
    ImageAndTag,
}

impl Default for ArgoCdHelmParameterValue {
    fn default() -> Self {
        Self::Tag
    }
}

/// How a promoted state's health is judged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthChecks {
    #[serde(default)]
    pub argocd_app_checks: Vec<ArgoCdAppCheck>,
}

/// Health is read from one Argo CD Application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoCdAppCheck {
    pub app_name: String,
    /// Namespace of the Application; the Environment's when unset.
    #[serde(default)]
    pub app_namespace: Option<String>,
}
