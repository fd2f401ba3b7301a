//! Argo CD promotion: patch an Application's source to reference the
//! target state.
//!
//! This mechanism talks to the cluster-style object store, not to Git. The
//! source update is computed in memory and written back through a single
//! patch per Application.

use anyhow::Context;
use std::sync::Arc;

use epc_common::{
    ArgoCdAppUpdate, ArgoCdHelmParameterValue, EnvironmentState, ObjectMeta,
};

use crate::store::{
    ApplicationSource, ApplicationSourceHelm, ApplicationSourceKustomize, HelmParameter,
    ObjectStore,
};

/// Compute the updated source for one Application. Returns the patched
/// source; untouched fields pass through unchanged.
pub fn apply_source_update(
    mut source: ApplicationSource,
    update: &ArgoCdAppUpdate,
    target_state: &EnvironmentState,
) -> anyhow::Result<ApplicationSource> {
    if update.update_target_revision {
        source.target_revision = match &source.chart {
            Some(chart_name) => target_state
                .chart_for(&source.repo_url, chart_name)
                .map(|c| c.version.clone())
                .with_context(|| {
                    format!(
                        "target state carries no chart {}/{chart_name}",
                        source.repo_url
                    )
                })?,
            None => target_state
                .commit_for_repo(&source.repo_url)
                .map(|c| c.id.clone())
                .with_context(|| {
                    format!("target state carries no commit for {}", source.repo_url)
                })?,
        };
    }

    for image_update in &update.kustomize_image_updates {
        let image = target_state
            .images
            .iter()
            .find(|img| img.repo_url == image_update.image)
            .with_context(|| {
                format!("target state carries no image for {}", image_update.image)
            })?;
        let kustomize = source
            .kustomize
            .get_or_insert_with(ApplicationSourceKustomize::default);
        let override_entry = format!("{}:{}", image.repo_url, image.tag);
        let prefix = format!("{}:", image.repo_url);
        match kustomize
            .images
            .iter()
            .position(|existing| existing.starts_with(&prefix))
        {
            Some(idx) => kustomize.images[idx] = override_entry,
            None => kustomize.images.push(override_entry),
        }
    }

    for param_update in &update.helm_image_updates {
        let image = target_state
            .images
            .iter()
            .find(|img| img.repo_url == param_update.image)
            .with_context(|| {
                format!("target state carries no image for {}", param_update.image)
            })?;
        let value = match param_update.value {
            ArgoCdHelmParameterValue::Tag => image.tag.clone(),
            ArgoCdHelmParameterValue::ImageAndTag => {
                format!("{}:{}", image.repo_url, image.tag)
            }
        };
        let helm = source.helm.get_or_insert_with(ApplicationSourceHelm::default);
        match helm
            .parameters
            .iter()
            .position(|p| p.name == param_update.key)
        {
            Some(idx) => helm.parameters[idx].value = value,
            None => helm.parameters.push(HelmParameter {
                name: param_update.key.clone(),
                value,
            }),
        }
    }

    Ok(source)
}

/// Apply every configured Application update against the object store.
pub async fn apply(
    store: &Arc<dyn ObjectStore>,
    meta: &ObjectMeta,
    updates: &[ArgoCdAppUpdate],
    target_state: &EnvironmentState,
) -> anyhow::Result<()> {
    for update in updates {
        let namespace = update
            .app_namespace
            .as_deref()
            .unwrap_or(meta.namespace.as_str());
        let app = store
            .get_application(namespace, &update.app_name)
            .await
            .with_context(|| {
                format!("error finding Argo CD Application {namespace}/{}", update.app_name)
            })?
            .with_context(|| {
                format!("Argo CD Application {namespace}/{} not found", update.app_name)
            })?;

        let patched = apply_source_update(app.spec.source, update, target_state)?;
        store
            .patch_application_source(namespace, &update.app_name, patched)
            .await
            .with_context(|| {
                format!(
                    "error patching Argo CD Application {namespace}/{}",
                    update.app_name
                )
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use epc_common::{ArgoCdHelmImageUpdate, ArgoCdKustomizeImageUpdate, Chart, GitCommit, Image};

    fn target_state() -> EnvironmentState {
        EnvironmentState {
            commits: vec![GitCommit {
                repo_url: "https://git.example.com/config.git".to_string(),
                id: "abc123".to_string(),
            }],
            images: vec![Image {
                repo_url: "registry.example.com/app".to_string(),
                tag: "v2".to_string(),
            }],
            charts: vec![Chart {
                registry_url: "https://charts.example.com".to_string(),
                name: "demo".to_string(),
                version: "1.5.0".to_string(),
            }],
            ..Default::default()
        }
    }

    fn git_source() -> ApplicationSource {
        ApplicationSource {
            repo_url: "https://git.example.com/config.git".to_string(),
            target_revision: "old".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn target_revision_follows_commit_for_git_sources() {
        let update = ArgoCdAppUpdate {
            app_name: "web".to_string(),
            update_target_revision: true,
            ..Default::default()
        };
        let patched = apply_source_update(git_source(), &update, &target_state()).unwrap();
        assert_eq!(patched.target_revision, "abc123");
    }

    #[test]
    fn target_revision_follows_chart_version_for_chart_sources() {
        let source = ApplicationSource {
            repo_url: "https://charts.example.com".to_string(),
            chart: Some("demo".to_string()),
            target_revision: "1.0.0".to_string(),
            ..Default::default()
        };
        let update = ArgoCdAppUpdate {
            app_name: "web".to_string(),
            update_target_revision: true,
            ..Default::default()
        };
        let patched = apply_source_update(source, &update, &target_state()).unwrap();
        assert_eq!(patched.target_revision, "1.5.0");
    }

    #[test]
    fn target_revision_fails_without_matching_commit() {
        let source = ApplicationSource {
            repo_url: "https://git.example.com/other.git".to_string(),
            ..Default::default()
        };
        let update = ArgoCdAppUpdate {
            app_name: "web".to_string(),
            update_target_revision: true,
            ..Default::default()
        };
        assert!(apply_source_update(source, &update, &target_state()).is_err());
    }

    #[test]
    fn kustomize_image_override_is_upserted() {
        let mut source = git_source();
        source.kustomize = Some(ApplicationSourceKustomize {
            images: vec!["registry.example.com/app:v1".to_string()],
        });
        let update = ArgoCdAppUpdate {
            app_name: "web".to_string(),
            kustomize_image_updates: vec![ArgoCdKustomizeImageUpdate {
                image: "registry.example.com/app".to_string(),
            }],
            ..Default::default()
        };
        let patched = apply_source_update(source, &update, &target_state()).unwrap();
        assert_eq!(
            patched.kustomize.unwrap().images,
            vec!["registry.example.com/app:v2".to_string()]
        );
    }

    #[test]
    fn helm_parameter_carries_tag_or_full_reference() {
        let update = ArgoCdAppUpdate {
            app_name: "web".to_string(),
            helm_image_updates: vec![
                ArgoCdHelmImageUpdate {
                    image: "registry.example.com/app".to_string(),
                    key: "image.tag".to_string(),
                    value: ArgoCdHelmParameterValue::Tag,
                },
                ArgoCdHelmImageUpdate {
                    image: "registry.example.com/app".to_string(),
                    key: "image.ref".to_string(),
                    value: ArgoCdHelmParameterValue::ImageAndTag,
                },
            ],
            ..Default::default()
        };
        let patched = apply_source_update(git_source(), &update, &target_state()).unwrap();
        let params = patched.helm.unwrap().parameters;
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "image.tag");
        assert_eq!(params[0].value, "v2");
        assert_eq!(params[1].name, "image.ref");
        assert_eq!(params[1].value, "registry.example.com/app:v2");
    }
}
