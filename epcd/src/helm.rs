//! Git+Helm promotion: chart dependency alignment and values-file edits.
//!
//! Dependency changes are computed first; when the computed set is empty
//! and no values edits are configured the whole step is a no-op. Version
//! edits rewrite `Chart.yaml` structurally, the dependency lock is
//! refreshed through the `helm` binary, and values-file string edits go
//! through [`set_strings_in_yaml_file`].

use anyhow::{bail, Context};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use epc_common::{Chart, EnvironmentState, HelmPromotionMechanism};

use crate::git::GitWorkTree;

/// Dependency version edits per chart path: `chart_path -> (dependency
/// name -> new version)`.
pub type ChartDependencyChanges = BTreeMap<String, BTreeMap<String, String>>;

/// Compute the `Chart.yaml` dependency edits needed to align each
/// configured chart with the target state's chart versions. Dependencies
/// already at the target version produce no entry.
pub fn build_chart_dependency_changes(
    repo_root: &Path,
    mechanism: &HelmPromotionMechanism,
    target_charts: &[Chart],
) -> anyhow::Result<ChartDependencyChanges> {
    let mut changes = ChartDependencyChanges::new();
    for update in &mechanism.charts {
        let target = target_charts
            .iter()
            .find(|c| c.registry_url == update.registry_url && c.name == update.name)
            .with_context(|| {
                format!(
                    "target state carries no chart {}/{}",
                    update.registry_url, update.name
                )
            })?;

        let chart_file = repo_root.join(&update.chart_path).join("Chart.yaml");
        let doc = read_yaml(&chart_file)?;
        let current = dependency_version(&doc, &update.name);
        if current.as_deref() != Some(target.version.as_str()) {
            changes
                .entry(update.chart_path.clone())
                .or_default()
                .insert(update.name.clone(), target.version.clone());
        }
    }
    Ok(changes)
}

fn read_yaml(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("invalid YAML at {}", path.display()))
}

fn write_yaml(path: &Path, doc: &Value) -> anyhow::Result<()> {
    let rendered = serde_yaml::to_string(doc)?;
    std::fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

/// The declared version of `name` in a chart document's dependency list.
fn dependency_version(doc: &Value, name: &str) -> Option<String> {
    doc.get("dependencies")?
        .as_sequence()?
        .iter()
        .find(|dep| dep.get("name").and_then(Value::as_str) == Some(name))?
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Apply computed dependency changes to the `Chart.yaml` documents.
pub fn apply_chart_dependency_changes(
    repo_root: &Path,
    changes: &ChartDependencyChanges,
) -> anyhow::Result<()> {
    for (chart_path, versions) in changes {
        let chart_file = repo_root.join(chart_path).join("Chart.yaml");
        let mut doc = read_yaml(&chart_file)?;
        let deps = doc
            .get_mut("dependencies")
            .and_then(Value::as_sequence_mut)
            .with_context(|| format!("{} declares no dependencies", chart_file.display()))?;
        for (name, version) in versions {
            let dep = deps
                .iter_mut()
                .find(|dep| dep.get("name").and_then(Value::as_str) == Some(name.as_str()))
                .with_context(|| {
                    format!("{} has no dependency named {name}", chart_file.display())
                })?;
            let Some(mapping) = dep.as_mapping_mut() else {
                bail!("dependency {name} in {} is not a mapping", chart_file.display());
            };
            mapping.insert(Value::from("version"), Value::from(version.as_str()));
        }
        write_yaml(&chart_file, &doc)?;
    }
    Ok(())
}

/// Re-resolve a chart's dependency lock after version edits.
pub async fn update_chart_dependencies(repo_root: &Path, chart_path: &str) -> anyhow::Result<()> {
    let dir = repo_root.join(chart_path);
    let output = Command::new("helm")
        .args(["dependency", "update", "--skip-refresh"])
        .current_dir(&dir)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run helm dependency update in {}", dir.display()))?;
    if !output.status.success() {
        bail!(
            "helm dependency update failed in {}: {}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Set string values at dotted key paths in a YAML file, creating
/// intermediate mappings as needed. Used for values that dependency
/// metadata alone cannot express, e.g. image tags inside values files.
pub fn set_strings_in_yaml_file(
    path: &Path,
    changes: &BTreeMap<String, String>,
) -> anyhow::Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let mut doc = read_yaml(path)?;
    if doc.is_null() {
        doc = Value::Mapping(serde_yaml::Mapping::new());
    }
    for (key, value) in changes {
        set_string_at_path(&mut doc, key, value)
            .with_context(|| format!("failed to set {key} in {}", path.display()))?;
    }
    write_yaml(path, &doc)
}

fn set_string_at_path(doc: &mut Value, dotted_key: &str, value: &str) -> anyhow::Result<()> {
    let mut current = doc;
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .context("empty key path")?;
    for segment in parents {
        let Some(mapping) = current.as_mapping_mut() else {
            bail!("{segment} is not a mapping");
        };
        current = mapping
            .entry(Value::from(*segment))
            .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
        if current.is_null() {
            *current = Value::Mapping(serde_yaml::Mapping::new());
        }
    }
    let Some(mapping) = current.as_mapping_mut() else {
        bail!("{last} cannot be set on a non-mapping");
    };
    mapping.insert(Value::from(*last), Value::from(value));
    Ok(())
}

/// Apply the Helm mechanism in the working tree: align chart dependencies,
/// refresh locks for touched charts, and set configured values-file image
/// tags. Returns `false` when nothing needed changing.
pub async fn apply(
    worktree: &GitWorkTree,
    mechanism: &HelmPromotionMechanism,
    target_state: &EnvironmentState,
) -> anyhow::Result<bool> {
    let changes =
        build_chart_dependency_changes(worktree.path(), mechanism, &target_state.charts)?;

    // Group values edits per file so each file is rewritten once.
    let mut value_edits: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for update in &mechanism.images {
        let image = target_state
            .images
            .iter()
            .find(|img| img.repo_url == update.image)
            .with_context(|| format!("target state carries no image for {}", update.image))?;
        value_edits
            .entry(update.values_file_path.clone())
            .or_default()
            .insert(update.key.clone(), image.tag.clone());
    }

    if changes.is_empty() && value_edits.is_empty() {
        debug!("helm mechanism has nothing to change");
        return Ok(false);
    }

    apply_chart_dependency_changes(worktree.path(), &changes)?;
    for chart_path in changes.keys() {
        update_chart_dependencies(worktree.path(), chart_path).await?;
    }
    for (file, edits) in &value_edits {
        set_strings_in_yaml_file(&worktree.path().join(file), edits)?;
    }
    Ok(true)
}
