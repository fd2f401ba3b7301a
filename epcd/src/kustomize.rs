//! Git+Kustomize promotion: structural edits of kustomization image
//! overrides.
//!
//! The edit loads the kustomization document as a YAML value and rewrites
//! the `images` override list in place; it never patches text. Unmatched
//! entries and unrelated keys are preserved as parsed.

use anyhow::{bail, Context};
use serde_yaml::{Mapping, Value};
use std::path::Path;

use epc_common::{EnvironmentState, KustomizePromotionMechanism};

use crate::git::GitWorkTree;

/// File names recognized as the kustomization document, in lookup order.
const KUSTOMIZATION_NAMES: [&str; 2] = ["kustomization.yaml", "kustomization.yml"];

/// Set `image`'s `newTag` in the kustomization document at
/// `kustomization_path`. Creates the `images` list and the entry when
/// absent; replaces the tag when present.
pub fn set_image(kustomization_path: &Path, image: &str, new_tag: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(kustomization_path).with_context(|| {
        format!(
            "failed to read kustomization at {}",
            kustomization_path.display()
        )
    })?;
    let mut doc: Value = serde_yaml::from_str(&raw).with_context(|| {
        format!(
            "invalid kustomization at {}",
            kustomization_path.display()
        )
    })?;

    let Some(root) = doc.as_mapping_mut() else {
        bail!(
            "kustomization at {} is not a mapping",
            kustomization_path.display()
        );
    };

    let images = root
        .entry(Value::from("images"))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    let Some(images) = images.as_sequence_mut() else {
        bail!(
            "images override in {} is not a list",
            kustomization_path.display()
        );
    };

    let existing = images.iter().position(|entry| {
        entry
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name == image)
    });
    match existing {
        Some(idx) => {
            let Some(mapping) = images[idx].as_mapping_mut() else {
                bail!("image override for {image} is not a mapping");
            };
            mapping.insert(Value::from("newTag"), Value::from(new_tag));
        }
        None => {
            let mut entry = Mapping::new();
            entry.insert(Value::from("name"), Value::from(image));
            entry.insert(Value::from("newTag"), Value::from(new_tag));
            images.push(Value::Mapping(entry));
        }
    }

    let rendered = serde_yaml::to_string(&doc)?;
    std::fs::write(kustomization_path, rendered).with_context(|| {
        format!(
            "failed to write kustomization at {}",
            kustomization_path.display()
        )
    })?;
    Ok(())
}

/// Locate the kustomization document under `dir`.
fn kustomization_file(dir: &Path) -> anyhow::Result<std::path::PathBuf> {
    for name in KUSTOMIZATION_NAMES {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!("no kustomization file under {}", dir.display())
}

/// Apply every configured image override in the working tree to match the
/// target state. An override whose image the state does not carry is an
/// error.
pub fn apply(
    worktree: &GitWorkTree,
    mechanism: &KustomizePromotionMechanism,
    target_state: &EnvironmentState,
) -> anyhow::Result<()> {
    for update in &mechanism.images {
        let image = target_state
            .images
            .iter()
            .find(|img| img.repo_url == update.image)
            .with_context(|| {
                format!("target state carries no image for {}", update.image)
            })?;
        let file = kustomization_file(&worktree.path().join(&update.path))?;
        set_image(&file, &update.image, &image.tag)?;
    }
    Ok(())
}
