//! Applies self-edit patch targets to files on disk.
//!
//! Each target is resolved against the repository root, transformed in memory
//! and written back only when the content changed. A failing target is logged
//! and skipped; it never aborts the rest of the batch.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::patch::{PatchTarget, extract_patch_targets};
use crate::core::transform::{FileKind, select_transform};

/// Directories never descended into when resolving a target by file name.
pub const SKIP_DIRS: &[&str] = &[".git", "target", "__pycache__", "node_modules", ".swarm"];

/// Apply `action` to the file at `path`.
///
/// Returns `Ok(false)` when the file is missing, the action is not supported
/// for the file type, or the transform leaves the content unchanged. A file
/// that is not valid UTF-8 is an error and is left untouched.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn apply_patch(path: &Path, action: &str) -> Result<bool> {
    if !path.is_file() {
        debug!("patch target missing");
        return Ok(false);
    }
    let kind = FileKind::from_path(path);
    let Some(transform) = select_transform(kind, action) else {
        debug!(?kind, action, "no transform for action");
        return Ok(false);
    };

    let original = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let updated = transform.apply(&original);
    if updated == original {
        return Ok(false);
    }
    fs::write(path, updated).with_context(|| format!("write {}", path.display()))?;
    info!(?transform, "patch applied");
    Ok(true)
}

/// Resolve a target path relative to `root`.
///
/// Absolute paths and paths escaping the root are rejected. A path that does
/// not exist falls back to the first file with the same name under `root`
/// (sorted walk, skipping [`SKIP_DIRS`]). Returns `Ok(None)` when nothing matches.
pub fn resolve_target(root: &Path, rel: &str) -> Result<Option<PathBuf>> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err(anyhow!("patch target must be relative: {rel}"));
    }
    if rel_path
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(anyhow!("patch target escapes repository: {rel}"));
    }

    let direct = root.join(rel_path);
    if direct.is_file() {
        return Ok(Some(direct));
    }

    let Some(name) = rel_path.file_name() else {
        return Ok(None);
    };
    let found = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !SKIP_DIRS.iter().any(|skip| entry.file_name() == *skip)
        })
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path());
    if let Some(path) = &found {
        debug!(rel, resolved = %path.display(), "resolved target by file name");
    }
    Ok(found)
}

/// Extract targets from `text`, apply each once, and return the changed
/// files relative to `root` in first-seen order.
///
/// Targets are deduplicated on resolved path plus lowercased action, so a
/// repeated recommendation is only applied once and a file is listed once.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn apply_self_edit_patches(text: &str, root: &Path) -> Vec<String> {
    let targets = extract_patch_targets(text);
    let mut seen: HashSet<(PathBuf, String)> = HashSet::new();
    let mut applied: Vec<String> = Vec::new();

    for PatchTarget { path, action } in targets {
        let resolved = match resolve_target(root, &path) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                debug!(target = %path, "patch target not found");
                continue;
            }
            Err(err) => {
                warn!(target = %path, error = %err, "skipping patch target");
                continue;
            }
        };
        if !seen.insert((resolved.clone(), action.to_lowercase())) {
            continue;
        }
        match apply_patch(&resolved, &action) {
            Ok(true) => {
                let shown = display_relative(root, &resolved);
                if !applied.contains(&shown) {
                    applied.push(shown);
                }
            }
            Ok(false) => {}
            Err(err) => warn!(target = %path, error = %format!("{err:#}"), "patch failed"),
        }
    }
    info!(applied = applied.len(), "self-edit patches processed");
    applied
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
