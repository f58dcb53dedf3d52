//! Find and load fragment files under a config root.
//!
//! Discovery is a one-shot scan: every `*.yaml`/`*.yml` file below the root
//! becomes a fragment keyed by its relative path. Hidden directories are
//! pruned, which keeps `.git` and the snapshot store out of the fragment
//! set.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::compose::DEFAULTS_KEY;
use crate::error::DiscoverError;
use crate::fragment::{Fragment, FragmentStore};

/// Relative paths of all fragment files under `root_dir`, sorted.
pub fn list_fragments(root_dir: &Path) -> Result<Vec<PathBuf>, DiscoverError> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(root_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|e| DiscoverError::Walk {
            path: root_dir.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() || !has_yaml_extension(entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root_dir) {
            paths.push(rel.to_path_buf());
        }
    }
    paths.sort();
    debug!(root = %root_dir.display(), found = paths.len(), "fragment scan");
    Ok(paths)
}

/// Read every fragment under `root_dir` into a fresh store.
pub fn load_store(root_dir: &Path) -> Result<FragmentStore, DiscoverError> {
    let mut store = FragmentStore::new();
    for rel in list_fragments(root_dir)? {
        let path = root_dir.join(&rel);
        let text = fs::read_to_string(&path).map_err(|e| DiscoverError::Read { path, source: e })?;
        store.load(rel, text);
    }
    Ok(store)
}

/// Pick the composition root from a loaded store.
///
/// Preference order: the first top-level fragment carrying a `defaults`
/// list, then a top-level `config.yaml` or `config.yml`, then the
/// alphabetically first top-level fragment.
pub fn find_root(store: &FragmentStore) -> Option<&Path> {
    let top_level: Vec<&Fragment> = store
        .iter()
        .filter(|fragment| is_top_level(fragment.rel_path()))
        .collect();

    if let Some(fragment) = top_level.iter().find(|f| has_defaults(f)) {
        return Some(fragment.rel_path());
    }
    if let Some(fragment) = top_level
        .iter()
        .find(|f| matches!(f.rel_path().to_str(), Some("config.yaml" | "config.yml")))
    {
        return Some(fragment.rel_path());
    }
    top_level.first().map(|fragment| fragment.rel_path())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_yaml_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

fn is_top_level(rel: &Path) -> bool {
    rel.parent().is_none_or(|p| p.as_os_str().is_empty())
}

fn has_defaults(fragment: &Fragment) -> bool {
    fragment
        .tree()
        .map(|tree| tree.get(DEFAULTS_KEY).is_some())
        .unwrap_or(false)
}
