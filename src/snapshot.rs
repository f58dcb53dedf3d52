//! Durable snapshots of the fragment set, stored beside the configuration.
//!
//! A store lives in a `.figtree-snapshots/` directory under the config
//! root. Each snapshot is a subdirectory `{id:06}-{tag}` holding a verbatim
//! copy of every fragment plus a `manifest.json` describing it. Snapshots
//! are staged under a dotted name and renamed into place, so a crash while
//! writing never leaves a half-visible snapshot. Ids keep growing across
//! reopens, nothing expires on its own, and deletion is always explicit.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SnapshotError;

/// Directory name of the store, relative to the config root.
pub const STORE_DIR: &str = ".figtree-snapshots";

const MANIFEST_FILE: &str = "manifest.json";

/// Descriptive metadata of one snapshot, as stored in its `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: u64,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    /// Relative fragment paths captured, in store order.
    pub files: Vec<PathBuf>,
}

/// On-disk snapshot store rooted at `<config dir>/.figtree-snapshots`.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    next_id: u64,
}

impl SnapshotStore {
    /// Open (creating if needed) the store for a config directory.
    ///
    /// The next id continues from the highest directory name already
    /// present, so ids stay unique across reopens even after deletions.
    /// Stage directories left behind by an interrupted capture are removed.
    pub fn open(config_dir: &Path) -> Result<Self, SnapshotError> {
        let dir = config_dir.join(STORE_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut max_id = 0;
        for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".stage-") {
                // A capture died before its rename; the snapshot never existed.
                let stale = entry.path();
                fs::remove_dir_all(&stale).map_err(|e| io_error(&stale, e))?;
                continue;
            }
            if let Some(id) = parse_dir_id(&name) {
                max_id = max_id.max(id);
            }
        }
        debug!(dir = %dir.display(), next_id = max_id + 1, "snapshot store open");
        Ok(Self {
            dir,
            next_id: max_id + 1,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new snapshot of `files` (relative path, verbatim text).
    ///
    /// Contents are copied byte for byte, broken or empty fragments
    /// included. The snapshot becomes visible only by the final rename.
    pub fn capture(
        &mut self,
        tag: &str,
        files: &[(PathBuf, String)],
    ) -> Result<SnapshotMeta, SnapshotError> {
        let id = self.next_id;
        let meta = SnapshotMeta {
            id,
            tag: tag.to_string(),
            created_at: Utc::now(),
            files: files.iter().map(|(rel, _)| rel.clone()).collect(),
        };

        let stage = self.dir.join(format!(".stage-{id:06}"));
        if stage.exists() {
            // Leftover from an interrupted capture with this id.
            fs::remove_dir_all(&stage).map_err(|e| io_error(&stage, e))?;
        }
        fs::create_dir_all(&stage).map_err(|e| io_error(&stage, e))?;

        for (rel, text) in files {
            let target = stage.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            fs::write(&target, text).map_err(|e| io_error(&target, e))?;
        }

        let manifest_path = stage.join(MANIFEST_FILE);
        let rendered = serde_json::to_vec_pretty(&meta).map_err(|e| SnapshotError::Manifest {
            path: manifest_path.clone(),
            source: e,
        })?;
        fs::write(&manifest_path, rendered).map_err(|e| io_error(&manifest_path, e))?;

        let target = self.dir.join(format!("{id:06}-{}", sanitize_tag(tag)));
        fs::rename(&stage, &target).map_err(|e| io_error(&target, e))?;
        self.next_id += 1;
        debug!(id, tag, files = files.len(), "snapshot captured");
        Ok(meta)
    }

    /// All snapshots, ordered by id. Directories whose manifest cannot be
    /// read are skipped with a warning rather than failing the listing.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>, SnapshotError> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))? {
            let entry = entry.map_err(|e| io_error(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if parse_dir_id(&name).is_none() {
                continue;
            }
            match read_manifest(&entry.path()) {
                Ok(meta) => snapshots.push(meta),
                Err(err) => warn!(snapshot = %name, error = %err, "skipping unreadable manifest"),
            }
        }
        snapshots.sort_by_key(|meta| meta.id);
        Ok(snapshots)
    }

    /// Read back snapshot `id`: its metadata and the exact file contents it
    /// captured. Only files named by the manifest are read; anything else
    /// in the directory is ignored.
    pub fn restore(&self, id: u64) -> Result<(SnapshotMeta, Vec<(PathBuf, String)>), SnapshotError> {
        let snap_dir = self
            .find_dir(id)?
            .ok_or(SnapshotError::UnknownId { id })?;
        let meta = read_manifest(&snap_dir)?;

        let mut files = Vec::with_capacity(meta.files.len());
        for rel in &meta.files {
            let path = snap_dir.join(rel);
            let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            files.push((rel.clone(), text));
        }
        debug!(id, files = files.len(), "snapshot restored");
        Ok((meta, files))
    }

    /// Remove snapshot `id` from disk. Its id is never reused.
    pub fn delete(&mut self, id: u64) -> Result<(), SnapshotError> {
        let snap_dir = self
            .find_dir(id)?
            .ok_or(SnapshotError::UnknownId { id })?;
        fs::remove_dir_all(&snap_dir).map_err(|e| io_error(&snap_dir, e))?;
        debug!(id, "snapshot deleted");
        Ok(())
    }

    fn find_dir(&self, id: u64) -> Result<Option<PathBuf>, SnapshotError> {
        for entry in fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))? {
            let entry = entry.map_err(|e| io_error(&self.dir, e))?;
            if parse_dir_id(&entry.file_name().to_string_lossy()) == Some(id) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

fn read_manifest(snap_dir: &Path) -> Result<SnapshotMeta, SnapshotError> {
    let path = snap_dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
    serde_json::from_str(&text).map_err(|e| SnapshotError::Manifest { path, source: e })
}

/// Parse the `NNNNNN-` prefix of a snapshot directory name. Stage dirs and
/// stray files yield `None`.
fn parse_dir_id(name: &str) -> Option<u64> {
    let (digits, _) = name.split_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Make a tag safe as a directory name suffix.
fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .take(48)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files(pairs: &[(&str, &str)]) -> Vec<(PathBuf, String)> {
        pairs
            .iter()
            .map(|(rel, text)| (PathBuf::from(rel), text.to_string()))
            .collect()
    }

    fn sample() -> Vec<(PathBuf, String)> {
        files(&[
            ("config.yaml", "defaults:\n  - db: mysql\n"),
            ("db/mysql.yaml", "driver: mysql\nport: 3306\n"),
        ])
    }

    #[test]
    fn capture_writes_files_and_manifest() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();

        let meta = store.capture("baseline", &sample()).unwrap();
        assert_eq!(meta.id, 1);
        assert_eq!(meta.files.len(), 2);

        let snap_dir = dir.path().join(STORE_DIR).join("000001-baseline");
        assert!(snap_dir.join("manifest.json").exists());
        assert_eq!(
            fs::read_to_string(snap_dir.join("db/mysql.yaml")).unwrap(),
            "driver: mysql\nport: 3306\n"
        );
    }

    #[test]
    fn restore_round_trips_broken_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();

        let captured = files(&[
            ("config.yaml", "defaults:\n  - db: mysql\n"),
            ("db/broken.yaml", "a: [1,\n"),
            ("empty.yaml", ""),
        ]);
        let meta = store.capture("wip", &captured).unwrap();

        let (restored_meta, restored) = store.restore(meta.id).unwrap();
        assert_eq!(restored_meta, meta);
        assert_eq!(restored, captured);
    }

    #[test]
    fn ids_continue_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = SnapshotStore::open(dir.path()).unwrap();
            store.capture("one", &sample()).unwrap();
            store.capture("two", &sample()).unwrap();
        }
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        let meta = store.capture("three", &sample()).unwrap();
        assert_eq!(meta.id, 3);

        let ids: Vec<u64> = store.list().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn deleted_ids_are_not_reused() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        store.capture("one", &sample()).unwrap();
        store.delete(1).unwrap();

        let meta = store.capture("two", &sample()).unwrap();
        assert_eq!(meta.id, 2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.restore(99).unwrap_err(),
            SnapshotError::UnknownId { id: 99 }
        ));
        assert!(matches!(
            store.delete(99).unwrap_err(),
            SnapshotError::UnknownId { id: 99 }
        ));
    }

    #[test]
    fn tags_are_sanitized_for_directory_names() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        store.capture("pre restore / wip!", &sample()).unwrap();

        let snap_dir = dir.path().join(STORE_DIR).join("000001-pre-restore---wip-");
        assert!(snap_dir.is_dir());
        // The manifest keeps the original spelling.
        assert_eq!(store.list().unwrap()[0].tag, "pre restore / wip!");
    }

    #[test]
    fn stray_entries_in_the_store_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        store.capture("one", &sample()).unwrap();
        fs::write(dir.path().join(STORE_DIR).join("notes.txt"), "hi").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.next_id, 2);
    }

    #[test]
    fn stage_leftovers_are_swept_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = SnapshotStore::open(dir.path()).unwrap();
            store.capture("one", &sample()).unwrap();
        }
        let stage = dir.path().join(STORE_DIR).join(".stage-000007");
        fs::create_dir_all(&stage).unwrap();
        fs::write(stage.join("half.yaml"), "x: 1\n").unwrap();

        let mut store = SnapshotStore::open(dir.path()).unwrap();
        assert!(!stage.exists());
        assert_eq!(store.capture("two", &sample()).unwrap().id, 2);
    }

    #[test]
    fn restore_reads_only_manifest_files() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        let meta = store.capture("one", &sample()).unwrap();

        let snap_dir = dir.path().join(STORE_DIR).join("000001-one");
        fs::write(snap_dir.join("rogue.yaml"), "x: 1\n").unwrap();

        let (_, restored) = store.restore(meta.id).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|(rel, _)| rel != Path::new("rogue.yaml")));
    }

    #[test]
    fn empty_store_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
