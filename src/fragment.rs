//! Layer fragments and the in-memory store of the current fragment set.
//!
//! The store holds raw text and the parse outcome per fragment. It performs
//! no I/O of its own; [`discover`](crate::discover) fills it from disk and
//! editors push new text in through [`FragmentStore::update`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::ParseError;

/// One layer file: raw text, its parse outcome, and a version counter bumped
/// on every effective text change.
#[derive(Debug, Clone)]
pub struct Fragment {
    rel_path: PathBuf,
    text: String,
    parsed: Result<Value, ParseError>,
    version: u64,
}

impl Fragment {
    pub(crate) fn new(rel_path: PathBuf, text: String) -> Self {
        let parsed = parse_document(&rel_path, &text);
        Fragment {
            rel_path,
            text,
            parsed,
            version: 1,
        }
    }

    /// Path relative to the config directory.
    pub fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    /// The raw text exactly as last written, preserved byte-for-byte for
    /// snapshots even when it does not parse.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed tree, or the parse diagnostic when the text is invalid.
    pub fn tree(&self) -> Result<&Value, &ParseError> {
        self.parsed.as_ref()
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parsed.as_ref().err()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the text and re-parse. Identical text is a no-op: no version
    /// bump, so no redundant re-resolution downstream.
    fn replace_text(&mut self, text: String) -> bool {
        if self.text == text {
            return false;
        }
        self.parsed = parse_document(&self.rel_path, &text);
        self.text = text;
        self.version += 1;
        true
    }
}

/// Parse one YAML document. An empty, comment-only, or literal-null document
/// normalizes to an empty mapping so the fragment composes as "contributes
/// nothing" rather than wholesale-replacing the accumulated tree.
fn parse_document(rel_path: &Path, text: &str) -> Result<Value, ParseError> {
    if is_effectively_empty(text) {
        return Ok(Value::Mapping(Mapping::new()));
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => Ok(Value::Mapping(Mapping::new())),
        Ok(value) => Ok(value),
        Err(err) => Err(ParseError::from_yaml(rel_path, &err)),
    }
}

fn is_effectively_empty(text: &str) -> bool {
    text.lines().all(|line| {
        let rest = line.trim_start();
        rest.is_empty() || rest.starts_with('#')
    })
}

/// The current set of fragments, keyed by relative path.
///
/// Iteration is in path order, so every walk over the store is
/// deterministic. Cloning the store is how a resolution pass checkpoints a
/// consistent view of the fragment set.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    fragments: BTreeMap<PathBuf, Fragment>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a fragment and return it.
    pub fn load(&mut self, rel_path: impl Into<PathBuf>, text: impl Into<String>) -> &Fragment {
        let text = text.into();
        match self.fragments.entry(rel_path.into()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().replace_text(text);
                slot.into_mut()
            }
            Entry::Vacant(slot) => {
                let fragment = Fragment::new(slot.key().clone(), text);
                slot.insert(fragment)
            }
        }
    }

    /// Replace a fragment's text, inserting it if new. Returns whether
    /// anything changed; pushing identical text is a no-op.
    pub fn update(&mut self, rel_path: impl Into<PathBuf>, text: impl Into<String>) -> bool {
        let text = text.into();
        match self.fragments.entry(rel_path.into()) {
            Entry::Occupied(mut slot) => slot.get_mut().replace_text(text),
            Entry::Vacant(slot) => {
                let fragment = Fragment::new(slot.key().clone(), text);
                slot.insert(fragment);
                true
            }
        }
    }

    pub fn get(&self, rel_path: impl AsRef<Path>) -> Option<&Fragment> {
        self.fragments.get(rel_path.as_ref())
    }

    pub fn contains(&self, rel_path: impl AsRef<Path>) -> bool {
        self.fragments.contains_key(rel_path.as_ref())
    }

    pub fn remove(&mut self, rel_path: impl AsRef<Path>) -> Option<Fragment> {
        self.fragments.remove(rel_path.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.fragments.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// One consistent read of every fragment's raw text, in path order.
    /// This is what snapshot capture records.
    pub fn texts(&self) -> Vec<(PathBuf, String)> {
        self.fragments
            .iter()
            .map(|(path, fragment)| (path.clone(), fragment.text.clone()))
            .collect()
    }

    /// Parse errors across the whole store, in path order.
    pub fn parse_errors(&self) -> impl Iterator<Item = &ParseError> {
        self.fragments.values().filter_map(Fragment::parse_error)
    }
}
