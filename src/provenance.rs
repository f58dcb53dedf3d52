//! Per-leaf origin tracking for resolved trees.
//!
//! Provenance is a side-map keyed by normalized dotted path, kept apart from
//! the tree itself so a resolved tree stays plain data that can be compared
//! directly in tests. [`Provenance::record_layer`] mirrors the decisions of
//! [`deep_merge`](crate::merge::deep_merge): call it with the accumulated
//! tree and the incoming layer right before merging them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde_yaml::Value;

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A layer fragment, by its path relative to the config directory.
    Fragment(PathBuf),
    /// An override expression.
    Override,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Fragment(path) => write!(f, "{}", path.display()),
            Origin::Override => f.write_str("override"),
        }
    }
}

/// Map from dotted leaf path to the layer that last set it.
///
/// A sequence counts as one leaf at its own path, matching the wholesale
/// replacement rule of the merge. So does an empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    entries: BTreeMap<String, Origin>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin_of(&self, path: &str) -> Option<&Origin> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Origin)> {
        self.entries.iter().map(|(path, origin)| (path.as_str(), origin))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the effect of merging `overlay` onto `base`, attributing every
    /// path the overlay wins to `origin`. Must be called with the same pair
    /// that is about to be deep-merged.
    pub(crate) fn record_layer(&mut self, base: &Value, overlay: &Value, origin: &Origin) {
        self.record_layer_at("", base, overlay, origin);
    }

    fn record_layer_at(&mut self, prefix: &str, base: &Value, overlay: &Value, origin: &Origin) {
        match (base, overlay) {
            (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
                for (key, overlay_val) in overlay_map {
                    let child = child_path(prefix, &key_label(key));
                    match base_map.get(key) {
                        Some(base_val) => {
                            self.record_layer_at(&child, base_val, overlay_val, origin);
                        }
                        None => self.claim_subtree(&child, overlay_val, origin),
                    }
                }
            }
            // Anything else the overlay wins wholesale.
            _ => self.claim_subtree(prefix, overlay, origin),
        }
    }

    /// Attribute every leaf under `prefix` in `tree` to `origin`, discarding
    /// whatever was recorded below that prefix before.
    pub(crate) fn claim_subtree(&mut self, prefix: &str, tree: &Value, origin: &Origin) {
        self.drop_subtree(prefix);
        self.add_leaves(prefix, tree, origin);
    }

    /// Forget everything at and below `prefix`.
    pub(crate) fn drop_subtree(&mut self, prefix: &str) {
        if prefix.is_empty() {
            self.entries.clear();
            return;
        }
        let below = format!("{prefix}.");
        self.entries
            .retain(|path, _| path != prefix && !path.starts_with(&below));
    }

    fn add_leaves(&mut self, prefix: &str, tree: &Value, origin: &Origin) {
        match tree {
            Value::Mapping(map) if !map.is_empty() => {
                for (key, child) in map {
                    self.add_leaves(&child_path(prefix, &key_label(key)), child, origin);
                }
            }
            _ => {
                self.entries.insert(prefix.to_string(), origin.clone());
            }
        }
    }
}

fn child_path(prefix: &str, label: &str) -> String {
    if prefix.is_empty() {
        label.to_string()
    } else {
        format!("{prefix}.{label}")
    }
}

/// Render a mapping key for use in a dotted path. Non-string keys are legal
/// YAML; they get their scalar rendering.
fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}
