//! Composition: turn a root fragment's `defaults` list into a merged tree.
//!
//! Operates on a preloaded [`FragmentStore`] with no I/O, so the whole
//! pipeline is testable with synthetic fragments. Steps:
//!
//! 1. Parse the root's `defaults` sequence into [`DefaultsEntry`] items.
//! 2. Resolve each entry to a fragment and build the ordered merge plan,
//!    collecting every failure instead of stopping at the first.
//! 3. Merge the selected trees left to right; the root's own keys merge at
//!    the `_self_` position, or last when no entry places them.
//! 4. Record provenance as each layer lands.
//!
//! Duplicate entries for one group are not deduplicated: each applies in
//! sequence and the last one wins, the same precedence rule as everywhere
//! else. Re-declaring a group with a different option is the idiom for
//! switching presets.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::CompositionError;
use crate::fragment::{Fragment, FragmentStore};
use crate::merge::deep_merge;
use crate::provenance::{Origin, Provenance};

/// Key of the composition list in a root fragment.
pub const DEFAULTS_KEY: &str = "defaults";

/// Entry that positions the root's own keys within the precedence order.
pub const SELF_ENTRY: &str = "_self_";

/// One item of a root fragment's `defaults` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    /// `group: option`, selecting `group/option.yaml` nested under the
    /// group's key path. An `override group: option` spelling normalizes to
    /// this; re-selecting a group later in the list is how presets switch.
    Select { group: String, option: String },
    /// `group: null`, an explicit opt-out. Merges nothing.
    OptOut { group: String },
    /// A bare name, selecting the top-level fragment `name.yaml`.
    Bare(String),
    /// `_self_`: the root fragment's own keys merge here.
    SelfMarker,
}

impl fmt::Display for DefaultsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultsEntry::Select { group, option } => write!(f, "{group}: {option}"),
            DefaultsEntry::OptOut { group } => write!(f, "{group}: null"),
            DefaultsEntry::Bare(name) => f.write_str(name),
            DefaultsEntry::SelfMarker => f.write_str(SELF_ENTRY),
        }
    }
}

/// One step of the ordered merge plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub entry: DefaultsEntry,
    /// Resolved fragment path, for steps that select one.
    pub fragment: Option<PathBuf>,
}

/// A composed tree plus its provenance and the plan that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub tree: Value,
    pub provenance: Provenance,
    pub plan: Vec<PlanStep>,
}

/// Build the ordered merge plan for `root` without executing it.
///
/// The returned plan always contains exactly the steps a [`resolve`] call
/// would run, including the appended `_self_` step when the defaults list
/// does not place one. Failures across the whole list are collected; a list
/// with several bad entries reports all of them.
pub fn plan(root: &Fragment, store: &FragmentStore) -> Result<Vec<PlanStep>, CompositionError> {
    let tree = root
        .tree()
        .map_err(|e| CompositionError::Fragment(e.clone()))?;
    let Some(items) = defaults_items(tree)? else {
        // No defaults list: the root's own keys are the whole composition.
        return Ok(vec![PlanStep {
            entry: DefaultsEntry::SelfMarker,
            fragment: None,
        }]);
    };

    let mut steps = Vec::with_capacity(items.len() + 1);
    let mut errors = Vec::new();
    let mut saw_self = false;

    for item in items {
        let entry = match parse_entry(item) {
            Ok(entry) => entry,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };
        let fragment = match &entry {
            DefaultsEntry::Select { group, option } => {
                match locate(root, store, group, option, &mut errors) {
                    Some(path) => Some(path),
                    None => continue,
                }
            }
            DefaultsEntry::Bare(name) => match locate(root, store, "", name, &mut errors) {
                Some(path) => Some(path),
                None => continue,
            },
            DefaultsEntry::SelfMarker => {
                saw_self = true;
                None
            }
            DefaultsEntry::OptOut { .. } => None,
        };
        steps.push(PlanStep { entry, fragment });
    }

    match errors.len() {
        0 => {}
        1 => return Err(errors.remove(0)),
        _ => return Err(CompositionError::Multiple(errors)),
    }

    if !saw_self {
        steps.push(PlanStep {
            entry: DefaultsEntry::SelfMarker,
            fragment: None,
        });
    }
    Ok(steps)
}

/// Execute the full composition for `root`: plan, merge, track provenance.
/// Pure with respect to the store; every call builds new trees.
pub fn resolve(root: &Fragment, store: &FragmentStore) -> Result<Composition, CompositionError> {
    let steps = plan(root, store)?;
    let root_tree = root
        .tree()
        .map_err(|e| CompositionError::Fragment(e.clone()))?;
    let own = own_keys(root_tree);
    let root_origin = Origin::Fragment(root.rel_path().to_path_buf());

    let mut tree = Value::Mapping(Mapping::new());
    let mut provenance = Provenance::new();

    for step in &steps {
        let (layer, origin) = match (&step.entry, &step.fragment) {
            (DefaultsEntry::SelfMarker, _) => (own.clone(), root_origin.clone()),
            (DefaultsEntry::OptOut { group }, _) => {
                trace!(group = %group, "defaults opt-out");
                continue;
            }
            (DefaultsEntry::Select { group, .. }, Some(path)) => (
                nest_under(group, fragment_tree(store, path)?),
                Origin::Fragment(path.clone()),
            ),
            (DefaultsEntry::Bare(_), Some(path)) => {
                (fragment_tree(store, path)?, Origin::Fragment(path.clone()))
            }
            // Selection steps always carry their fragment; nothing to merge
            // otherwise.
            (_, None) => continue,
        };
        trace!(entry = %step.entry, "merging layer");
        provenance.record_layer(&tree, &layer, &origin);
        tree = deep_merge(tree, layer);
    }

    debug!(
        root = %root.rel_path().display(),
        steps = steps.len(),
        leaves = provenance.len(),
        "composition complete"
    );
    Ok(Composition {
        tree,
        provenance,
        plan: steps,
    })
}

/// The root's own contribution: its mapping minus the `defaults` key.
fn own_keys(tree: &Value) -> Value {
    match tree {
        Value::Mapping(map) => {
            let own: Mapping = map
                .iter()
                .filter(|(key, _)| !matches!(key, Value::String(s) if s == DEFAULTS_KEY))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Value::Mapping(own)
        }
        other => other.clone(),
    }
}

fn defaults_items(tree: &Value) -> Result<Option<&Vec<Value>>, CompositionError> {
    match tree.get(DEFAULTS_KEY) {
        None => Ok(None),
        Some(Value::Sequence(items)) => Ok(Some(items)),
        Some(other) => Err(CompositionError::InvalidEntry {
            rendered: format!("defaults is {}, expected a sequence", kind_name(other)),
        }),
    }
}

fn parse_entry(item: &Value) -> Result<DefaultsEntry, CompositionError> {
    match item {
        Value::String(name) if name == SELF_ENTRY => Ok(DefaultsEntry::SelfMarker),
        Value::String(name) if !name.trim().is_empty() => {
            Ok(DefaultsEntry::Bare(name.trim().to_string()))
        }
        Value::Mapping(map) if map.len() == 1 => {
            if let Some((key, value)) = map.iter().next() {
                parse_selection(key, value)
            } else {
                Err(invalid(item))
            }
        }
        _ => Err(invalid(item)),
    }
}

fn parse_selection(key: &Value, value: &Value) -> Result<DefaultsEntry, CompositionError> {
    let Value::String(raw_group) = key else {
        return Err(invalid_pair(key, value));
    };
    // `override db: postgres` re-selects an earlier group. The keyword adds
    // nothing here because later entries already win, so it normalizes away.
    let group = raw_group
        .strip_prefix("override ")
        .unwrap_or(raw_group)
        .trim()
        .to_string();
    if group.is_empty() {
        return Err(invalid_pair(key, value));
    }
    match value {
        Value::Null => Ok(DefaultsEntry::OptOut { group }),
        Value::String(option) if !option.trim().is_empty() => Ok(DefaultsEntry::Select {
            group,
            option: option.trim().to_string(),
        }),
        Value::Number(n) => Ok(DefaultsEntry::Select {
            group,
            option: n.to_string(),
        }),
        Value::Bool(b) => Ok(DefaultsEntry::Select {
            group,
            option: b.to_string(),
        }),
        _ => Err(invalid_pair(key, value)),
    }
}

/// Find the fragment for a selection and vet it: it must exist, must not be
/// the root itself, and must parse. Pushes the failure and returns `None`
/// otherwise.
fn locate(
    root: &Fragment,
    store: &FragmentStore,
    group: &str,
    option: &str,
    errors: &mut Vec<CompositionError>,
) -> Option<PathBuf> {
    let stem = if group.is_empty() {
        option.to_string()
    } else {
        format!("{group}/{option}")
    };
    let found = [format!("{stem}.yaml"), format!("{stem}.yml")]
        .into_iter()
        .find_map(|candidate| store.get(Path::new(&candidate)));

    let Some(fragment) = found else {
        errors.push(CompositionError::MissingFragment {
            group: group.to_string(),
            option: option.to_string(),
        });
        return None;
    };
    if fragment.rel_path() == root.rel_path() {
        errors.push(CompositionError::SelfReference {
            path: fragment.rel_path().to_path_buf(),
        });
        return None;
    }
    if let Err(parse) = fragment.tree() {
        errors.push(CompositionError::Fragment(parse.clone()));
        return None;
    }
    Some(fragment.rel_path().to_path_buf())
}

fn fragment_tree(store: &FragmentStore, path: &Path) -> Result<Value, CompositionError> {
    match store.get(path) {
        Some(fragment) => fragment
            .tree()
            .map(|tree| tree.clone())
            .map_err(|e| CompositionError::Fragment(e.clone())),
        None => Err(CompositionError::MissingFragment {
            group: String::new(),
            option: path.display().to_string(),
        }),
    }
}

/// Wrap a selected fragment's tree under its group key path: `db: postgres`
/// contributes `{db: <tree>}`, `db/engine: innodb` contributes
/// `{db: {engine: <tree>}}`.
fn nest_under(group: &str, tree: Value) -> Value {
    let mut value = tree;
    for seg in group.split('/').filter(|s| !s.is_empty()).rev() {
        let mut wrapper = Mapping::new();
        wrapper.insert(Value::String(seg.to_string()), value);
        value = Value::Mapping(wrapper);
    }
    value
}

fn invalid(item: &Value) -> CompositionError {
    CompositionError::InvalidEntry {
        rendered: render(item),
    }
}

fn invalid_pair(key: &Value, value: &Value) -> CompositionError {
    CompositionError::InvalidEntry {
        rendered: format!("{}: {}", render(key), render(value)),
    }
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().replace('\n', " "))
        .unwrap_or_else(|_| "?".to_string())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        _ => "a tagged value",
    }
}
