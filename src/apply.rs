//! Apply parsed override operations to a resolved tree.
//!
//! Each operation walks the tree along its dotted path. How much of a
//! missing path it may create depends on the operation: a plain set creates
//! nothing, `+` creates the final segment, `++` creates every missing
//! mapping. Sequences are never created or extended implicitly; an index
//! segment only steps into or assigns within an existing one.

use serde_yaml::{Mapping, Value};
use tracing::trace;

use crate::error::ApplyError;
use crate::overrides::{OpKind, OverrideOp};
use crate::path::{DotPath, PathSeg};
use crate::provenance::{Origin, Provenance};

/// How much of a missing path an operation may create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Create {
    Never,
    LeafOnly,
    Recursive,
}

/// Apply `ops` to `tree` in order, returning the rewritten tree.
///
/// The tree is consumed; callers that need the pre-override state keep
/// their own clone. Application stops at the first failing operation.
pub fn apply(tree: Value, ops: &[OverrideOp]) -> Result<Value, ApplyError> {
    let mut tree = tree;
    for op in ops {
        apply_one(&mut tree, op)?;
    }
    Ok(tree)
}

/// Like [`apply`], also rewriting `provenance`: set and add operations claim
/// their path for the override layer, deletes drop it.
pub fn apply_tracked(
    tree: Value,
    ops: &[OverrideOp],
    provenance: &mut Provenance,
) -> Result<Value, ApplyError> {
    let mut tree = tree;
    for op in ops {
        apply_one(&mut tree, op)?;
        track(op, provenance);
    }
    Ok(tree)
}

fn apply_one(tree: &mut Value, op: &OverrideOp) -> Result<(), ApplyError> {
    trace!(path = %op.path, kind = ?op.kind, "applying override");
    if op.path.is_empty() {
        return Ok(());
    }
    match op.kind {
        OpKind::Delete => delete_in(tree, &op.path, 0),
        kind => {
            let value = op.value.clone().unwrap_or(Value::Null);
            let create = match kind {
                OpKind::Set => Create::Never,
                OpKind::AddLeaf => Create::LeafOnly,
                _ => Create::Recursive,
            };
            set_in(tree, &op.path, 0, value, create)
        }
    }
}

fn track(op: &OverrideOp, provenance: &mut Provenance) {
    let rendered = op.path.to_string();
    match (&op.kind, &op.value) {
        (OpKind::Delete, _) => provenance.drop_subtree(&rendered),
        (_, Some(value)) => provenance.claim_subtree(&rendered, value, &Origin::Override),
        (_, None) => {}
    }
}

fn set_in(
    cur: &mut Value,
    path: &DotPath,
    depth: usize,
    value: Value,
    create: Create,
) -> Result<(), ApplyError> {
    match &path.segments()[depth] {
        PathSeg::Key(key) => {
            let Some(map) = cur.as_mapping_mut() else {
                return Err(ApplyError::NotAContainer {
                    path: container_label(path, depth),
                });
            };
            set_key(map, Value::String(key.clone()), path, depth, value, create)
        }
        PathSeg::Index(index) => set_at_index(cur, path, depth, *index, value, create),
    }
}

/// Shared tail for mapping steps, whether the key came from a name segment
/// or from an index segment falling back to a numeric key.
fn set_key(
    map: &mut Mapping,
    key: Value,
    path: &DotPath,
    depth: usize,
    value: Value,
    create: Create,
) -> Result<(), ApplyError> {
    let last = depth + 1 == path.len();
    if last {
        if create == Create::Never && !map.contains_key(&key) {
            return Err(unknown(path));
        }
        map.insert(key, value);
        return Ok(());
    }
    // Intermediate segment: only `++` may materialize it.
    if !map.contains_key(&key) {
        if create == Create::Recursive {
            map.insert(key.clone(), Value::Mapping(Mapping::new()));
        } else {
            return Err(unknown(path));
        }
    }
    match map.get_mut(&key) {
        Some(child) => set_in(child, path, depth + 1, value, create),
        None => Err(unknown(path)),
    }
}

fn set_at_index(
    cur: &mut Value,
    path: &DotPath,
    depth: usize,
    index: usize,
    value: Value,
    create: Create,
) -> Result<(), ApplyError> {
    let last = depth + 1 == path.len();
    match cur {
        Value::Sequence(items) => {
            if index >= items.len() {
                return Err(ApplyError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            if last {
                items[index] = value;
                Ok(())
            } else {
                set_in(&mut items[index], path, depth + 1, value, create)
            }
        }
        // YAML mappings may carry numeric keys; prefer those, then the
        // digits as a string key.
        Value::Mapping(map) => {
            let key = mapping_key_for(map, index);
            set_key(map, key, path, depth, value, create)
        }
        _ => Err(ApplyError::NotAContainer {
            path: container_label(path, depth),
        }),
    }
}

fn delete_in(cur: &mut Value, path: &DotPath, depth: usize) -> Result<(), ApplyError> {
    let last = depth + 1 == path.len();
    match (&path.segments()[depth], cur) {
        (PathSeg::Key(key), Value::Mapping(map)) => {
            let key = Value::String(key.clone());
            if last {
                map.shift_remove(&key);
                Ok(())
            } else {
                match map.get_mut(&key) {
                    Some(child) => delete_in(child, path, depth + 1),
                    None => Ok(()),
                }
            }
        }
        (PathSeg::Index(index), Value::Sequence(items)) => {
            if last {
                if *index < items.len() {
                    items.remove(*index);
                }
                Ok(())
            } else {
                match items.get_mut(*index) {
                    Some(child) => delete_in(child, path, depth + 1),
                    None => Ok(()),
                }
            }
        }
        (PathSeg::Index(index), Value::Mapping(map)) => {
            let key = mapping_key_for(map, *index);
            if last {
                map.shift_remove(&key);
                Ok(())
            } else {
                match map.get_mut(&key) {
                    Some(child) => delete_in(child, path, depth + 1),
                    None => Ok(()),
                }
            }
        }
        // The path runs through something that is not there or not a
        // container: nothing to delete.
        _ => Ok(()),
    }
}

fn mapping_key_for(map: &Mapping, index: usize) -> Value {
    let numeric = Value::Number((index as i64).into());
    if map.contains_key(&numeric) {
        numeric
    } else {
        Value::String(index.to_string())
    }
}

fn container_label(path: &DotPath, depth: usize) -> String {
    if depth == 0 {
        "(root)".to_string()
    } else {
        path.render_prefix(depth)
    }
}

fn unknown(path: &DotPath) -> ApplyError {
    ApplyError::UnknownPath {
        path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::parse_line;

    fn val(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn run(tree: &str, line: &str) -> Result<Value, ApplyError> {
        apply(val(tree), &parse_line(line).unwrap())
    }

    #[test]
    fn set_replaces_an_existing_leaf() {
        let tree = run("db:\n  port: 3306\n", "db.port=5432").unwrap();
        assert_eq!(tree["db"]["port"].as_i64().unwrap(), 5432);
    }

    #[test]
    fn set_refuses_a_missing_path() {
        let err = run("db:\n  port: 3306\n", "db.timeout=5").unwrap_err();
        assert!(matches!(
            err,
            ApplyError::UnknownPath { ref path } if path == "db.timeout"
        ));
    }

    #[test]
    fn add_creates_only_the_final_segment() {
        let tree = run("db:\n  port: 3306\n", "+db.timeout=5").unwrap();
        assert_eq!(tree["db"]["timeout"].as_i64().unwrap(), 5);

        // Parents must already exist.
        let err = run("db:\n  port: 3306\n", "+cache.size=64").unwrap_err();
        assert!(matches!(err, ApplyError::UnknownPath { .. }));
    }

    #[test]
    fn add_may_overwrite_an_existing_leaf() {
        let tree = run("db:\n  port: 3306\n", "+db.port=1").unwrap();
        assert_eq!(tree["db"]["port"].as_i64().unwrap(), 1);
    }

    #[test]
    fn force_add_builds_the_whole_chain() {
        let tree = run("a:\n  b: 1\n", "++x.y.z=ok").unwrap();
        assert_eq!(tree["x"]["y"]["z"].as_str().unwrap(), "ok");
        assert_eq!(tree["a"]["b"].as_i64().unwrap(), 1);
    }

    #[test]
    fn set_fails_where_force_add_succeeds() {
        let base = "a:\n  b: 1\n";
        assert!(matches!(
            run(base, "a.c=2").unwrap_err(),
            ApplyError::UnknownPath { .. }
        ));
        let tree = run(base, "++a.c=2").unwrap();
        assert_eq!(tree["a"]["c"].as_i64().unwrap(), 2);
        assert_eq!(tree["a"]["b"].as_i64().unwrap(), 1);
    }

    #[test]
    fn delete_removes_and_is_idempotent() {
        let once = run("db:\n  port: 3306\n  host: x\n", "~db.port").unwrap();
        assert!(once["db"].get("port").is_none());
        assert_eq!(once["db"]["host"].as_str().unwrap(), "x");

        let twice = apply(once.clone(), &parse_line("~db.port").unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn delete_of_a_missing_path_is_a_noop() {
        let tree = run("a: 1\n", "~b.c.d").unwrap();
        assert_eq!(tree, val("a: 1\n"));
    }

    #[test]
    fn delete_through_a_scalar_is_a_noop() {
        let tree = run("a: 5\n", "~a.b").unwrap();
        assert_eq!(tree["a"].as_i64().unwrap(), 5);
    }

    #[test]
    fn set_through_a_scalar_names_the_container() {
        let err = run("db:\n  port: 3306\n", "db.port.x=1").unwrap_err();
        assert!(matches!(
            err,
            ApplyError::NotAContainer { ref path } if path == "db.port"
        ));
    }

    #[test]
    fn set_on_a_scalar_root_names_the_root() {
        let err = apply(val("5\n"), &parse_line("a=1").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::NotAContainer { ref path } if path == "(root)"
        ));
    }

    #[test]
    fn index_assigns_within_a_sequence() {
        let tree = run(
            "servers:\n  - host: a\n  - host: b\n",
            "servers.1.host=c",
        )
        .unwrap();
        assert_eq!(tree["servers"][1]["host"].as_str().unwrap(), "c");
        assert_eq!(tree["servers"][0]["host"].as_str().unwrap(), "a");
    }

    #[test]
    fn index_out_of_range_reports_the_length() {
        let err = run("servers:\n  - host: a\n", "servers.5.host=x").unwrap_err();
        assert!(matches!(
            err,
            ApplyError::IndexOutOfRange { index: 5, len: 1, .. }
        ));
    }

    #[test]
    fn sequences_are_never_extended() {
        let err = run("tags:\n  - a\n  - b\n", "+tags.2=c").unwrap_err();
        assert!(matches!(err, ApplyError::IndexOutOfRange { .. }));
    }

    #[test]
    fn delete_removes_a_sequence_element() {
        let tree = run("tags:\n  - a\n  - b\n", "~tags.0").unwrap();
        let tags = tree["tags"].as_sequence().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].as_str().unwrap(), "b");
    }

    #[test]
    fn digit_segment_reaches_numeric_mapping_keys() {
        let tree = run("ports:\n  8080: web\n", "ports.8080=api").unwrap();
        assert_eq!(tree, val("ports:\n  8080: api\n"));
    }

    #[test]
    fn digit_segment_falls_back_to_string_keys() {
        let tree = run("opts:\n  '5': x\n", "opts.5=y").unwrap();
        assert_eq!(tree["opts"]["5"].as_str().unwrap(), "y");
    }

    #[test]
    fn operations_apply_left_to_right() {
        let tree = run("a: 0\n", "++b.c=1 b.c=2 a=9").unwrap();
        assert_eq!(tree["b"]["c"].as_i64().unwrap(), 2);
        assert_eq!(tree["a"].as_i64().unwrap(), 9);
    }

    #[test]
    fn tracked_set_claims_the_override_layer() {
        let mut prov = Provenance::new();
        let tree = apply_tracked(
            val("db:\n  port: 3306\n"),
            &parse_line("db.port=9 ++db.opts={\"t\":5}").unwrap(),
            &mut prov,
        )
        .unwrap();
        assert_eq!(tree["db"]["opts"]["t"].as_i64().unwrap(), 5);
        assert_eq!(prov.origin_of("db.port"), Some(&Origin::Override));
        assert_eq!(prov.origin_of("db.opts.t"), Some(&Origin::Override));
    }

    #[test]
    fn tracked_delete_drops_the_claim() {
        let mut prov = Provenance::new();
        prov.claim_subtree("db.port", &val("3306"), &Origin::Override);
        apply_tracked(
            val("db:\n  port: 3306\n"),
            &parse_line("~db.port").unwrap(),
            &mut prov,
        )
        .unwrap();
        assert_eq!(prov.origin_of("db.port"), None);
    }
}
