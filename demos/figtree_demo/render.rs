//! Rendering helpers for the demo: YAML output, provenance annotations,
//! merge plans, and diagnostic lines.

use figtree::{SessionResult, Value};

/// Diagnostics go to stderr so the tree on stdout stays pipeable.
pub fn print_diagnostics(result: &SessionResult) {
    for diagnostic in &result.diagnostics {
        eprintln!("warning: {diagnostic}");
    }
    if !result.fresh {
        eprintln!("note: resolution failed; showing the last good tree");
    }
}

pub fn print_tree(result: &SessionResult) {
    match serde_yaml::to_string(&result.tree) {
        Ok(rendered) => print!("{rendered}"),
        Err(err) => eprintln!("Failed to render tree: {err}"),
    }
}

/// One line per leaf: `path  value  # origin`, aligned on the path column.
pub fn print_with_origins(result: &SessionResult) {
    if result.provenance.is_empty() {
        println!("(empty tree)");
        return;
    }
    let width = result
        .provenance
        .iter()
        .map(|(path, _)| path.len())
        .max()
        .unwrap_or(0);
    for (path, origin) in result.provenance.iter() {
        let value = value_at(&result.tree, path)
            .map(render_inline)
            .unwrap_or_else(|| "?".to_string());
        println!("{path:<width$}  {value}  # {origin}");
    }
}

pub fn print_plan(result: &SessionResult) {
    for (index, step) in result.plan.iter().enumerate() {
        match &step.fragment {
            Some(path) => println!("{:>2}. {}  ({})", index + 1, step.entry, path.display()),
            None => println!("{:>2}. {}", index + 1, step.entry),
        }
    }
}

fn value_at<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = tree;
    for seg in path.split('.') {
        cur = match cur {
            Value::Sequence(items) => items.get(seg.parse::<usize>().ok()?)?,
            other => other.get(seg)?,
        };
    }
    Some(cur)
}

fn render_inline(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().replace('\n', " "))
        .unwrap_or_else(|_| "?".to_string())
}
