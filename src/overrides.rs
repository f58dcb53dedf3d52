//! Parse a command-line style override line into typed operations.
//!
//! An override line is whitespace-split into tokens of the form
//! `[prefix]path=value`:
//!
//! | token           | operation                                       |
//! |-----------------|-------------------------------------------------|
//! | `db.port=5432`  | set an existing path                            |
//! | `+db.retries=3` | set, creating at most the final segment         |
//! | `++a.b.c=1`     | set, creating every missing mapping on the path |
//! | `~db.port`      | delete; a no-op when the path is absent         |
//!
//! Values are parsed leniently: `[` or `{` starts YAML flow syntax,
//! otherwise a scalar heuristic applies (bool, integer, float, null, quoted
//! string, plain string). Parsing stops at the first bad token and reports
//! its position, so callers can pinpoint it inside the edited line.

use serde_yaml::Value;

use crate::error::SyntaxError;
use crate::path::DotPath;

/// What an override token does to the resolved tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Bare token. The full path must already exist.
    Set,
    /// `+` prefix. The final segment may be new; parents must exist.
    AddLeaf,
    /// `++` prefix. Creates every missing mapping along the path.
    ForceAdd,
    /// `~` prefix. Removes the path when present.
    Delete,
}

/// One parsed override operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideOp {
    pub kind: OpKind,
    pub path: DotPath,
    /// The parsed value; `None` only for [`OpKind::Delete`].
    pub value: Option<Value>,
}

/// Split `line` on whitespace and parse each token into an [`OverrideOp`].
///
/// An empty or blank line produces an empty list. The first malformed token
/// aborts the parse and reports its index and text.
pub fn parse_line(line: &str) -> Result<Vec<OverrideOp>, SyntaxError> {
    let mut ops = Vec::new();
    for (index, token) in line.split_whitespace().enumerate() {
        let op = parse_token(token).map_err(|message| SyntaxError {
            token_index: index,
            token: token.to_string(),
            message,
        })?;
        ops.push(op);
    }
    Ok(ops)
}

fn parse_token(token: &str) -> Result<OverrideOp, String> {
    // Longest prefix first, or `++` would read as `+` twice.
    let (kind, rest) = if let Some(rest) = token.strip_prefix("++") {
        (OpKind::ForceAdd, rest)
    } else if let Some(rest) = token.strip_prefix('+') {
        (OpKind::AddLeaf, rest)
    } else if let Some(rest) = token.strip_prefix('~') {
        (OpKind::Delete, rest)
    } else {
        (OpKind::Set, token)
    };

    if kind == OpKind::Delete {
        // `~path=anything` is legal; the value is ignored.
        let raw_path = rest.split_once('=').map_or(rest, |(path, _)| path);
        let path = DotPath::parse(raw_path)?;
        return Ok(OverrideOp {
            kind,
            path,
            value: None,
        });
    }

    let Some((raw_path, raw_value)) = rest.split_once('=') else {
        return Err("missing '=' (write path=value)".to_string());
    };
    let path = DotPath::parse(raw_path)?;
    let value = parse_value(raw_value)?;
    Ok(OverrideOp {
        kind,
        path,
        value: Some(value),
    })
}

fn parse_value(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return serde_yaml::from_str(trimmed).map_err(|e| format!("bad flow value: {e}"));
    }
    Ok(parse_scalar(trimmed))
}

/// The scalar heuristic: null spellings, bool, integer, float, then string
/// with one matched layer of quotes stripped.
fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() || raw == "null" || raw == "~" {
        return Value::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    // Only an explicit float spelling makes a float: `0.5` and `3e2`
    // qualify, `nan` does not, and `8080` stays an integer above.
    if raw.contains(['.', 'e', 'E'])
        && let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Value::Number(f.into());
    }
    Value::String(unquote(raw).to_string())
}

fn unquote(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0]
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}
