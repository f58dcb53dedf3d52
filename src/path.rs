//! Dotted paths addressing values inside a resolved tree.
//!
//! Shared by the override grammar (`server.port`, `retries.0`) and by
//! provenance keys, so both sides render paths identically.

use std::fmt;

/// One segment of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    /// A mapping key.
    Key(String),
    /// A numeric segment: indexes a sequence, or falls back to a numeric
    /// (then string-form) mapping key.
    Index(usize),
}

/// A parsed dotted path like `db.opts.timeout` or `servers.0.host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotPath {
    segments: Vec<PathSeg>,
}

impl DotPath {
    /// Parse a dotted path. Segments are split on `.`; a segment consisting
    /// entirely of ASCII digits becomes an index.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("empty path".to_string());
        }
        let mut segments = Vec::new();
        for seg in raw.split('.') {
            if seg.is_empty() {
                return Err("empty path segment".to_string());
            }
            // `"+5".parse::<usize>()` succeeds, so gate on digits explicitly.
            if seg.bytes().all(|b| b.is_ascii_digit())
                && let Ok(index) = seg.parse::<usize>()
            {
                segments.push(PathSeg::Index(index));
            } else {
                segments.push(PathSeg::Key(seg.to_string()));
            }
        }
        Ok(DotPath { segments })
    }

    pub fn segments(&self) -> &[PathSeg] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Render the first `depth` segments, for errors that point at the
    /// deepest prefix that was still valid.
    pub fn render_prefix(&self, depth: usize) -> String {
        let mut out = String::new();
        for seg in self.segments.iter().take(depth) {
            if !out.is_empty() {
                out.push('.');
            }
            match seg {
                PathSeg::Key(key) => out.push_str(key),
                PathSeg::Index(index) => out.push_str(&index.to_string()),
            }
        }
        out
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_prefix(self.segments.len()))
    }
}
