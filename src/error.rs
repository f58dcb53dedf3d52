use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Parse failure for one fragment, localized to its file and, when the
/// parser reports one, a 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse {path}: {message}")]
pub struct ParseError {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub(crate) fn from_yaml(path: impl Into<PathBuf>, err: &serde_yaml::Error) -> Self {
        let location = err.location();
        ParseError {
            path: path.into(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    /// A defaults entry selects a fragment that does not exist.
    #[error("No fragment for defaults entry '{}'", selection(.group, .option))]
    MissingFragment { group: String, option: String },

    /// The root or a selected fragment failed to parse.
    #[error(transparent)]
    Fragment(#[from] ParseError),

    /// A defaults entry selects the root fragment itself.
    #[error("Defaults entry selects the root fragment {path}")]
    SelfReference { path: PathBuf },

    /// A defaults entry that is neither a string nor a single-key mapping,
    /// or a `defaults` key that is not a sequence.
    #[error("Invalid defaults entry: {rendered}")]
    InvalidEntry { rendered: String },

    /// Several independent failures collected from one composition pass.
    #[error("{} composition errors", .0.len())]
    Multiple(Vec<CompositionError>),
}

impl CompositionError {
    /// Flatten into surfaced diagnostics, one per underlying failure.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            CompositionError::Multiple(errors) => errors
                .into_iter()
                .flat_map(CompositionError::into_diagnostics)
                .collect(),
            CompositionError::Fragment(parse) => vec![Diagnostic::from(parse)],
            other => vec![Diagnostic {
                kind: DiagnosticKind::Composition,
                file: None,
                line: None,
                message: other.to_string(),
            }],
        }
    }
}

fn selection(group: &str, option: &str) -> String {
    if group.is_empty() {
        option.to_string()
    } else {
        format!("{group}: {option}")
    }
}

/// One malformed override token. `token_index` identifies which token of the
/// line failed so a UI can underline just that token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bad override token '{token}' (token {token_index}): {message}")]
pub struct SyntaxError {
    pub token_index: usize,
    pub token: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// A plain SET addressed a path the resolved tree does not have.
    #[error("No such path '{path}' in the resolved tree (prefix with '++' to create it)")]
    UnknownPath { path: String },

    /// Descent hit a scalar where a mapping or sequence was needed.
    #[error("Cannot descend into '{path}': not a mapping or sequence")]
    NotAContainer { path: String },

    #[error("Index {index} out of range at '{path}' (sequence length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Snapshot store failures. Unlike the other families these are not degraded
/// into diagnostics: a snapshot directory that cannot be read or written is a
/// hard, user-visible failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No snapshot with id {id}")]
    UnknownId { id: u64 },

    #[error("Bad snapshot manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No snapshot directory attached to this session")]
    NoStore,
}

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Which error family a [`Diagnostic`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parse,
    Composition,
    OverrideSyntax,
    OverrideApply,
}

/// The uniform shape errors take in a published session result.
///
/// `file` and `line` are filled in when the underlying error is localized
/// (fragment parse errors are, override errors are not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, "{}:{line}: {}", file.display(), self.message)
            }
            (Some(file), None) => write!(f, "{}: {}", file.display(), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Parse,
            line: err.line,
            message: err.message,
            file: Some(err.path),
        }
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(err: SyntaxError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::OverrideSyntax,
            file: None,
            line: None,
            message: err.to_string(),
        }
    }
}

impl From<ApplyError> for Diagnostic {
    fn from(err: ApplyError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::OverrideApply,
            file: None,
            line: None,
            message: err.to_string(),
        }
    }
}
