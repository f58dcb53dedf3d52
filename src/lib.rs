//! Live preview for layered YAML configuration. Compose fragments, type
//! overrides, and see the exact tree your application would receive.
//!
//! Figtree resolves a directory of YAML fragments the way a Hydra-style
//! loader would: a root file's `defaults` list selects fragments from option
//! groups, the selections deep-merge in order, and a line of command-style
//! override tokens is applied on top. Every resolved leaf knows which layer
//! produced it.
//!
//! ```
//! use std::path::PathBuf;
//!
//! use figtree::{FragmentStore, Session};
//!
//! let mut store = FragmentStore::new();
//! store.load("config.yaml", "defaults:\n  - db: mysql\ndb:\n  pool: 4\n");
//! store.load("db/mysql.yaml", "driver: mysql\nport: 3306\n");
//!
//! let mut session = Session::new(store, Some(PathBuf::from("config.yaml")));
//! session.set_override_line("db.port=5432");
//!
//! let result = session.resolve_now();
//! assert_eq!(result.tree["db"]["driver"].as_str(), Some("mysql"));
//! assert_eq!(result.tree["db"]["port"].as_i64(), Some(5432));
//! assert!(result.fresh);
//! ```
//!
//! # Why figtree
//!
//! Layered configuration is easy to write and hard to predict. Once a tree
//! is assembled from a defaults list, a handful of group options, and a few
//! ad-hoc overrides, the only reliable way to know what a key resolves to
//! is to run the resolution. Figtree makes that resolution a first-class,
//! repeatable operation: edit a fragment or the override line, resolve
//! again, and inspect the merged tree, the merge plan, and the provenance
//! of every leaf. Editors can re-resolve on each keystroke; the session
//! protocol keeps slow passes from publishing over newer edits.
//!
//! # Composition model
//!
//! Fragments are YAML files under one directory, keyed by relative path.
//! The root fragment may carry a `defaults` list whose entries select what
//! to merge:
//!
//! - **`group: option`** selects `group/option.yaml` and nests its tree
//!   under the group's key path (`db/engine: innodb` lands under
//!   `db.engine`). Re-selecting a group later replaces the earlier choice
//!   key-by-key.
//! - **`name`** (a bare string) selects the top-level `name.yaml`; its tree
//!   merges at the root, not under a group key.
//! - **`group: null`** opts a group out. Nothing merges.
//! - **`_self_`** positions the root's own keys in the order. Without it
//!   they merge last.
//! - **`override group: option`** is accepted and treated as an ordinary
//!   re-selection.
//!
//! Lookups try `.yaml` then `.yml`. A selection with no matching fragment
//! is an error, not a skip, and every bad entry in the list is reported in
//! one pass rather than the first alone.
//!
//! # Layer precedence
//!
//! ```text
//! selected fragments     defaults list order, later entries win
//!        ↑ overridden by
//! root's own keys        at the _self_ position (default: last)
//!        ↑ overridden by
//! override line          tokens applied left to right
//! ```
//!
//! Merging is recursive for mappings and wholesale for everything else: a
//! sequence or scalar from a later layer replaces the earlier value
//! entirely, and sequences are never merged element-wise. Key order is
//! preserved, with later layers' new keys appended.
//!
//! # Override grammar
//!
//! The override line is split on whitespace into `[prefix]path=value`
//! tokens:
//!
//! | token           | effect                                            |
//! |-----------------|---------------------------------------------------|
//! | `db.port=5432`  | set; the full path must already exist             |
//! | `+db.retries=3` | set, creating at most the final segment           |
//! | `++a.b.c=1`     | set, creating every missing mapping along the way |
//! | `~db.port`      | delete; a no-op when the path is absent           |
//!
//! Paths are dotted; a digits-only segment indexes into a sequence (or
//! falls back to a numeric mapping key). Values starting with `[` or `{`
//! parse as YAML flow syntax. Everything else goes through a scalar
//! heuristic: `true`/`false`, integer, explicitly spelled float, `null`,
//! then string, with one matched layer of quotes forcing string. Sequences
//! are never created or extended by overrides.
//!
//! # Sessions, staleness, and the publish protocol
//!
//! A [`Session`] owns the fragment store, the chosen root, and the override
//! line. Edits bump a generation counter. [`Session::begin`] checkpoints
//! the inputs into a [`ResolutionPass`], `run` computes without any lock,
//! and [`Session::publish`] installs the outcome only if no newer edit
//! arrived in between; otherwise the pass is discarded and a fresh one
//! picks up the newer inputs. [`Session::resolve_now`] drives that loop
//! synchronously, and [`SessionHandle`] shares one session across threads.
//!
//! A failed pass never blanks the preview. The previous good tree is
//! republished with `fresh: false` and the failure appears in the
//! diagnostics, so a half-typed edit shows a stale-but-usable tree instead
//! of nothing. Broken fragments that no defaults entry references are
//! reported as diagnostics without making the result stale.
//!
//! # Snapshots
//!
//! [`Session::capture_snapshot`] copies the working set, byte for byte,
//! into `.figtree-snapshots/` beside the configuration. Restoring swaps a
//! snapshot back into the working set after automatically capturing a
//! `pre-restore` backup, so a restore can itself be undone. Snapshot ids
//! grow monotonically across reopens and are never reused.
//!
//! # Error handling
//!
//! Anything a user can cause by editing YAML or typing overrides surfaces
//! as a [`Diagnostic`] on the published result, uniformly shaped with an
//! optional file and line. Programming-level failures (I/O, snapshot
//! manifests, unknown snapshot ids) return typed errors from the [`error`]
//! module instead.

pub mod error;

mod apply;
mod compose;
mod discover;
mod fragment;
mod merge;
mod overrides;
mod path;
mod provenance;
mod session;
mod snapshot;

#[cfg(test)]
mod fixtures;

pub use apply::{apply, apply_tracked};
pub use compose::{
    plan, resolve, Composition, DefaultsEntry, PlanStep, DEFAULTS_KEY, SELF_ENTRY,
};
pub use discover::{find_root, list_fragments, load_store};
pub use error::{
    ApplyError, CompositionError, Diagnostic, DiagnosticKind, DiscoverError, ParseError,
    SnapshotError, SyntaxError,
};
pub use fragment::{Fragment, FragmentStore};
pub use merge::deep_merge;
pub use overrides::{parse_line, OpKind, OverrideOp};
pub use path::{DotPath, PathSeg};
pub use provenance::{Origin, Provenance};
pub use session::{
    PassOutcome, Publish, ResolutionPass, RestoreOutcome, Session, SessionHandle, SessionResult,
    SessionState,
};
pub use snapshot::{SnapshotMeta, SnapshotStore, STORE_DIR};

pub use serde_yaml::Value;
