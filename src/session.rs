//! The interactive resolution session: edit, resolve, publish, repeat.
//!
//! A session owns the mutable fragment store, the override line, and the
//! chosen root. Every edit bumps a generation counter. Resolution follows a
//! checkpoint protocol built for editors that re-resolve on each keystroke:
//!
//! 1. [`Session::begin`] snapshots the inputs into a [`ResolutionPass`].
//! 2. [`ResolutionPass::run`] computes the result without any lock held.
//! 3. [`Session::publish`] installs the outcome, unless a newer edit
//!    already advanced the generation, in which case it is discarded.
//!
//! A failed pass never blanks the preview: the last good tree is
//! republished with `fresh: false` and the failure folded into the
//! diagnostics. Broken fragments that no defaults entry references are
//! surfaced as diagnostics without making the result stale.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info, trace};

use crate::apply;
use crate::compose::{self, Composition, PlanStep};
use crate::discover;
use crate::error::{Diagnostic, DiagnosticKind, DiscoverError, SnapshotError};
use crate::fragment::FragmentStore;
use crate::overrides;
use crate::provenance::Provenance;
use crate::snapshot::{SnapshotMeta, SnapshotStore};

/// Where a session sits in its edit/resolve cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing resolved yet and no pass checkpointed.
    Idle,
    /// A checkpoint exists; its pass may still be running.
    Resolving,
    /// The latest pass outcome is installed. Edits re-dirty the session
    /// without leaving this state.
    Published,
}

/// An immutable published result, shared with subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    /// Publish number, strictly increasing per session.
    pub seq: u64,
    /// Generation of the inputs this result was computed from.
    pub generation: u64,
    /// Root fragment the pass composed from, as checkpointed.
    pub root: Option<PathBuf>,
    pub tree: Value,
    pub provenance: Provenance,
    pub plan: Vec<PlanStep>,
    pub diagnostics: Vec<Diagnostic>,
    /// `false` when this publish re-exposes the previous good tree because
    /// the pass failed.
    pub fresh: bool,
}

/// Outcome of offering a pass result back to the session.
#[derive(Debug)]
pub enum Publish {
    /// The result is now the session's latest.
    Installed(Arc<SessionResult>),
    /// A newer edit invalidated the pass; nothing changed.
    Superseded,
}

/// What a restore produced: the snapshot now live and the automatic backup
/// captured just before it replaced the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored: SnapshotMeta,
    pub backup: SnapshotMeta,
}

/// An interactive resolution session over one fragment set.
#[derive(Debug)]
pub struct Session {
    store: FragmentStore,
    root: Option<PathBuf>,
    override_line: String,
    config_dir: Option<PathBuf>,
    snapshots: Option<SnapshotStore>,
    state: SessionState,
    generation: u64,
    next_seq: u64,
    latest: Option<Arc<SessionResult>>,
    subscribers: Vec<Sender<Arc<SessionResult>>>,
}

impl Session {
    /// Start a session over an in-memory store. Without a config directory
    /// the snapshot operations report [`SnapshotError::NoStore`].
    pub fn new(store: FragmentStore, root: Option<PathBuf>) -> Self {
        Self {
            store,
            root,
            override_line: String::new(),
            config_dir: None,
            snapshots: None,
            state: SessionState::Idle,
            generation: 1,
            next_seq: 1,
            latest: None,
            subscribers: Vec::new(),
        }
    }

    /// Load every fragment under `config_dir` and pick a root for it.
    pub fn open(config_dir: &Path) -> Result<Self, DiscoverError> {
        let store = discover::load_store(config_dir)?;
        let root = discover::find_root(&store).map(Path::to_path_buf);
        let root_label = root
            .as_deref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
        info!(
            dir = %config_dir.display(),
            fragments = store.len(),
            root = %root_label,
            "session open"
        );
        let mut session = Self::new(store, root);
        session.config_dir = Some(config_dir.to_path_buf());
        Ok(session)
    }

    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn override_line(&self) -> &str {
        &self.override_line
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Generation of the current inputs. Bumped by every effective edit.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn latest(&self) -> Option<Arc<SessionResult>> {
        self.latest.clone()
    }

    /// True when no published result reflects the current generation.
    pub fn is_dirty(&self) -> bool {
        self.latest
            .as_ref()
            .is_none_or(|result| result.generation != self.generation)
    }

    /// Replace (or add) a fragment's text. Returns whether anything
    /// actually changed; unchanged text does not dirty the session.
    pub fn update_fragment(&mut self, rel_path: impl Into<PathBuf>, text: impl Into<String>) -> bool {
        let changed = self.store.update(rel_path, text);
        if changed {
            self.touch();
        }
        changed
    }

    /// Drop a fragment from the working set.
    pub fn remove_fragment(&mut self, rel_path: impl AsRef<Path>) -> bool {
        let removed = self.store.remove(rel_path).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Swap the override line as a whole, the way an editor hands over the
    /// full contents of its input field.
    pub fn set_override_line(&mut self, line: impl Into<String>) -> bool {
        let line = line.into();
        if line == self.override_line {
            return false;
        }
        self.override_line = line;
        self.touch();
        true
    }

    /// Choose a different root fragment.
    pub fn set_root(&mut self, root: Option<PathBuf>) -> bool {
        if root == self.root {
            return false;
        }
        self.root = root;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.generation += 1;
        trace!(generation = self.generation, "inputs changed");
    }

    /// Checkpoint the current inputs for a pass. The clone makes the pass
    /// independent: edits after this point go into the next generation.
    pub fn begin(&mut self) -> ResolutionPass {
        self.state = SessionState::Resolving;
        trace!(generation = self.generation, "pass checkpoint");
        ResolutionPass {
            generation: self.generation,
            store: self.store.clone(),
            root: self.root.clone(),
            override_line: self.override_line.clone(),
        }
    }

    /// Install a pass outcome, or discard it when edits advanced the
    /// generation past its checkpoint.
    pub fn publish(&mut self, outcome: PassOutcome) -> Publish {
        if outcome.generation != self.generation {
            debug!(
                checkpoint = outcome.generation,
                current = self.generation,
                "pass superseded"
            );
            return Publish::Superseded;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let result = match outcome.tree {
            Some(tree) => Arc::new(SessionResult {
                seq,
                generation: outcome.generation,
                root: outcome.root,
                tree,
                provenance: outcome.provenance,
                plan: outcome.plan,
                diagnostics: outcome.diagnostics,
                fresh: true,
            }),
            None => {
                // Failed pass: keep the last good tree visible, marked
                // stale, with the failure in the diagnostics.
                let (tree, provenance, plan) = match &self.latest {
                    Some(prev) => (prev.tree.clone(), prev.provenance.clone(), prev.plan.clone()),
                    None => (Value::Mapping(Mapping::new()), Provenance::new(), Vec::new()),
                };
                Arc::new(SessionResult {
                    seq,
                    generation: outcome.generation,
                    root: outcome.root,
                    tree,
                    provenance,
                    plan,
                    diagnostics: outcome.diagnostics,
                    fresh: false,
                })
            }
        };

        debug!(
            seq = result.seq,
            generation = result.generation,
            fresh = result.fresh,
            diagnostics = result.diagnostics.len(),
            "published"
        );
        self.latest = Some(result.clone());
        self.state = SessionState::Published;
        self.notify(&result);
        Publish::Installed(result)
    }

    /// Resolve synchronously: cycle begin/run/publish until the published
    /// result matches the current generation.
    pub fn resolve_now(&mut self) -> Arc<SessionResult> {
        loop {
            if let Some(latest) = &self.latest
                && !self.is_dirty()
            {
                return latest.clone();
            }
            let outcome = self.begin().run();
            if let Publish::Installed(result) = self.publish(outcome)
                && result.generation == self.generation
            {
                return result;
            }
        }
    }

    /// Register for every future publish. Results arrive as shared
    /// pointers; a receiver that hangs up is dropped on the next publish.
    pub fn subscribe(&mut self) -> Receiver<Arc<SessionResult>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, result: &Arc<SessionResult>) {
        self.subscribers
            .retain(|tx| tx.send(result.clone()).is_ok());
    }

    /// Capture the working set (verbatim fragment texts) under `tag`.
    pub fn capture_snapshot(&mut self, tag: &str) -> Result<SnapshotMeta, SnapshotError> {
        let files = self.store.texts();
        let meta = self.snapshot_store()?.capture(tag, &files)?;
        info!(id = meta.id, tag, "captured snapshot");
        Ok(meta)
    }

    pub fn list_snapshots(&mut self) -> Result<Vec<SnapshotMeta>, SnapshotError> {
        self.snapshot_store()?.list()
    }

    /// Replace the working set with snapshot `id`.
    ///
    /// The current state is captured as an automatic `pre-restore` snapshot
    /// first, so a restore can itself be undone. Fragments absent from the
    /// snapshot disappear from the working set.
    pub fn restore_snapshot(&mut self, id: u64) -> Result<RestoreOutcome, SnapshotError> {
        let (restored, files) = self.snapshot_store()?.restore(id)?;
        let backup = self.capture_snapshot("pre-restore")?;

        let mut fresh = FragmentStore::new();
        for (rel, text) in files {
            fresh.load(rel, text);
        }
        self.store = fresh;
        self.touch();
        info!(id, backup = backup.id, "restored snapshot");
        Ok(RestoreOutcome { restored, backup })
    }

    pub fn delete_snapshot(&mut self, id: u64) -> Result<(), SnapshotError> {
        self.snapshot_store()?.delete(id)
    }

    fn snapshot_store(&mut self) -> Result<&mut SnapshotStore, SnapshotError> {
        if self.snapshots.is_none() {
            let Some(dir) = &self.config_dir else {
                return Err(SnapshotError::NoStore);
            };
            self.snapshots = Some(SnapshotStore::open(dir)?);
        }
        match &mut self.snapshots {
            Some(store) => Ok(store),
            None => Err(SnapshotError::NoStore),
        }
    }
}

/// A checkpointed pass over frozen inputs. Running it needs no lock and
/// touches no session state.
#[derive(Debug)]
pub struct ResolutionPass {
    generation: u64,
    store: FragmentStore,
    root: Option<PathBuf>,
    override_line: String,
}

impl ResolutionPass {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the full pipeline: compose, parse overrides, apply. The outcome
    /// carries `tree: None` when any stage failed, which [`Session::publish`]
    /// turns into a stale republish of the last good tree.
    pub fn run(self) -> PassOutcome {
        let mut diagnostics = Vec::new();

        let composition = self.compose(&mut diagnostics);
        let (mut tree, mut provenance, plan) = match composition {
            Some(c) => (Some(c.tree), c.provenance, c.plan),
            None => (None, Provenance::new(), Vec::new()),
        };

        match overrides::parse_line(&self.override_line) {
            Ok(ops) => {
                if let Some(composed) = tree.take() {
                    match apply::apply_tracked(composed, &ops, &mut provenance) {
                        Ok(applied) => tree = Some(applied),
                        Err(err) => diagnostics.push(Diagnostic::from(err)),
                    }
                }
            }
            Err(err) => {
                diagnostics.push(Diagnostic::from(err));
                tree = None;
            }
        }

        self.append_unreferenced(&plan, &mut diagnostics);

        PassOutcome {
            generation: self.generation,
            root: self.root,
            tree,
            provenance,
            plan,
            diagnostics,
        }
    }

    fn compose(&self, diagnostics: &mut Vec<Diagnostic>) -> Option<Composition> {
        let Some(root) = &self.root else {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Composition,
                file: None,
                line: None,
                message: "no root fragment selected".to_string(),
            });
            // An empty working set still publishes an empty, fresh tree.
            return Some(Composition {
                tree: Value::Mapping(Mapping::new()),
                provenance: Provenance::new(),
                plan: Vec::new(),
            });
        };
        let Some(fragment) = self.store.get(root) else {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Composition,
                file: Some(root.clone()),
                line: None,
                message: "root fragment not found".to_string(),
            });
            return None;
        };
        match compose::resolve(fragment, &self.store) {
            Ok(composition) => Some(composition),
            Err(err) => {
                diagnostics.extend(err.into_diagnostics());
                None
            }
        }
    }

    /// Broken fragments that nothing referenced still deserve a line in
    /// the diagnostics. They come after the pipeline's own, in path order,
    /// skipping files the pipeline already reported.
    fn append_unreferenced(&self, plan: &[PlanStep], diagnostics: &mut Vec<Diagnostic>) {
        let referenced: HashSet<&Path> = self
            .root
            .as_deref()
            .into_iter()
            .chain(plan.iter().filter_map(|step| step.fragment.as_deref()))
            .collect();
        for parse in self.store.parse_errors() {
            if referenced.contains(parse.path.as_path()) {
                continue;
            }
            if diagnostics
                .iter()
                .any(|d| d.file.as_deref() == Some(parse.path.as_path()))
            {
                continue;
            }
            diagnostics.push(Diagnostic::from(parse.clone()));
        }
    }
}

/// What a pass computed. Feed it back through [`Session::publish`].
#[derive(Debug)]
pub struct PassOutcome {
    generation: u64,
    root: Option<PathBuf>,
    tree: Option<Value>,
    provenance: Provenance,
    plan: Vec<PlanStep>,
    diagnostics: Vec<Diagnostic>,
}

impl PassOutcome {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// A session shared across threads: a mutex around [`Session`] plus
/// lock-free mirrors of the counters an editor polls per keystroke.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
    generation: Arc<AtomicU64>,
    published_seq: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        let generation = Arc::new(AtomicU64::new(session.generation));
        let published_seq = Arc::new(AtomicU64::new(
            session.latest.as_ref().map_or(0, |result| result.seq),
        ));
        Self {
            inner: Arc::new(Mutex::new(session)),
            generation,
            published_seq,
        }
    }

    /// Run one checkpoint/compute/publish cycle, computing outside the
    /// lock. Returns the installed result, or `None` when the pass was
    /// superseded by a newer edit.
    pub fn resolve_pending(&self) -> Option<Arc<SessionResult>> {
        let pass = self.lock().begin();
        let outcome = pass.run();
        let mut session = self.lock();
        match session.publish(outcome) {
            Publish::Installed(result) => {
                self.published_seq.store(result.seq, Ordering::SeqCst);
                self.generation.store(session.generation, Ordering::SeqCst);
                Some(result)
            }
            Publish::Superseded => None,
        }
    }

    pub fn update_fragment(&self, rel_path: impl Into<PathBuf>, text: impl Into<String>) -> bool {
        let mut session = self.lock();
        let changed = session.update_fragment(rel_path, text);
        self.generation.store(session.generation, Ordering::SeqCst);
        changed
    }

    pub fn set_override_line(&self, line: impl Into<String>) -> bool {
        let mut session = self.lock();
        let changed = session.set_override_line(line);
        self.generation.store(session.generation, Ordering::SeqCst);
        changed
    }

    /// Latest input generation, without taking the lock.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Seq of the newest published result, without taking the lock.
    pub fn published_seq(&self) -> u64 {
        self.published_seq.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Arc<SessionResult>> {
        self.lock().latest()
    }

    pub fn subscribe(&self) -> Receiver<Arc<SessionResult>> {
        self.lock().subscribe()
    }

    /// Run `f` under the session lock, for operations the handle does not
    /// wrap directly.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // A panicking pass cannot corrupt the session (passes run on
        // clones), so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{sample_dir, sample_store, store_from, ROOT};
    use crate::provenance::Origin;

    fn sample_session() -> Session {
        Session::new(sample_store(), Some(PathBuf::from(ROOT)))
    }

    #[test]
    fn first_resolve_publishes_a_fresh_tree() {
        let mut session = sample_session();
        assert!(session.is_dirty());

        let result = session.resolve_now();
        assert!(result.fresh);
        assert_eq!(result.seq, 1);
        assert_eq!(result.root.as_deref(), Some(Path::new(ROOT)));
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "mysql");
        assert_eq!(session.state(), SessionState::Published);
        assert!(!session.is_dirty());
    }

    #[test]
    fn clean_resolve_returns_the_cached_result() {
        let mut session = sample_session();
        let first = session.resolve_now();
        let second = session.resolve_now();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.seq, 1);
    }

    #[test]
    fn edits_dirty_and_the_next_resolve_reflects_them() {
        let mut session = sample_session();
        session.resolve_now();

        assert!(session.update_fragment("db/mysql.yaml", "driver: mariadb\nport: 3306\n"));
        assert!(session.is_dirty());

        let result = session.resolve_now();
        assert_eq!(result.seq, 2);
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "mariadb");
    }

    #[test]
    fn identical_update_does_not_dirty() {
        let mut session = sample_session();
        session.resolve_now();
        let text = session.store().get("db/postgres.yaml").unwrap().text().to_string();
        assert!(!session.update_fragment("db/postgres.yaml", text));
        assert!(!session.is_dirty());
    }

    #[test]
    fn override_line_flows_into_the_result() {
        let mut session = sample_session();
        session.set_override_line("db.port=9999 +app.motto=hi");
        let result = session.resolve_now();
        assert_eq!(result.tree["db"]["port"].as_i64().unwrap(), 9999);
        assert_eq!(result.tree["app"]["motto"].as_str().unwrap(), "hi");
        assert_eq!(
            result.provenance.origin_of("db.port"),
            Some(&Origin::Override)
        );
    }

    #[test]
    fn broken_root_republishes_last_good_as_stale() {
        let mut session = sample_session();
        session.resolve_now();

        session.update_fragment(ROOT, "defaults: [\n");
        let stale = session.resolve_now();
        assert!(!stale.fresh);
        assert_eq!(stale.seq, 2);
        // The tree is still the previous good one.
        assert_eq!(stale.tree["db"]["driver"].as_str().unwrap(), "mysql");
        assert!(
            stale
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::Parse)
        );

        // Fixing the fragment recovers a fresh result.
        session.update_fragment(
            ROOT,
            "defaults:\n  - db: postgres\napp:\n  name: shop\n",
        );
        let fixed = session.resolve_now();
        assert!(fixed.fresh);
        assert_eq!(fixed.tree["db"]["driver"].as_str().unwrap(), "postgres");
        assert!(fixed.diagnostics.is_empty());
    }

    #[test]
    fn unreferenced_broken_fragment_is_additive_only() {
        let mut session = sample_session();
        session.update_fragment("logging.yaml", "level: [oops\n");

        let result = session.resolve_now();
        assert!(result.fresh, "unreferenced breakage must not stale the tree");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(
            result.diagnostics[0].file.as_deref(),
            Some(Path::new("logging.yaml"))
        );
    }

    #[test]
    fn override_syntax_error_is_stale_with_token_position() {
        let mut session = sample_session();
        session.resolve_now();
        session.set_override_line("db.port=1 bogus");

        let result = session.resolve_now();
        assert!(!result.fresh);
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::OverrideSyntax)
            .unwrap();
        assert!(diag.message.contains("bogus"));
    }

    #[test]
    fn override_apply_error_is_stale() {
        let mut session = sample_session();
        session.set_override_line("nope.x=1");
        let result = session.resolve_now();
        assert!(!result.fresh);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::OverrideApply)
        );
    }

    #[test]
    fn no_root_publishes_an_empty_fresh_tree() {
        let mut session = Session::new(store_from(&[("db/mysql.yaml", "driver: mysql\n")]), None);
        let result = session.resolve_now();
        assert!(result.fresh);
        assert!(result.root.is_none());
        assert_eq!(result.tree, Value::Mapping(Mapping::new()));
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn removing_the_root_fragment_goes_stale() {
        let mut session = sample_session();
        session.resolve_now();
        assert!(session.remove_fragment(ROOT));

        let result = session.resolve_now();
        assert!(!result.fresh);
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "mysql");
    }

    #[test]
    fn mid_pass_edit_supersedes_the_publish() {
        let mut session = sample_session();
        let pass = session.begin();
        session.update_fragment("db/mysql.yaml", "driver: tidb\n");

        let outcome = pass.run();
        assert!(matches!(session.publish(outcome), Publish::Superseded));
        assert!(session.latest().is_none());

        // The next full cycle sees the edit.
        let result = session.resolve_now();
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "tidb");
    }

    #[test]
    fn seq_increases_across_fresh_and_stale_publishes() {
        let mut session = sample_session();
        session.resolve_now();
        session.set_override_line("broken");
        session.resolve_now();
        session.set_override_line("");
        let result = session.resolve_now();
        assert_eq!(result.seq, 3);
    }

    #[test]
    fn subscribers_receive_every_publish() {
        let mut session = sample_session();
        let rx = session.subscribe();

        session.resolve_now();
        session.set_override_line("db.port=1");
        session.resolve_now();

        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert_eq!(rx.try_recv().unwrap().seq, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn open_discovers_fragments_and_root() {
        let dir = sample_dir();
        let mut session = Session::open(dir.path()).unwrap();
        assert_eq!(session.root(), Some(Path::new(ROOT)));
        assert_eq!(session.store().len(), 5);

        let result = session.resolve_now();
        assert_eq!(result.tree["server"]["workers"].as_i64().unwrap(), 2);
    }

    #[test]
    fn snapshot_capture_and_restore_round_trip() {
        let dir = sample_dir();
        let mut session = Session::open(dir.path()).unwrap();
        session.resolve_now();

        let baseline = session.capture_snapshot("baseline").unwrap();
        session.update_fragment("db/mysql.yaml", "driver: mariadb\n");
        assert_eq!(
            session.resolve_now().tree["db"]["driver"].as_str().unwrap(),
            "mariadb"
        );

        let outcome = session.restore_snapshot(baseline.id).unwrap();
        assert_eq!(outcome.restored.id, baseline.id);
        assert_eq!(outcome.backup.tag, "pre-restore");

        let result = session.resolve_now();
        assert!(result.fresh);
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "mysql");

        let tags: Vec<String> = session
            .list_snapshots()
            .unwrap()
            .into_iter()
            .map(|meta| meta.tag)
            .collect();
        assert_eq!(tags, vec!["baseline".to_string(), "pre-restore".to_string()]);
    }

    #[test]
    fn restore_of_unknown_id_leaves_the_session_alone() {
        let dir = sample_dir();
        let mut session = Session::open(dir.path()).unwrap();
        let generation = session.generation();

        assert!(matches!(
            session.restore_snapshot(42).unwrap_err(),
            SnapshotError::UnknownId { id: 42 }
        ));
        assert_eq!(session.generation(), generation);
        assert!(session.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn in_memory_session_has_no_snapshot_store() {
        let mut session = sample_session();
        assert!(matches!(
            session.capture_snapshot("x").unwrap_err(),
            SnapshotError::NoStore
        ));
    }

    #[test]
    fn handle_resolves_on_another_thread() {
        let handle = SessionHandle::new(sample_session());

        let worker = handle.clone();
        let result = std::thread::spawn(move || worker.resolve_pending())
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(result.tree["db"]["driver"].as_str().unwrap(), "mysql");
        assert_eq!(handle.published_seq(), 1);
        assert_eq!(handle.generation(), 1);

        handle.set_override_line("db.port=7");
        assert_eq!(handle.generation(), 2);
        let result = handle.resolve_pending().unwrap();
        assert_eq!(result.tree["db"]["port"].as_i64().unwrap(), 7);
    }

    #[test]
    fn handle_discards_superseded_outcomes() {
        let handle = SessionHandle::new(sample_session());

        let pass = handle.with_session(|session| session.begin());
        handle.update_fragment("db/mysql.yaml", "driver: tidb\n");
        let outcome = pass.run();

        let publish = handle.with_session(|session| session.publish(outcome));
        assert!(matches!(publish, Publish::Superseded));
        assert!(handle.latest().is_none());
    }
}
