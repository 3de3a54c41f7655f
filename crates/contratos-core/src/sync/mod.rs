//! Local-database-as-a-synced-singleton.
//!
//! Each [`SyncContext`] owns one cache copy of the database file plus the
//! state needed to keep it in step with the remote copy: the open handle, the
//! dirty flag and the last remote modification time it observed. The
//! [`ConnectionRegistry`] hands out connections and scoped transactions over a
//! context; the [`SyncGate`] moves the file between cache and remote store and
//! refuses to overwrite a remote copy that changed behind the context's back.

mod gate;
mod registry;
mod session;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::SyncConflict;
use crate::remote::ObjectId;
use crate::util::unix_millis_now;

pub use gate::{Freshness, PushOutcome, Refresh, RemoteState, SyncGate};
pub use registry::{ConflictResolution, ConnectionRegistry};
pub use session::{Scoped, Session};

/// Name of an isolated execution context. Also names its cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(key))
        } else {
            Err(Error::InvalidInput(format!(
                "context key {key:?} must be non-empty and use only \
                 letters, digits, '-', '_' or '.'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the cache holds committed changes the remote copy has not seen.
#[derive(Debug, Default)]
pub struct DirtyFlag(Cell<bool>);

impl DirtyFlag {
    pub fn mark(&self) {
        self.0.set(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.0.get()
    }

    pub fn clear(&self) {
        self.0.set(false);
    }

    pub(crate) fn set(&self, dirty: bool) {
        self.0.set(dirty);
    }
}

/// Last remote modification time (unix ms) this context observed.
///
/// Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteVersionMark(Option<i64>);

impl RemoteVersionMark {
    pub const fn get(self) -> Option<i64> {
        self.0
    }

    pub(crate) fn advance(&mut self, observed: i64) {
        self.0 = Some(self.0.map_or(observed, |current| current.max(observed)));
    }

    /// Whether a remote copy modified at `remote` is newer than anything seen here.
    pub const fn is_behind(self, remote: i64) -> bool {
        match self.0 {
            Some(mark) => remote > mark,
            None => true,
        }
    }
}

/// Remote objects whose rows were deleted locally.
///
/// They are only deleted remotely once the database without those rows has
/// reached the remote store; until then a take-remote re-sync still needs them.
#[derive(Debug, Default)]
pub struct RetiredObjects(RefCell<Vec<ObjectId>>);

impl RetiredObjects {
    pub fn retire(&self, id: ObjectId) {
        self.0.borrow_mut().push(id);
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub(crate) fn truncate(&self, len: usize) {
        self.0.borrow_mut().truncate(len);
    }

    pub(crate) fn take(&self) -> Vec<ObjectId> {
        self.0.take()
    }

    pub(crate) fn extend(&self, ids: Vec<ObjectId>) {
        self.0.borrow_mut().extend(ids);
    }
}

/// The open handle of a context.
#[derive(Debug)]
pub struct CachedConnection {
    conn: Connection,
    opened_at: i64,
}

impl CachedConnection {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            opened_at: unix_millis_now(),
        }
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// When the handle was opened (unix ms).
    pub const fn opened_at(&self) -> i64 {
        self.opened_at
    }

    fn close(self, context: &ContextKey) {
        if let Err((_, error)) = self.conn.close() {
            tracing::warn!("Closing database for context {context} failed: {error}");
        }
    }
}

const STATE_FILE: &str = "sync-state.json";

/// Part of a context that outlives the process, stored next to the cache file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    dirty: bool,
    remote_mark: Option<i64>,
    object_id: Option<ObjectId>,
    #[serde(default)]
    retired: Vec<ObjectId>,
}

/// Everything one execution context knows about its copy of the database.
#[derive(Debug)]
pub struct SyncContext {
    key: ContextKey,
    cache_path: PathBuf,
    connection: Option<CachedConnection>,
    dirty: DirtyFlag,
    retired: RetiredObjects,
    mark: RemoteVersionMark,
    object_id: Option<ObjectId>,
    conflicts: Vec<SyncConflict>,
}

impl SyncContext {
    /// A context whose cache file is `<cache_dir>/<key>/<db_name>`.
    pub fn new(key: ContextKey, cache_dir: &Path, db_name: &str) -> Self {
        let cache_path = cache_dir.join(key.as_str()).join(db_name);
        Self {
            key,
            cache_path,
            connection: None,
            dirty: DirtyFlag::default(),
            retired: RetiredObjects::default(),
            mark: RemoteVersionMark::default(),
            object_id: None,
            conflicts: Vec::new(),
        }
    }

    /// Like [`SyncContext::new`], but picks up the dirty flag, mark and
    /// retired objects a previous process left with [`SyncContext::persist`].
    ///
    /// A saved dirty flag is ignored when the cache file is gone, and so are
    /// the retired objects of those unpushed changes.
    pub fn restore(key: ContextKey, cache_dir: &Path, db_name: &str) -> Result<Self> {
        let mut ctx = Self::new(key, cache_dir, db_name);
        let state_path = ctx.state_path();
        if !state_path.exists() {
            return Ok(ctx);
        }

        let state: PersistedState = serde_json::from_slice(&std::fs::read(&state_path)?)?;
        if let Some(mark) = state.remote_mark {
            ctx.mark.advance(mark);
        }
        ctx.object_id = state.object_id;
        let cache_exists = ctx.cache_path.exists();
        ctx.dirty.set(state.dirty && cache_exists);
        if cache_exists || !state.dirty {
            ctx.retired.extend(state.retired);
        }
        tracing::debug!(
            "Restored context {} (dirty: {}, mark: {:?})",
            ctx.key,
            ctx.is_dirty(),
            ctx.remote_mark()
        );
        Ok(ctx)
    }

    /// Save the dirty flag, mark and retired objects for [`SyncContext::restore`].
    pub fn persist(&self) -> Result<()> {
        let state = PersistedState {
            dirty: self.is_dirty(),
            remote_mark: self.remote_mark(),
            object_id: self.object_id.clone(),
            retired: self.retired.ids(),
        };
        let state_path = self.state_path();
        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&state_path, serde_json::to_vec_pretty(&state)?)?;
        Ok(())
    }

    fn state_path(&self) -> PathBuf {
        self.cache_path.with_file_name(STATE_FILE)
    }

    pub const fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub const fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub const fn cached_connection(&self) -> Option<&CachedConnection> {
        self.connection.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn mark_dirty(&self) {
        self.dirty.mark();
    }

    pub fn clear_dirty(&self) {
        self.dirty.clear();
    }

    pub const fn remote_mark(&self) -> Option<i64> {
        self.mark.get()
    }

    /// Remote object last resolved for this context.
    pub const fn object_id(&self) -> Option<&ObjectId> {
        self.object_id.as_ref()
    }

    /// Remote objects waiting for a successful push before they are deleted.
    pub fn retired_objects(&self) -> Vec<ObjectId> {
        self.retired.ids()
    }

    /// Conflicts detected in this context, oldest first.
    pub fn conflicts(&self) -> &[SyncConflict] {
        &self.conflicts
    }

    fn close_connection(&mut self) {
        if let Some(cached) = self.connection.take() {
            cached.close(&self.key);
        }
    }

    fn record_conflict(&mut self, remote_modified_at: i64, object_id: &ObjectId) -> SyncConflict {
        let conflict = SyncConflict {
            context: self.key.to_string(),
            object_id: object_id.to_string(),
            local_mark: self.mark.get(),
            remote_modified_at,
            detected_at: unix_millis_now(),
        };
        self.conflicts.push(conflict.clone());
        conflict
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn context_key_rejects_path_tricks() {
        assert!(ContextKey::new("worker-1").is_ok());
        assert!(ContextKey::new("").is_err());
        assert!(ContextKey::new("..").is_err());
        assert!(ContextKey::new("a/b").is_err());
    }

    #[test]
    fn mark_only_moves_forward() {
        let mut mark = RemoteVersionMark::default();
        assert!(mark.is_behind(1));

        mark.advance(2_000);
        mark.advance(1_000);
        assert_eq!(mark.get(), Some(2_000));
        assert!(!mark.is_behind(2_000));
        assert!(mark.is_behind(2_001));
    }

    #[test]
    fn context_cache_path_is_per_key() {
        let ctx = SyncContext::new(
            ContextKey::new("a").unwrap(),
            Path::new("/cache"),
            "db.db",
        );
        assert_eq!(ctx.cache_path(), Path::new("/cache/a/db.db"));
        assert!(!ctx.is_dirty());
        assert!(!ctx.is_open());
    }

    #[test]
    fn persisted_state_survives_a_new_context() {
        let tmp = tempfile::tempdir().unwrap();
        let key = ContextKey::new("cli").unwrap();

        let mut ctx = SyncContext::new(key.clone(), tmp.path(), "db.db");
        std::fs::create_dir_all(ctx.cache_path().parent().unwrap()).unwrap();
        std::fs::write(ctx.cache_path(), b"").unwrap();
        ctx.mark.advance(5_000);
        ctx.mark_dirty();
        ctx.persist().unwrap();

        let restored = SyncContext::restore(key.clone(), tmp.path(), "db.db").unwrap();
        assert!(restored.is_dirty());
        assert_eq!(restored.remote_mark(), Some(5_000));

        std::fs::remove_file(ctx.cache_path()).unwrap();
        let without_cache = SyncContext::restore(key, tmp.path(), "db.db").unwrap();
        assert!(!without_cache.is_dirty());
        assert_eq!(without_cache.remote_mark(), Some(5_000));
    }

    #[test]
    fn restore_without_state_is_a_fresh_context() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = SyncContext::restore(ContextKey::new("x").unwrap(), tmp.path(), "db.db").unwrap();
        assert_eq!(ctx.remote_mark(), None);
        assert!(!ctx.is_dirty());
    }
}
