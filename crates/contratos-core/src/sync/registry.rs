use std::path::Path;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::{self, migrations};
use crate::error::{Error, Result};
use crate::remote::{FolderId, RemoteStore};

use super::{
    CachedConnection, ContextKey, DirtyFlag, PushOutcome, Refresh, RetiredObjects, Scoped,
    Session, SyncContext, SyncGate,
};

/// How [`ConnectionRegistry::resync`] settles a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Drop local changes and download the remote copy.
    TakeRemote,
    /// Overwrite the remote copy with the local one.
    KeepLocal,
}

/// Hands out per-context connections and scoped transactions.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    gate: SyncGate<S>,
}

impl<S: RemoteStore> ConnectionRegistry<S> {
    pub fn new(store: S, folder: FolderId, db_name: impl Into<String>) -> Self {
        Self {
            gate: SyncGate::new(store, folder, db_name),
        }
    }

    pub fn from_config(store: S, config: &AppConfig) -> Self {
        Self::new(
            store,
            config.database_folder_id.clone(),
            config.db_name.clone(),
        )
    }

    pub const fn gate(&self) -> &SyncGate<S> {
        &self.gate
    }

    /// A fresh context caching its file under `cache_dir`.
    pub fn context(&self, key: ContextKey, cache_dir: &Path) -> SyncContext {
        SyncContext::new(key, cache_dir, self.gate.db_name())
    }

    /// The context's connection, opening it on first use.
    ///
    /// Opening brings the cache up to date with the remote copy, then runs
    /// migrations; if they changed the file (fresh bootstrap included) the
    /// context is marked dirty so the new schema gets pushed.
    pub fn acquire<'c>(&self, ctx: &'c mut SyncContext) -> Result<&'c Connection> {
        let (conn, ..) = self.open_slot(ctx)?;
        Ok(conn)
    }

    /// Close the context's connection and clear its dirty flag. No-op when closed.
    pub fn release(&self, ctx: &mut SyncContext) {
        if ctx.is_open() {
            tracing::debug!("Releasing connection for context {}", ctx.key);
        }
        ctx.close_connection();
        ctx.dirty.clear();
    }

    /// Run `body` inside one transaction and push the result if it left the context dirty.
    ///
    /// On `Ok` the transaction commits, then the push runs; its outcome is
    /// reported in [`Scoped::sync`] and never fails the call. On `Err` the
    /// transaction rolls back, the dirty flag returns to its value before the
    /// scope, and nothing is pushed. A failed commit is returned without a push.
    /// Remote objects retired by the body are deleted only after a push that
    /// leaves the context in step with the remote copy.
    pub fn transaction<T>(
        &self,
        ctx: &mut SyncContext,
        body: impl FnOnce(&Session<'_>) -> Result<T>,
    ) -> Result<Scoped<T>> {
        let (conn, dirty, retired) = self.open_slot(ctx)?;
        let dirty_before = dirty.is_dirty();
        let retired_before = retired.len();
        let session = Session::begin(conn, dirty, retired)?;

        let value = match body(&session) {
            Ok(value) => value,
            Err(error) => {
                drop(session);
                dirty.set(dirty_before);
                retired.truncate(retired_before);
                return Err(error);
            }
        };

        if let Err(error) = session.commit() {
            dirty.set(dirty_before);
            retired.truncate(retired_before);
            return Err(error);
        }

        let sync = self.gate.push_if_dirty(ctx);
        Ok(Scoped { value, sync })
    }

    /// Push now, surfacing a conflict as an error.
    pub fn push(&self, ctx: &mut SyncContext) -> Result<PushOutcome> {
        self.gate.push_if_dirty(ctx).into_result()
    }

    /// Explicit re-sync after a conflict.
    pub fn resync(
        &self,
        ctx: &mut SyncContext,
        resolution: ConflictResolution,
    ) -> Result<PushOutcome> {
        match resolution {
            ConflictResolution::TakeRemote => {
                self.release(ctx);
                let kept = ctx.retired.take();
                if !kept.is_empty() {
                    tracing::info!(
                        "Context {} keeps {} remote file(s) its dropped changes had retired",
                        ctx.key,
                        kept.len()
                    );
                }
                let freshness = self.gate.refresh(ctx, Refresh::Always)?;
                tracing::info!("Context {} took the remote copy: {freshness:?}", ctx.key);
                Ok(PushOutcome::Clean)
            }
            ConflictResolution::KeepLocal => {
                if !ctx.cache_path().exists() {
                    return Err(Error::NotFound(format!(
                        "context {} has no local copy to keep",
                        ctx.key
                    )));
                }
                if let Some(remote) = self.gate.remote_state()? {
                    ctx.mark.advance(remote.modified_at);
                    ctx.object_id = Some(remote.object_id);
                }
                ctx.dirty.mark();
                tracing::info!("Context {} overwriting the remote copy", ctx.key);
                self.push(ctx)
            }
        }
    }

    fn open_slot<'c>(
        &self,
        ctx: &'c mut SyncContext,
    ) -> Result<(&'c mut Connection, &'c DirtyFlag, &'c RetiredObjects)> {
        let cached = match ctx.connection.take() {
            Some(cached) => cached,
            None => self.open(ctx)?,
        };
        let SyncContext {
            connection,
            dirty,
            retired,
            ..
        } = ctx;
        Ok((&mut connection.insert(cached).conn, &*dirty, &*retired))
    }

    fn open(&self, ctx: &mut SyncContext) -> Result<CachedConnection> {
        let freshness = self.gate.ensure_local_fresh(ctx)?;
        let conn = db::open(ctx.cache_path())?;

        let report = migrations::run(&conn)?;
        if report.changed() {
            tracing::info!(
                "Schema of context {} moved from v{} to v{}",
                ctx.key,
                report.from_version,
                report.to_version
            );
            ctx.dirty.mark();
        }

        tracing::debug!("Opened context {} ({freshness:?})", ctx.key);
        Ok(CachedConnection::new(conn))
    }
}
