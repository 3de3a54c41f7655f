use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::SyncConflict;
use crate::remote::{FolderId, ObjectId, RemoteError, RemoteStore};
use crate::util::unix_millis_now;

use super::SyncContext;

/// How eagerly [`SyncGate::refresh`] downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Download only when the remote copy is newer than the context's mark.
    IfStale,
    /// Download whenever a remote copy exists.
    Always,
}

/// What `ensure_local_fresh` did to the cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No remote copy and no cache file: an empty file was created.
    Created,
    /// No remote copy yet; the existing cache file was kept.
    LocalOnly,
    /// The cache already matched the remote copy.
    Current,
    /// The remote copy was downloaded over the cache.
    Downloaded { modified_at: i64 },
}

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nothing to push.
    Clean,
    /// Remote copy replaced; the mark moved to `modified_at`.
    Pushed { modified_at: i64 },
    /// Remote copy changed since the context last saw it; nothing written.
    Conflict(SyncConflict),
    /// The push failed; changes stay committed locally and the context stays dirty.
    Deferred { reason: String },
}

impl PushOutcome {
    /// Whether the remote copy now matches the cache.
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Clean | Self::Pushed { .. })
    }

    /// Turn a conflict into [`Error::Conflict`].
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Conflict(conflict) => Err(Error::Conflict(conflict)),
            other => Ok(other),
        }
    }
}

/// Remote copy as seen right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState {
    pub object_id: ObjectId,
    pub modified_at: i64,
}

/// Moves the database file between a context's cache and the remote store.
#[derive(Debug)]
pub struct SyncGate<S> {
    store: S,
    folder: FolderId,
    db_name: String,
}

impl<S: RemoteStore> SyncGate<S> {
    pub fn new(store: S, folder: FolderId, db_name: impl Into<String>) -> Self {
        Self {
            store,
            folder,
            db_name: db_name.into(),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Look up the remote copy and its modification time.
    pub fn remote_state(&self) -> Result<Option<RemoteState>> {
        let Some(object_id) = self.store.find_by_name(&self.db_name, &self.folder)? else {
            return Ok(None);
        };
        let modified_at = self.store.modified_time(&object_id)?;
        Ok(Some(RemoteState {
            object_id,
            modified_at,
        }))
    }

    /// Make sure the cache file exists and is at least as new as the remote copy.
    pub fn ensure_local_fresh(&self, ctx: &mut SyncContext) -> Result<Freshness> {
        self.refresh(ctx, Refresh::IfStale)
    }

    /// Bring the cache file in line with the remote copy.
    ///
    /// Refuses with [`Error::Conflict`] when a download is needed while the
    /// context holds unpushed changes. A clean open connection is closed
    /// before its file is replaced.
    pub fn refresh(&self, ctx: &mut SyncContext, mode: Refresh) -> Result<Freshness> {
        let Some(remote) = self.remote_state()? else {
            return create_if_missing(ctx.cache_path());
        };
        ctx.object_id = Some(remote.object_id.clone());

        let local_exists = ctx.cache_path().exists();
        let up_to_date = local_exists && !ctx.mark.is_behind(remote.modified_at);
        if up_to_date && mode == Refresh::IfStale {
            tracing::debug!(
                "Cache for context {} is current (remote {})",
                ctx.key,
                remote.modified_at
            );
            return Ok(Freshness::Current);
        }

        if ctx.is_dirty() {
            let conflict = ctx.record_conflict(remote.modified_at, &remote.object_id);
            tracing::warn!("Refusing to replace unpushed changes: {conflict}");
            return Err(Error::Conflict(conflict));
        }

        ctx.close_connection();
        self.download_into(&remote.object_id, ctx.cache_path())?;
        ctx.mark.advance(remote.modified_at);

        tracing::info!(
            "Downloaded {} into context {} (remote {})",
            self.db_name,
            ctx.key,
            remote.modified_at
        );
        Ok(Freshness::Downloaded {
            modified_at: remote.modified_at,
        })
    }

    /// Upload the cache file if the context is dirty and the remote copy has not moved.
    ///
    /// Never fails: remote errors become [`PushOutcome::Deferred`] and leave the
    /// context dirty so a later scope retries. Once the remote copy matches the
    /// cache, the context's retired remote objects are deleted.
    pub fn push_if_dirty(&self, ctx: &mut SyncContext) -> PushOutcome {
        let outcome = if ctx.is_dirty() {
            match self.push(ctx) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(
                        "Push for context {} deferred, changes kept locally: {error}",
                        ctx.key
                    );
                    PushOutcome::Deferred {
                        reason: error.to_string(),
                    }
                }
            }
        } else {
            PushOutcome::Clean
        };

        if outcome.is_synced() {
            self.purge_retired(ctx);
        }
        outcome
    }

    /// Delete retired objects; failures other than `NotFound` stay queued.
    fn purge_retired(&self, ctx: &SyncContext) {
        let pending = ctx.retired.take();
        let mut kept = Vec::new();
        for id in pending {
            match self.store.delete(&id) {
                Ok(()) | Err(RemoteError::NotFound(_)) => {
                    tracing::debug!("Deleted retired remote object {id}");
                }
                Err(error) => {
                    tracing::warn!("Could not delete retired remote object {id}: {error}");
                    kept.push(id);
                }
            }
        }
        ctx.retired.extend(kept);
    }

    fn push(&self, ctx: &mut SyncContext) -> Result<PushOutcome> {
        let existing = self.store.find_by_name(&self.db_name, &self.folder)?;

        let object_id = match existing {
            Some(object_id) => {
                let remote_modified_at = self.store.modified_time(&object_id)?;
                if ctx.mark.is_behind(remote_modified_at) {
                    let conflict = ctx.record_conflict(remote_modified_at, &object_id);
                    tracing::warn!("Push aborted: {conflict}");
                    return Ok(PushOutcome::Conflict(conflict));
                }
                self.store.update_content(&object_id, ctx.cache_path())?;
                object_id
            }
            None => self.store.upload(ctx.cache_path(), &self.folder)?,
        };

        let modified_at = self.store.modified_time(&object_id).unwrap_or_else(|error| {
            tracing::warn!("Could not read back modification time of {object_id}: {error}");
            unix_millis_now()
        });

        ctx.mark.advance(modified_at);
        ctx.object_id = Some(object_id);
        ctx.dirty.clear();

        tracing::info!(
            "Pushed {} from context {} (remote {modified_at})",
            self.db_name,
            ctx.key
        );
        Ok(PushOutcome::Pushed { modified_at })
    }

    fn download_into(&self, object_id: &ObjectId, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = sibling_path(path, ".download");
        if let Err(error) = self.store.download(object_id, &staging) {
            fs::remove_file(&staging).ok();
            return Err(error.into());
        }
        fs::rename(&staging, path)?;

        // A journal left by a previous handle would be replayed onto the new file.
        let journal = sibling_path(path, "-journal");
        if journal.exists() {
            fs::remove_file(&journal)?;
        }
        Ok(())
    }
}

fn create_if_missing(path: &Path) -> Result<Freshness> {
    if path.exists() {
        return Ok(Freshness::LocalOnly);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::File::create(path)?;
    tracing::info!("Created empty local database {}", path.display());
    Ok(Freshness::Created)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
