//! Remote object store contract and its implementations.
//!
//! The sync core only ever talks to a [`RemoteStore`]; the Google Drive client,
//! the retry decorator and the in-memory store all implement it.

mod drive;
mod memory;
mod retry;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use drive::{DriveCredentials, GoogleDriveStore};
pub use memory::{InMemoryStore, StoreOperation};
pub use retry::{RetryPolicy, RetryingStore};

/// Result type for remote store calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failures reported by a remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failure, timeout, throttling or 5xx; worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// The addressed object does not exist.
    #[error("remote object not found: {0}")]
    NotFound(String),
    /// The store rejected the request.
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Credentials could not be loaded or were refused.
    #[error("remote authentication failed: {0}")]
    Auth(String),
    /// Local file IO around a transfer failed.
    #[error("local IO during transfer failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Identifier of a stored object (file) in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a folder in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(String);

impl FolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ObjectId> for FolderId {
    fn from(id: &ObjectId) -> Self {
        Self(id.0.clone())
    }
}

/// One child of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: ObjectId,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
    /// Unix ms
    pub modified_at: i64,
}

/// Blocking contract of the folder-addressed blob store.
///
/// Every call blocks the caller until it completes or its transport timeout
/// fires. Timestamps are Unix milliseconds as reported by the store.
pub trait RemoteStore {
    /// Look up an object by exact name inside `parent`.
    fn find_by_name(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>>;

    /// Download the object's content to `destination`, replacing it.
    fn download(&self, id: &ObjectId, destination: &Path) -> RemoteResult<()>;

    /// Create a new object in `parent` from a local file, named after the file.
    fn upload(&self, local_path: &Path, parent: &FolderId) -> RemoteResult<ObjectId>;

    /// Replace the content of an existing object, keeping its id.
    fn update_content(&self, id: &ObjectId, local_path: &Path) -> RemoteResult<()>;

    /// Last modification time of the object.
    fn modified_time(&self, id: &ObjectId) -> RemoteResult<i64>;

    /// Find a folder by name under `parent`, creating it when absent.
    fn ensure_folder(&self, name: &str, parent: Option<&FolderId>) -> RemoteResult<FolderId>;

    /// Create a new object from in-memory bytes.
    fn upload_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId>;

    /// Read an object's content into memory.
    fn download_bytes(&self, id: &ObjectId) -> RemoteResult<Vec<u8>>;

    /// Delete an object.
    fn delete(&self, id: &ObjectId) -> RemoteResult<()>;

    /// List the children of a folder.
    fn list_folder(&self, parent: &FolderId) -> RemoteResult<Vec<RemoteEntry>>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for &S {
    fn find_by_name(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>> {
        (**self).find_by_name(name, parent)
    }

    fn download(&self, id: &ObjectId, destination: &Path) -> RemoteResult<()> {
        (**self).download(id, destination)
    }

    fn upload(&self, local_path: &Path, parent: &FolderId) -> RemoteResult<ObjectId> {
        (**self).upload(local_path, parent)
    }

    fn update_content(&self, id: &ObjectId, local_path: &Path) -> RemoteResult<()> {
        (**self).update_content(id, local_path)
    }

    fn modified_time(&self, id: &ObjectId) -> RemoteResult<i64> {
        (**self).modified_time(id)
    }

    fn ensure_folder(&self, name: &str, parent: Option<&FolderId>) -> RemoteResult<FolderId> {
        (**self).ensure_folder(name, parent)
    }

    fn upload_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId> {
        (**self).upload_bytes(bytes, name, mime_type, parent)
    }

    fn download_bytes(&self, id: &ObjectId) -> RemoteResult<Vec<u8>> {
        (**self).download_bytes(id)
    }

    fn delete(&self, id: &ObjectId) -> RemoteResult<()> {
        (**self).delete(id)
    }

    fn list_folder(&self, parent: &FolderId) -> RemoteResult<Vec<RemoteEntry>> {
        (**self).list_folder(parent)
    }
}
