//! In-process remote store with a logical clock and fault injection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{FolderId, ObjectId, RemoteEntry, RemoteError, RemoteResult, RemoteStore};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const CLOCK_START_MS: i64 = 1_700_000_000_000;
const CLOCK_STEP_MS: i64 = 1_000;

/// Operations the store counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindByName,
    Download,
    Upload,
    UpdateContent,
    ModifiedTime,
    EnsureFolder,
    UploadBytes,
    DownloadBytes,
    Delete,
    ListFolder,
}

#[derive(Debug, Clone)]
struct StoredObject {
    name: String,
    parent: Option<FolderId>,
    mime_type: String,
    bytes: Vec<u8>,
    modified_at: i64,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<ObjectId, StoredObject>,
    clock: i64,
    next_id: u64,
    calls: HashMap<StoreOperation, usize>,
    pending_failures: HashMap<StoreOperation, usize>,
    lost_replies: HashMap<StoreOperation, usize>,
}

impl State {
    fn tick(&mut self) -> i64 {
        self.clock = if self.clock == 0 {
            CLOCK_START_MS
        } else {
            self.clock + CLOCK_STEP_MS
        };
        self.clock
    }

    fn allocate_id(&mut self) -> ObjectId {
        self.next_id += 1;
        ObjectId::new(format!("mem-{:04}", self.next_id))
    }

    fn enter(&mut self, operation: StoreOperation) -> RemoteResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(remaining) = self.pending_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transient(format!(
                    "injected failure for {operation:?}"
                )));
            }
        }
        Ok(())
    }

    /// Fails after the write already happened, as a timeout on the reply would.
    fn reply(&mut self, operation: StoreOperation) -> RemoteResult<()> {
        if let Some(remaining) = self.lost_replies.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transient(format!(
                    "injected lost reply for {operation:?}"
                )));
            }
        }
        Ok(())
    }

    fn object(&self, id: &ObjectId) -> RemoteResult<&StoredObject> {
        self.objects
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn find_child(&self, name: &str, parent: Option<&FolderId>) -> Option<ObjectId> {
        let mut matches = self
            .objects
            .iter()
            .filter(|(_, object)| object.name == name && object.parent.as_ref() == parent)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        matches.into_iter().next()
    }

    fn insert(
        &mut self,
        name: &str,
        parent: Option<&FolderId>,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> ObjectId {
        let id = self.allocate_id();
        let modified_at = self.tick();
        self.objects.insert(
            id.clone(),
            StoredObject {
                name: name.to_string(),
                parent: parent.cloned(),
                mime_type: mime_type.to_string(),
                bytes,
                modified_at,
            },
        );
        id
    }
}

/// Remote store kept entirely in memory.
///
/// Every write advances a logical clock by one second so modification times
/// are strictly increasing, which makes conflict scenarios deterministic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` calls of `operation` fail with a transient error.
    pub fn fail_next(&self, operation: StoreOperation, count: usize) {
        self.state().pending_failures.insert(operation, count);
    }

    /// Let the next `count` calls of `operation` take effect, then report a
    /// transient error anyway.
    pub fn lose_reply_next(&self, operation: StoreOperation, count: usize) {
        self.state().lost_replies.insert(operation, count);
    }

    /// Number of times `operation` was called, failed attempts included.
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Forget all call counters.
    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Content of an object, if it exists.
    pub fn content(&self, id: &ObjectId) -> Option<Vec<u8>> {
        self.state().objects.get(id).map(|object| object.bytes.clone())
    }

    /// Id of the object named `name` directly under `parent`, without counting a call.
    pub fn lookup(&self, name: &str, parent: &FolderId) -> Option<ObjectId> {
        self.state().find_child(name, Some(parent))
    }

    /// Replace an object's content as another writer would, bumping its modification time.
    pub fn overwrite(&self, id: &ObjectId, bytes: Vec<u8>) -> RemoteResult<i64> {
        let mut state = self.state();
        let modified_at = state.tick();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        object.bytes = bytes;
        object.modified_at = modified_at;
        Ok(modified_at)
    }
}

impl RemoteStore for InMemoryStore {
    fn find_by_name(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>> {
        let mut state = self.state();
        state.enter(StoreOperation::FindByName)?;
        Ok(state.find_child(name, Some(parent)))
    }

    fn download(&self, id: &ObjectId, destination: &Path) -> RemoteResult<()> {
        let bytes = {
            let mut state = self.state();
            state.enter(StoreOperation::Download)?;
            state.object(id)?.bytes.clone()
        };
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, bytes)?;
        Ok(())
    }

    fn upload(&self, local_path: &Path, parent: &FolderId) -> RemoteResult<ObjectId> {
        self.state().enter(StoreOperation::Upload)?;
        let bytes = std::fs::read(local_path)?;
        let name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();
        let mut state = self.state();
        let id = state.insert(&name, Some(parent), &mime_type, bytes);
        state.reply(StoreOperation::Upload)?;
        Ok(id)
    }

    fn update_content(&self, id: &ObjectId, local_path: &Path) -> RemoteResult<()> {
        self.state().enter(StoreOperation::UpdateContent)?;
        let bytes = std::fs::read(local_path)?;
        let mut state = self.state();
        let modified_at = state.tick();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        object.bytes = bytes;
        object.modified_at = modified_at;
        Ok(())
    }

    fn modified_time(&self, id: &ObjectId) -> RemoteResult<i64> {
        let mut state = self.state();
        state.enter(StoreOperation::ModifiedTime)?;
        Ok(state.object(id)?.modified_at)
    }

    fn ensure_folder(&self, name: &str, parent: Option<&FolderId>) -> RemoteResult<FolderId> {
        let mut state = self.state();
        state.enter(StoreOperation::EnsureFolder)?;
        if let Some(existing) = state.find_child(name, parent) {
            if state.object(&existing)?.mime_type == FOLDER_MIME_TYPE {
                return Ok(FolderId::from(&existing));
            }
        }
        let id = state.insert(name, parent, FOLDER_MIME_TYPE, Vec::new());
        Ok(FolderId::from(&id))
    }

    fn upload_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId> {
        let mut state = self.state();
        state.enter(StoreOperation::UploadBytes)?;
        let id = state.insert(name, Some(parent), mime_type, bytes.to_vec());
        state.reply(StoreOperation::UploadBytes)?;
        Ok(id)
    }

    fn download_bytes(&self, id: &ObjectId) -> RemoteResult<Vec<u8>> {
        let mut state = self.state();
        state.enter(StoreOperation::DownloadBytes)?;
        Ok(state.object(id)?.bytes.clone())
    }

    fn delete(&self, id: &ObjectId) -> RemoteResult<()> {
        let mut state = self.state();
        state.enter(StoreOperation::Delete)?;
        state
            .objects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn list_folder(&self, parent: &FolderId) -> RemoteResult<Vec<RemoteEntry>> {
        let mut state = self.state();
        state.enter(StoreOperation::ListFolder)?;
        let mut entries = state
            .objects
            .iter()
            .filter(|(_, object)| object.parent.as_ref() == Some(parent))
            .map(|(id, object)| RemoteEntry {
                id: id.clone(),
                name: object.name.clone(),
                mime_type: object.mime_type.clone(),
                size_bytes: u64::try_from(object.bytes.len()).ok(),
                modified_at: object.modified_at,
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_folder_is_idempotent() {
        let store = InMemoryStore::new();
        let root = store.ensure_folder("Empresas", None).unwrap();
        let again = store.ensure_folder("Empresas", None).unwrap();
        assert_eq!(root, again);

        let child = store.ensure_folder("ACME", Some(&root)).unwrap();
        assert_ne!(child, root);
        assert_eq!(store.list_folder(&root).unwrap().len(), 1);
    }

    #[test]
    fn writes_advance_modification_time() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data.db");
        std::fs::write(&path, b"one").unwrap();

        let store = InMemoryStore::new();
        let folder = store.ensure_folder("db", None).unwrap();
        let id = store.upload(&path, &folder).unwrap();
        let first = store.modified_time(&id).unwrap();

        std::fs::write(&path, b"two").unwrap();
        store.update_content(&id, &path).unwrap();
        let second = store.modified_time(&id).unwrap();

        assert!(second > first);
        assert_eq!(store.content(&id).unwrap(), b"two");
        assert_eq!(store.find_by_name("data.db", &folder).unwrap(), Some(id));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next(StoreOperation::EnsureFolder, 1);
        assert!(store.ensure_folder("x", None).unwrap_err().is_transient());
        assert!(store.ensure_folder("x", None).is_ok());
        assert_eq!(store.calls(StoreOperation::EnsureFolder), 2);
    }
}
