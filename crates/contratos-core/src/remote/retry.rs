//! Bounded retry with exponential backoff around every remote call.

use std::path::Path;
use std::time::Duration;

use super::{FolderId, ObjectId, RemoteEntry, RemoteError, RemoteResult, RemoteStore};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);

/// How many times a transient failure is retried and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping (tests).
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Fail on the first error.
    #[must_use]
    pub const fn none() -> Self {
        Self::immediate(1)
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after `failed_attempts` consecutive failures (1-based).
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let floor = millis / 2;
        Duration::from_millis(fastrand::u64(floor..=millis))
    }

    /// Run `operation` until it succeeds, fails non-transiently, or attempts run out.
    pub fn run<T>(
        &self,
        label: &str,
        mut operation: impl FnMut() -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Remote {label} attempt {attempt}/{max_attempts} failed: {error}; \
                         retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) if error.is_transient() => {
                    tracing::error!("Remote {label} failed after {max_attempts} attempts: {error}");
                    return Err(RemoteError::Transient(format!(
                        "{label} failed after {max_attempts} attempts: {error}"
                    )));
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Decorator applying a [`RetryPolicy`] to every call of the wrapped store.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Object a failed create may have left behind before its reply was lost.
    fn landed(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>> {
        let existing = self.inner.find_by_name(name, parent)?;
        if let Some(id) = &existing {
            tracing::warn!("Earlier upload of {name} reached the store as {id}; reusing it");
        }
        Ok(existing)
    }
}

impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    fn find_by_name(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>> {
        self.policy
            .run("find_by_name", || self.inner.find_by_name(name, parent))
    }

    fn download(&self, id: &ObjectId, destination: &Path) -> RemoteResult<()> {
        self.policy
            .run("download", || self.inner.download(id, destination))
    }

    fn upload(&self, local_path: &Path, parent: &FolderId) -> RemoteResult<ObjectId> {
        let name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        let mut retrying = false;
        self.policy.run("upload", || {
            if let (true, Some(name)) = (retrying, name.as_deref()) {
                if let Some(existing) = self.landed(name, parent)? {
                    self.inner.update_content(&existing, local_path)?;
                    return Ok(existing);
                }
            }
            retrying = true;
            self.inner.upload(local_path, parent)
        })
    }

    fn update_content(&self, id: &ObjectId, local_path: &Path) -> RemoteResult<()> {
        self.policy
            .run("update_content", || self.inner.update_content(id, local_path))
    }

    fn modified_time(&self, id: &ObjectId) -> RemoteResult<i64> {
        self.policy
            .run("modified_time", || self.inner.modified_time(id))
    }

    fn ensure_folder(&self, name: &str, parent: Option<&FolderId>) -> RemoteResult<FolderId> {
        self.policy
            .run("ensure_folder", || self.inner.ensure_folder(name, parent))
    }

    fn upload_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId> {
        let mut retrying = false;
        self.policy.run("upload_bytes", || {
            if retrying {
                if let Some(existing) = self.landed(name, parent)? {
                    return Ok(existing);
                }
            }
            retrying = true;
            self.inner.upload_bytes(bytes, name, mime_type, parent)
        })
    }

    fn download_bytes(&self, id: &ObjectId) -> RemoteResult<Vec<u8>> {
        self.policy
            .run("download_bytes", || self.inner.download_bytes(id))
    }

    fn delete(&self, id: &ObjectId) -> RemoteResult<()> {
        self.policy.run("delete", || self.inner.delete(id))
    }

    fn list_folder(&self, parent: &FolderId) -> RemoteResult<Vec<RemoteEntry>> {
        self.policy
            .run("list_folder", || self.inner.list_folder(parent))
    }
}
