//! Sync conflict model

use std::fmt;

use serde::{Deserialize, Serialize};

/// A push refused because the remote database moved past this context's mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Context that attempted the push
    pub context: String,
    /// Remote object that was found newer
    pub object_id: String,
    /// Last remote time this context observed (unix ms), if any
    pub local_mark: Option<i64>,
    /// Remote modification time found at push time (unix ms)
    pub remote_modified_at: i64,
    /// When the conflict was detected (unix ms)
    pub detected_at: i64,
}

impl fmt::Display for SyncConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.local_mark {
            Some(mark) => write!(
                f,
                "sync conflict in context {}: remote database {} was modified at {} \
                 after this context last saw it at {}",
                self.context, self.object_id, self.remote_modified_at, mark
            ),
            None => write!(
                f,
                "sync conflict in context {}: remote database {} (modified at {}) \
                 was never downloaded by this context",
                self.context, self.object_id, self.remote_modified_at
            ),
        }
    }
}
