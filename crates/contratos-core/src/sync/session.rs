use rusqlite::{Connection, Transaction};

use crate::error::Result;
use crate::remote::ObjectId;

use super::{DirtyFlag, PushOutcome, RetiredObjects};

/// What the body of a scoped transaction works with.
///
/// Statements run inside one `SQLite` transaction. Mutating calls must call
/// [`Session::mark_dirty`] after they succeed so the commit gets pushed.
/// Remote objects whose rows go away are handed to [`Session::retire_remote`]
/// instead of being deleted on the spot.
pub struct Session<'a> {
    tx: Transaction<'a>,
    dirty: &'a DirtyFlag,
    retired: &'a RetiredObjects,
}

impl<'a> Session<'a> {
    /// Start a transaction on `conn`, reporting writes to `dirty` and
    /// orphaned remote objects to `retired`.
    pub fn begin(
        conn: &'a mut Connection,
        dirty: &'a DirtyFlag,
        retired: &'a RetiredObjects,
    ) -> Result<Self> {
        Ok(Self {
            tx: conn.transaction()?,
            dirty,
            retired,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn mark_dirty(&self) {
        self.dirty.mark();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Delete `id` from the remote store once this change has been pushed.
    ///
    /// Dropped again when the scope fails or the context takes the remote copy.
    pub fn retire_remote(&self, id: ObjectId) {
        self.retired.retire(id);
    }

    pub fn retired_remote_objects(&self) -> Vec<ObjectId> {
        self.retired.ids()
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

/// Value returned by a scoped transaction body plus what happened to the push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scoped<T> {
    pub value: T,
    pub sync: PushOutcome,
}

impl<T> Scoped<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scoped<U> {
        Scoped {
            value: f(self.value),
            sync: self.sync,
        }
    }
}
