//! Services built on top of the repositories and the remote store.

mod documents;

pub use documents::{DocumentService, Upload, ORDER_FILES_FOLDER};
