//! contratos-core - Core library for Contratos
//!
//! Keeps a single `SQLite` file as the system of record, mirrored to a Google
//! Drive folder, plus the business schema (companies, contracts, units,
//! service orders, employees, users, attachments) layered on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use config::AppConfig;
pub use error::{Error, ErrorKind, Result};
pub use models::SyncConflict;
pub use sync::{ConnectionRegistry, PushOutcome, Scoped, Session, SyncContext};
