//! Opening and configuring `SQLite` handles on the local cache file

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::Result;

use super::migrations::{self, MigrationReport};

/// Open the cache file at `path` (which must already exist) and configure it.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure(&conn)?;
    tracing::debug!("Opened local database {}", path.display());
    Ok(conn)
}

/// Open an in-memory database with the full schema (useful for testing)
pub fn open_in_memory() -> Result<(Connection, MigrationReport)> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    let report = migrations::run(&conn)?;
    Ok((conn, report))
}

/// Apply per-connection settings.
///
/// The rollback journal keeps every committed page inside the one file that
/// gets uploaded; WAL would leave commits in a side file.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("delete") && !mode.eq_ignore_ascii_case("memory") {
        tracing::warn!("journal_mode is {mode}, expected delete");
    }
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(())
}
