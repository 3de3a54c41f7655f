//! Database layer for Contratos
//!
//! Repositories borrow a [`Session`](crate::sync::Session) and mark it dirty
//! after every successful write.

mod assignment_repository;
mod attachment_repository;
mod company_repository;
mod connection;
mod contract_repository;
mod employee_repository;
pub mod migrations;
mod service_order_repository;
mod unit_repository;
mod user_repository;

use rusqlite::{params, Connection};

use crate::error::{Error, Result};

pub use assignment_repository::AssignmentRepository;
pub use attachment_repository::AttachmentRepository;
pub use company_repository::CompanyRepository;
pub use connection::{configure, open, open_in_memory};
pub use contract_repository::ContractRepository;
pub use employee_repository::EmployeeRepository;
pub use migrations::MigrationReport;
pub use service_order_repository::ServiceOrderRepository;
pub use unit_repository::UnitRepository;
pub use user_repository::UserRepository;

/// Count rows of `table` whose `column` equals `key`.
fn count_where(conn: &Connection, table: &str, column: &str, key: &str) -> Result<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
        params![key],
        |row| row.get(0),
    )?)
}

/// Fail with `NotFound` unless a `table` row has `column = key`.
fn require_row(conn: &Connection, table: &str, column: &str, key: &str, what: &str) -> Result<()> {
    if count_where(conn, table, column, key)? == 0 {
        return Err(Error::NotFound(format!("{what} {key}")));
    }
    Ok(())
}

/// Refuse a delete while any of `references` (table, column, label) still point at `key`.
fn guard_dependents(
    conn: &Connection,
    entity: &'static str,
    key: &str,
    references: &[(&str, &str, &str)],
) -> Result<()> {
    let mut found = Vec::new();
    for (table, column, label) in references {
        let count = count_where(conn, table, column, key)?;
        if count > 0 {
            found.push(format!("{count} {label}"));
        }
    }
    if found.is_empty() {
        Ok(())
    } else {
        Err(Error::HasDependents {
            entity,
            key: key.to_string(),
            dependents: found.join(", "),
        })
    }
}
