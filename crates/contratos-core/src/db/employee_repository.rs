//! Employee repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Employee, NewEmployee};
use crate::sync::Session;

use super::guard_dependents;

const COLUMNS: &str = "id, nome, data_nascimento, cpf, cod_funcionario, funcao";

pub struct EmployeeRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> EmployeeRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    pub(crate) fn parse_employee(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
        Ok(Employee {
            id: row.get(0)?,
            name: row.get(1)?,
            birth_date: row.get(2)?,
            cpf: row.get(3)?,
            code: row.get(4)?,
            job_title: row.get(5)?,
        })
    }

    pub fn create(&self, employee: &NewEmployee) -> Result<Employee> {
        self.session
            .connection()
            .execute(
                "INSERT INTO funcionarios (nome, data_nascimento, cpf, cod_funcionario, funcao)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    employee.name,
                    employee.birth_date,
                    employee.cpf,
                    employee.code,
                    employee.job_title,
                ],
            )
            .map_err(|error| {
                Error::duplicate_on_conflict(
                    error,
                    format!("employee with cpf {} or code {}", employee.cpf, employee.code),
                )
            })?;
        self.session.mark_dirty();

        Ok(Employee {
            id: self.session.connection().last_insert_rowid(),
            name: employee.name.clone(),
            birth_date: employee.birth_date.clone(),
            cpf: employee.cpf.clone(),
            code: employee.code.clone(),
            job_title: employee.job_title.clone(),
        })
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<Employee>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM funcionarios WHERE cod_funcionario = ?1"),
                params![code],
                Self::parse_employee,
            )
            .optional()?)
    }

    pub fn list(&self) -> Result<Vec<Employee>> {
        let mut stmt = self
            .session
            .connection()
            .prepare(&format!("SELECT {COLUMNS} FROM funcionarios ORDER BY nome, id"))?;
        let employees = stmt
            .query_map([], Self::parse_employee)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(employees)
    }

    /// Update everything except the code, which assignments reference.
    pub fn update(&self, code: &str, changes: &NewEmployee) -> Result<Employee> {
        let updated = self
            .session
            .connection()
            .execute(
                "UPDATE funcionarios SET nome = ?1, data_nascimento = ?2, cpf = ?3, funcao = ?4
                 WHERE cod_funcionario = ?5",
                params![
                    changes.name,
                    changes.birth_date,
                    changes.cpf,
                    changes.job_title,
                    code,
                ],
            )
            .map_err(|error| {
                Error::duplicate_on_conflict(error, format!("employee with cpf {}", changes.cpf))
            })?;
        if updated == 0 {
            return Err(Error::NotFound(format!("employee {code}")));
        }
        self.session.mark_dirty();

        self.get_by_code(code)?
            .ok_or_else(|| Error::NotFound(format!("employee {code}")))
    }

    /// Delete an employee not assigned to any service order.
    pub fn delete(&self, code: &str) -> Result<()> {
        let conn = self.session.connection();
        guard_dependents(
            conn,
            "employee",
            code,
            &[("servico_funcionarios", "cod_funcionario", "service order assignment(s)")],
        )?;

        let deleted = conn.execute(
            "DELETE FROM funcionarios WHERE cod_funcionario = ?1",
            params![code],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("employee {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }
}
