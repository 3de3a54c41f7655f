//! Employee assignments to service orders (`servico_funcionarios`)

use rusqlite::params;

use crate::error::{Error, Result};
use crate::models::{Employee, ServiceOrder};
use crate::sync::Session;

use super::{count_where, require_row, EmployeeRepository};

pub struct AssignmentRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> AssignmentRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn is_assigned(&self, order_code: &str, employee_code: &str) -> Result<bool> {
        let count: i64 = self.session.connection().query_row(
            "SELECT COUNT(*) FROM servico_funcionarios
             WHERE cod_servico = ?1 AND cod_funcionario = ?2",
            params![order_code, employee_code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn assign(&self, order_code: &str, employee_code: &str) -> Result<()> {
        let conn = self.session.connection();
        require_row(conn, "servicos", "cod_servico", order_code, "service order")?;
        require_row(conn, "funcionarios", "cod_funcionario", employee_code, "employee")?;
        if self.is_assigned(order_code, employee_code)? {
            return Err(Error::Duplicate(format!(
                "employee {employee_code} already assigned to {order_code}"
            )));
        }

        conn.execute(
            "INSERT INTO servico_funcionarios (cod_servico, cod_funcionario) VALUES (?1, ?2)",
            params![order_code, employee_code],
        )?;
        self.session.mark_dirty();
        Ok(())
    }

    pub fn unassign(&self, order_code: &str, employee_code: &str) -> Result<()> {
        let removed = self.session.connection().execute(
            "DELETE FROM servico_funcionarios WHERE cod_servico = ?1 AND cod_funcionario = ?2",
            params![order_code, employee_code],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "assignment of {employee_code} to {order_code}"
            )));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Employees assigned to an order, by name.
    pub fn employees_of(&self, order_code: &str) -> Result<Vec<Employee>> {
        let mut stmt = self.session.connection().prepare(
            "SELECT f.id, f.nome, f.data_nascimento, f.cpf, f.cod_funcionario, f.funcao
             FROM funcionarios f
             JOIN servico_funcionarios sf ON sf.cod_funcionario = f.cod_funcionario
             WHERE sf.cod_servico = ?1
             ORDER BY f.nome",
        )?;
        let employees = stmt
            .query_map(params![order_code], EmployeeRepository::parse_employee)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(employees)
    }

    /// Orders an employee is assigned to, newest first.
    pub fn orders_of(&self, employee_code: &str) -> Result<Vec<ServiceOrder>> {
        let mut stmt = self.session.connection().prepare(
            "SELECT s.cod_servico, s.cod_unidade, s.tipo_servico, s.data_criacao, s.data_execucao,
                    s.status, s.observacoes, s.pasta_servico
             FROM servicos s
             JOIN servico_funcionarios sf ON sf.cod_servico = s.cod_servico
             WHERE sf.cod_funcionario = ?1
             ORDER BY s.data_criacao DESC, s.cod_servico DESC",
        )?;
        let orders = stmt
            .query_map(params![employee_code], |row| {
                Ok(ServiceOrder {
                    code: row.get(0)?,
                    unit_code: row.get(1)?,
                    service_type: row.get(2)?,
                    created_on: row.get(3)?,
                    execution_date: row.get(4)?,
                    status: row.get(5)?,
                    notes: row.get(6)?,
                    folder_id: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    /// Number of orders an employee is assigned to.
    pub fn assignment_count(&self, employee_code: &str) -> Result<i64> {
        count_where(
            self.session.connection(),
            "servico_funcionarios",
            "cod_funcionario",
            employee_code,
        )
    }
}
