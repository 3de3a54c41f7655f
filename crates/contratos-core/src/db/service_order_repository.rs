//! Service order repository implementation

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, ToSql};

use crate::error::{Error, Result};
use crate::models::{
    service_order_code, trailing_sequence, Attachment, AttachmentKind, ServiceOrder,
    ServiceOrderDetails, ServiceOrderStatus, SERVICE_ORDER_PREFIX,
};
use crate::sync::Session;

use super::{require_row, AttachmentRepository};

const COLUMNS: &str = "s.cod_servico, s.cod_unidade, s.tipo_servico, s.data_criacao, \
     s.data_execucao, s.status, s.observacoes, s.pasta_servico";

impl FromSql for ServiceOrderStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for ServiceOrderStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

pub struct ServiceOrderRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> ServiceOrderRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn parse_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceOrder> {
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
    }

    /// Next free `OS_<YYYYMMDD>_<NNN>` code for `date`.
    pub fn next_code(&self, date: NaiveDate) -> Result<String> {
        let day_prefix = format!("{SERVICE_ORDER_PREFIX}_{}_", date.format("%Y%m%d"));
        let last: Option<String> = self
            .session
            .connection()
            .query_row(
                "SELECT cod_servico FROM servicos WHERE cod_servico LIKE ?1
                 ORDER BY length(cod_servico) DESC, cod_servico DESC LIMIT 1",
                params![format!("{day_prefix}%")],
                |row| row.get(0),
            )
            .optional()?;

        let sequence = last.as_deref().and_then(trailing_sequence).unwrap_or(0) + 1;
        Ok(service_order_code(date, sequence))
    }

    /// Insert an order for an existing unit. A missing creation date becomes today.
    pub fn create(&self, order: &ServiceOrder) -> Result<ServiceOrder> {
        let conn = self.session.connection();
        require_row(conn, "unidades", "cod_unidade", &order.unit_code, "unit")?;

        let mut order = order.clone();
        if order.created_on.is_none() {
            order.created_on = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
        }

        conn.execute(
            "INSERT INTO servicos (cod_servico, cod_unidade, tipo_servico, data_criacao,
                                   data_execucao, status, observacoes, pasta_servico)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order.code,
                order.unit_code,
                order.service_type,
                order.created_on,
                order.execution_date,
                order.status,
                order.notes,
                order.folder_id,
            ],
        )
        .map_err(|error| {
            Error::duplicate_on_conflict(error, format!("service order {}", order.code))
        })?;
        self.session.mark_dirty();

        Ok(order)
    }

    pub fn get(&self, code: &str) -> Result<Option<ServiceOrder>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM servicos s WHERE s.cod_servico = ?1"),
                params![code],
                Self::parse_order,
            )
            .optional()?)
    }

    /// The order with the names of its unit, contract and company.
    pub fn details(&self, code: &str) -> Result<Option<ServiceOrderDetails>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!(
                    "SELECT {COLUMNS}, u.nome_unidade, c.numero_contrato, e.nome
                     FROM servicos s
                     JOIN unidades u ON s.cod_unidade = u.cod_unidade
                     JOIN contratos c ON u.numero_contrato = c.numero_contrato
                     JOIN empresas e ON c.cod_empresa = e.cod_empresa
                     WHERE s.cod_servico = ?1"
                ),
                params![code],
                |row| {
                    Ok(ServiceOrderDetails {
                        order: Self::parse_order(row)?,
                        unit_name: row.get(8)?,
                        contract_number: row.get(9)?,
                        company_name: row.get(10)?,
                    })
                },
            )
            .optional()?)
    }

    /// All orders, newest first.
    pub fn list(&self) -> Result<Vec<ServiceOrder>> {
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT {COLUMNS} FROM servicos s ORDER BY s.data_criacao DESC, s.cod_servico DESC"
        ))?;
        let orders = stmt
            .query_map([], Self::parse_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn list_by_unit(&self, unit_code: &str) -> Result<Vec<ServiceOrder>> {
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT {COLUMNS} FROM servicos s WHERE s.cod_unidade = ?1
             ORDER BY s.data_criacao DESC, s.cod_servico DESC"
        ))?;
        let orders = stmt
            .query_map(params![unit_code], Self::parse_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    /// Update type, execution date, status and notes.
    pub fn update(&self, order: &ServiceOrder) -> Result<ServiceOrder> {
        let updated = self.session.connection().execute(
            "UPDATE servicos
             SET tipo_servico = ?1, data_execucao = ?2, status = ?3, observacoes = ?4
             WHERE cod_servico = ?5",
            params![
                order.service_type,
                order.execution_date,
                order.status,
                order.notes,
                order.code,
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("service order {}", order.code)));
        }
        self.session.mark_dirty();

        self.get(&order.code)?
            .ok_or_else(|| Error::NotFound(format!("service order {}", order.code)))
    }

    pub fn set_status(&self, code: &str, status: ServiceOrderStatus) -> Result<()> {
        let updated = self.session.connection().execute(
            "UPDATE servicos SET status = ?1 WHERE cod_servico = ?2",
            params![status, code],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("service order {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    pub fn set_folder(&self, code: &str, folder_id: &str) -> Result<()> {
        let updated = self.session.connection().execute(
            "UPDATE servicos SET pasta_servico = ?1 WHERE cod_servico = ?2",
            params![folder_id, code],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("service order {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete an order with its employee assignments and attachment rows.
    ///
    /// Returns the removed attachment rows so their remote files can be deleted.
    pub fn delete(&self, code: &str) -> Result<Vec<Attachment>> {
        let conn = self.session.connection();
        require_row(conn, "servicos", "cod_servico", code, "service order")?;

        let attachments =
            AttachmentRepository::new(self.session).list(AttachmentKind::ServiceOrder, code)?;
        conn.execute(
            "DELETE FROM servico_funcionarios WHERE cod_servico = ?1",
            params![code],
        )?;
        conn.execute(
            "DELETE FROM arquivos_servico WHERE cod_servico = ?1",
            params![code],
        )?;
        conn.execute("DELETE FROM servicos WHERE cod_servico = ?1", params![code])?;
        self.session.mark_dirty();

        Ok(attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDb;
    use crate::db::{CompanyRepository, ContractRepository, UnitRepository};
    use crate::models::{Contract, NewCompany, Unit};
    use pretty_assertions::assert_eq;

    fn seed_unit(session: &Session<'_>) {
        CompanyRepository::new(session)
            .create(&NewCompany::new("ACME", "1", "EMP01").unwrap())
            .unwrap();
        ContractRepository::new(session)
            .create(&Contract::new("CT-001", "EMP01").unwrap())
            .unwrap();
        UnitRepository::new(session)
            .create(&Unit::new("UN01", "CT-001", "Sede").unwrap())
            .unwrap();
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_next_code_counts_per_day() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_unit(&session);
        let repo = ServiceOrderRepository::new(&session);

        assert_eq!(repo.next_code(day()).unwrap(), "OS_20240501_001");
        for _ in 0..2 {
            let code = repo.next_code(day()).unwrap();
            repo.create(&ServiceOrder::new(&code, "UN01", ServiceOrderStatus::Active).unwrap())
                .unwrap();
        }
        assert_eq!(repo.next_code(day()).unwrap(), "OS_20240501_003");

        let other_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert_eq!(repo.next_code(other_day).unwrap(), "OS_20240502_001");
    }

    #[test]
    fn test_create_details_and_status() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_unit(&session);
        let repo = ServiceOrderRepository::new(&session);

        let order = ServiceOrder::new("OS_20240501_001", "UN01", ServiceOrderStatus::Active)
            .unwrap()
            .with_service_type(Some("Manutencao".to_string()))
            .with_dates(Some("2024-05-01".to_string()), None);
        repo.create(&order).unwrap();

        let details = repo.details("OS_20240501_001").unwrap().unwrap();
        assert_eq!(details.order, order);
        assert_eq!(details.unit_name, "Sede");
        assert_eq!(details.contract_number, "CT-001");
        assert_eq!(details.company_name, "ACME");

        repo.set_status("OS_20240501_001", ServiceOrderStatus::Closed)
            .unwrap();
        assert_eq!(
            repo.get("OS_20240501_001").unwrap().unwrap().status,
            Some(ServiceOrderStatus::Closed)
        );
    }

    #[test]
    fn test_list_newest_first() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_unit(&session);
        let repo = ServiceOrderRepository::new(&session);

        for (code, date) in [("OS_20240101_001", "2024-01-01"), ("OS_20240301_001", "2024-03-01")] {
            repo.create(
                &ServiceOrder::new(code, "UN01", ServiceOrderStatus::Active)
                    .unwrap()
                    .with_dates(Some(date.to_string()), None),
            )
            .unwrap();
        }

        let codes: Vec<_> = repo.list().unwrap().into_iter().map(|o| o.code).collect();
        assert_eq!(codes, vec!["OS_20240301_001", "OS_20240101_001"]);
        assert_eq!(repo.list_by_unit("UN01").unwrap().len(), 2);
    }

    #[test]
    fn test_create_requires_unit() {
        let mut db = TestDb::new();
        let session = db.session();
        let error = ServiceOrderRepository::new(&session)
            .create(&ServiceOrder::new("OS_1", "UN404", ServiceOrderStatus::Active).unwrap())
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }
}
