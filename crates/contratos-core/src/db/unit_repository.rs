//! Unit repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::Unit;
use crate::sync::Session;

use super::{guard_dependents, require_row};

const COLUMNS: &str =
    "cod_unidade, numero_contrato, nome_unidade, estado, cidade, localizacao, pasta_unidade";

pub struct UnitRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> UnitRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn parse_unit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Unit> {
        Ok(Unit {
            code: row.get(0)?,
            contract_number: row.get(1)?,
            name: row.get(2)?,
            state: row.get(3)?,
            city: row.get(4)?,
            location: row.get(5)?,
            folder_id: row.get(6)?,
        })
    }

    pub fn create(&self, unit: &Unit) -> Result<Unit> {
        let conn = self.session.connection();
        require_row(conn, "contratos", "numero_contrato", &unit.contract_number, "contract")?;

        conn.execute(
            "INSERT INTO unidades (cod_unidade, numero_contrato, nome_unidade, estado, cidade,
                                   localizacao, pasta_unidade)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                unit.code,
                unit.contract_number,
                unit.name,
                unit.state,
                unit.city,
                unit.location,
                unit.folder_id,
            ],
        )
        .map_err(|error| Error::duplicate_on_conflict(error, format!("unit {}", unit.code)))?;
        self.session.mark_dirty();

        Ok(unit.clone())
    }

    pub fn get(&self, code: &str) -> Result<Option<Unit>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM unidades WHERE cod_unidade = ?1"),
                params![code],
                Self::parse_unit,
            )
            .optional()?)
    }

    pub fn list(&self) -> Result<Vec<Unit>> {
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT {COLUMNS} FROM unidades ORDER BY nome_unidade, cod_unidade"
        ))?;
        let units = stmt
            .query_map([], Self::parse_unit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    pub fn list_by_contract(&self, contract_number: &str) -> Result<Vec<Unit>> {
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT {COLUMNS} FROM unidades WHERE numero_contrato = ?1
             ORDER BY nome_unidade, cod_unidade"
        ))?;
        let units = stmt
            .query_map(params![contract_number], Self::parse_unit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    /// Update name and address fields.
    pub fn update(&self, unit: &Unit) -> Result<Unit> {
        let updated = self.session.connection().execute(
            "UPDATE unidades SET nome_unidade = ?1, estado = ?2, cidade = ?3, localizacao = ?4
             WHERE cod_unidade = ?5",
            params![unit.name, unit.state, unit.city, unit.location, unit.code],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("unit {}", unit.code)));
        }
        self.session.mark_dirty();

        self.get(&unit.code)?
            .ok_or_else(|| Error::NotFound(format!("unit {}", unit.code)))
    }

    pub fn set_folder(&self, code: &str, folder_id: &str) -> Result<()> {
        let updated = self.session.connection().execute(
            "UPDATE unidades SET pasta_unidade = ?1 WHERE cod_unidade = ?2",
            params![folder_id, code],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("unit {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete a unit with no service orders and no attachments.
    pub fn delete(&self, code: &str) -> Result<()> {
        let conn = self.session.connection();
        guard_dependents(
            conn,
            "unit",
            code,
            &[
                ("servicos", "cod_unidade", "service order(s)"),
                ("arquivos_unidade", "cod_unidade", "attachment(s)"),
            ],
        )?;

        let deleted = conn.execute("DELETE FROM unidades WHERE cod_unidade = ?1", params![code])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("unit {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDb;
    use crate::db::{CompanyRepository, ContractRepository, ServiceOrderRepository};
    use crate::models::{Contract, NewCompany, ServiceOrder, ServiceOrderStatus};
    use pretty_assertions::assert_eq;

    fn seed_contract(session: &Session<'_>) {
        CompanyRepository::new(session)
            .create(&NewCompany::new("ACME", "1", "EMP01").unwrap())
            .unwrap();
        ContractRepository::new(session)
            .create(&Contract::new("CT-001", "EMP01").unwrap())
            .unwrap();
    }

    #[test]
    fn test_create_list_update() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_contract(&session);
        let repo = UnitRepository::new(&session);

        let unit = Unit::new("UN01", "CT-001", "Sede").unwrap().with_address(
            Some("SP".to_string()),
            Some("Campinas".to_string()),
            Some("-22.9,-47.06".to_string()),
        );
        repo.create(&unit).unwrap();
        assert_eq!(repo.list_by_contract("CT-001").unwrap(), vec![unit.clone()]);

        let mut renamed = unit.clone();
        renamed.name = "Sede Nova".to_string();
        assert_eq!(repo.update(&renamed).unwrap().name, "Sede Nova");
    }

    #[test]
    fn test_create_requires_contract() {
        let mut db = TestDb::new();
        let session = db.session();
        let error = UnitRepository::new(&session)
            .create(&Unit::new("UN01", "CT-404", "Sede").unwrap())
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_guarded_by_orders() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_contract(&session);
        let repo = UnitRepository::new(&session);
        repo.create(&Unit::new("UN01", "CT-001", "Sede").unwrap())
            .unwrap();
        ServiceOrderRepository::new(&session)
            .create(
                &ServiceOrder::new("OS_20240501_001", "UN01", ServiceOrderStatus::Active).unwrap(),
            )
            .unwrap();

        assert!(matches!(
            repo.delete("UN01").unwrap_err(),
            Error::HasDependents { entity: "unit", .. }
        ));
        assert!(repo.get("UN01").unwrap().is_some());
    }
}
