//! Contract repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::Contract;
use crate::sync::Session;

use super::{guard_dependents, require_row};

const COLUMNS: &str =
    "numero_contrato, cod_empresa, empresa_contratada, titulo, especificacoes, pasta_contrato";

pub struct ContractRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> ContractRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn parse_contract(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contract> {
        Ok(Contract {
            number: row.get(0)?,
            company_code: row.get(1)?,
            contracted_company: row.get(2)?,
            title: row.get(3)?,
            specifications: row.get(4)?,
            folder_id: row.get(5)?,
        })
    }

    fn query(&self, filter: &str, key: Option<&str>) -> Result<Vec<Contract>> {
        let conn = self.session.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM contratos {filter} ORDER BY numero_contrato"
        ))?;
        let rows = match key {
            Some(key) => stmt.query_map(params![key], Self::parse_contract)?,
            None => stmt.query_map([], Self::parse_contract)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a contract for an existing company.
    pub fn create(&self, contract: &Contract) -> Result<Contract> {
        let conn = self.session.connection();
        require_row(conn, "empresas", "cod_empresa", &contract.company_code, "company")?;

        conn.execute(
            "INSERT INTO contratos (numero_contrato, cod_empresa, empresa_contratada, titulo,
                                    especificacoes, pasta_contrato)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                contract.number,
                contract.company_code,
                contract.contracted_company,
                contract.title,
                contract.specifications,
                contract.folder_id,
            ],
        )
        .map_err(|error| {
            Error::duplicate_on_conflict(error, format!("contract {}", contract.number))
        })?;
        self.session.mark_dirty();

        Ok(contract.clone())
    }

    pub fn get(&self, number: &str) -> Result<Option<Contract>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM contratos WHERE numero_contrato = ?1"),
                params![number],
                Self::parse_contract,
            )
            .optional()?)
    }

    pub fn list(&self) -> Result<Vec<Contract>> {
        self.query("", None)
    }

    pub fn list_by_company(&self, company_code: &str) -> Result<Vec<Contract>> {
        self.query("WHERE cod_empresa = ?1", Some(company_code))
    }

    /// Update the descriptive fields. Number, company and folder stay as stored.
    pub fn update(&self, contract: &Contract) -> Result<Contract> {
        let updated = self.session.connection().execute(
            "UPDATE contratos SET empresa_contratada = ?1, titulo = ?2, especificacoes = ?3
             WHERE numero_contrato = ?4",
            params![
                contract.contracted_company,
                contract.title,
                contract.specifications,
                contract.number,
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("contract {}", contract.number)));
        }
        self.session.mark_dirty();

        self.get(&contract.number)?
            .ok_or_else(|| Error::NotFound(format!("contract {}", contract.number)))
    }

    pub fn set_folder(&self, number: &str, folder_id: &str) -> Result<()> {
        let updated = self.session.connection().execute(
            "UPDATE contratos SET pasta_contrato = ?1 WHERE numero_contrato = ?2",
            params![folder_id, number],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("contract {number}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete a contract with no units and no attachments.
    pub fn delete(&self, number: &str) -> Result<()> {
        let conn = self.session.connection();
        guard_dependents(
            conn,
            "contract",
            number,
            &[
                ("unidades", "numero_contrato", "unit(s)"),
                ("arquivos_contrato", "numero_contrato", "attachment(s)"),
            ],
        )?;

        let deleted = conn.execute(
            "DELETE FROM contratos WHERE numero_contrato = ?1",
            params![number],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("contract {number}")));
        }
        self.session.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDb;
    use crate::db::{CompanyRepository, UnitRepository};
    use crate::models::{NewCompany, Unit};
    use pretty_assertions::assert_eq;

    fn seed_company(session: &Session<'_>) {
        CompanyRepository::new(session)
            .create(&NewCompany::new("ACME", "1", "EMP01").unwrap())
            .unwrap();
    }

    #[test]
    fn test_create_requires_company() {
        let mut db = TestDb::new();
        let session = db.session();
        let repo = ContractRepository::new(&session);

        let error = repo
            .create(&Contract::new("CT-001", "EMP99").unwrap())
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_create_update_get() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_company(&session);
        let repo = ContractRepository::new(&session);

        let contract = Contract::new("CT-001", "EMP01")
            .unwrap()
            .with_title(Some("Limpeza".to_string()));
        repo.create(&contract).unwrap();

        let changed = contract
            .clone()
            .with_contracted_company(Some("Obras SA".to_string()));
        let updated = repo.update(&changed).unwrap();
        assert_eq!(updated, changed);
        assert_eq!(repo.list().unwrap(), vec![changed]);

        assert!(matches!(
            repo.create(&contract).unwrap_err(),
            Error::Duplicate(_)
        ));
    }

    #[test]
    fn test_delete_guarded_by_units() {
        let mut db = TestDb::new();
        let session = db.session();
        seed_company(&session);
        let repo = ContractRepository::new(&session);
        repo.create(&Contract::new("CT-001", "EMP01").unwrap())
            .unwrap();
        UnitRepository::new(&session)
            .create(&Unit::new("UN01", "CT-001", "Sede").unwrap())
            .unwrap();

        assert!(matches!(
            repo.delete("CT-001").unwrap_err(),
            Error::HasDependents { entity: "contract", .. }
        ));
        assert!(repo.get("CT-001").unwrap().is_some());
    }
}
