//! Company repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Company, NewCompany};
use crate::sync::Session;

use super::guard_dependents;

const COLUMNS: &str = "id, nome, cnpj, cod_empresa, pasta_empresa";

pub struct CompanyRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> CompanyRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn parse_company(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            cnpj: row.get(2)?,
            code: row.get(3)?,
            folder_id: row.get(4)?,
        })
    }

    pub fn create(&self, company: &NewCompany) -> Result<Company> {
        self.session
            .connection()
            .execute(
                "INSERT INTO empresas (nome, cnpj, cod_empresa) VALUES (?1, ?2, ?3)",
                params![company.name, company.cnpj, company.code],
            )
            .map_err(|error| {
                Error::duplicate_on_conflict(
                    error,
                    format!("company with cnpj {} or code {}", company.cnpj, company.code),
                )
            })?;
        self.session.mark_dirty();

        Ok(Company {
            id: self.session.connection().last_insert_rowid(),
            name: company.name.clone(),
            cnpj: company.cnpj.clone(),
            code: company.code.clone(),
            folder_id: None,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<Company>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM empresas WHERE id = ?1"),
                params![id],
                Self::parse_company,
            )
            .optional()?)
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<Company>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM empresas WHERE cod_empresa = ?1"),
                params![code],
                Self::parse_company,
            )
            .optional()?)
    }

    /// All companies by name.
    pub fn list(&self) -> Result<Vec<Company>> {
        let mut stmt = self
            .session
            .connection()
            .prepare(&format!("SELECT {COLUMNS} FROM empresas ORDER BY nome, id"))?;
        let companies = stmt
            .query_map([], Self::parse_company)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(companies)
    }

    /// Update name and cnpj. The code is the key contracts point at and stays fixed.
    pub fn update(&self, code: &str, name: &str, cnpj: &str) -> Result<Company> {
        let changes = NewCompany::new(name, cnpj, code)?;
        let updated = self
            .session
            .connection()
            .execute(
                "UPDATE empresas SET nome = ?1, cnpj = ?2 WHERE cod_empresa = ?3",
                params![changes.name, changes.cnpj, code],
            )
            .map_err(|error| {
                Error::duplicate_on_conflict(error, format!("company with cnpj {}", changes.cnpj))
            })?;
        if updated == 0 {
            return Err(Error::NotFound(format!("company {code}")));
        }
        self.session.mark_dirty();

        self.get_by_code(code)?
            .ok_or_else(|| Error::NotFound(format!("company {code}")))
    }

    /// Record the company's document folder.
    pub fn set_folder(&self, code: &str, folder_id: &str) -> Result<()> {
        let updated = self.session.connection().execute(
            "UPDATE empresas SET pasta_empresa = ?1 WHERE cod_empresa = ?2",
            params![folder_id, code],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("company {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete a company that no contract references.
    pub fn delete(&self, code: &str) -> Result<()> {
        let conn = self.session.connection();
        guard_dependents(conn, "company", code, &[("contratos", "cod_empresa", "contract(s)")])?;

        let deleted = conn.execute("DELETE FROM empresas WHERE cod_empresa = ?1", params![code])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("company {code}")));
        }
        self.session.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDb;
    use crate::db::ContractRepository;
    use crate::models::Contract;
    use pretty_assertions::assert_eq;

    fn acme() -> NewCompany {
        NewCompany::new("ACME", "12.345.678/0001-90", "EMP01").unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let mut db = TestDb::new();
        let session = db.session();
        let repo = CompanyRepository::new(&session);

        let created = repo.create(&acme()).unwrap();
        assert_eq!(repo.get(created.id).unwrap(), Some(created.clone()));
        assert_eq!(repo.get_by_code("EMP01").unwrap(), Some(created));
        assert!(session.is_dirty());
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut db = TestDb::new();
        let session = db.session();
        let repo = CompanyRepository::new(&session);

        repo.create(&acme()).unwrap();
        let error = repo
            .create(&NewCompany::new("Other", "99", "EMP01").unwrap())
            .unwrap_err();
        assert!(matches!(error, Error::Duplicate(_)));
        assert_eq!(error.kind(), crate::ErrorKind::Integrity);
    }

    #[test]
    fn test_update_and_folder() {
        let mut db = TestDb::new();
        let session = db.session();
        let repo = CompanyRepository::new(&session);

        repo.create(&acme()).unwrap();
        let updated = repo.update("EMP01", "ACME Ltda", "11").unwrap();
        assert_eq!(updated.name, "ACME Ltda");

        repo.set_folder("EMP01", "folder-9").unwrap();
        assert_eq!(
            repo.get_by_code("EMP01").unwrap().unwrap().folder_id.as_deref(),
            Some("folder-9")
        );
        assert!(matches!(
            repo.update("NOPE", "x", "y").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_reads_do_not_mark_dirty() {
        let mut db = TestDb::new();
        {
            let session = db.session();
            let repo = CompanyRepository::new(&session);
            repo.list().unwrap();
            repo.get_by_code("EMP01").unwrap();
        }
        assert!(!db.is_dirty());
    }

    #[test]
    fn test_delete_with_contract_is_rejected_without_partial_delete() {
        let mut db = TestDb::new();
        let session = db.session();
        let companies = CompanyRepository::new(&session);
        let contracts = ContractRepository::new(&session);

        companies.create(&acme()).unwrap();
        contracts
            .create(&Contract::new("CT-001", "EMP01").unwrap())
            .unwrap();

        let error = companies.delete("EMP01").unwrap_err();
        assert!(matches!(
            error,
            Error::HasDependents { entity: "company", ref dependents, .. }
                if dependents == "1 contract(s)"
        ));
        assert!(companies.get_by_code("EMP01").unwrap().is_some());
        assert_eq!(contracts.list_by_company("EMP01").unwrap().len(), 1);

        contracts.delete("CT-001").unwrap();
        companies.delete("EMP01").unwrap();
        assert!(companies.list().unwrap().is_empty());
    }
}
