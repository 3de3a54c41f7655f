//! Company model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::require_text;

/// A client company (`empresas` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    /// Brazilian company registry number, unique.
    pub cnpj: String,
    /// Business key referenced by contracts, unique.
    pub code: String,
    /// Drive folder holding the company's documents.
    pub folder_id: Option<String>,
}

impl Company {
    /// Name of the company's Drive folder.
    pub fn folder_name(&self) -> String {
        self.name.clone()
    }
}

/// Validated input for a new company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub name: String,
    pub cnpj: String,
    pub code: String,
}

impl NewCompany {
    pub fn new(name: &str, cnpj: &str, code: &str) -> Result<Self> {
        Ok(Self {
            name: require_text(name, "company name")?,
            cnpj: require_text(cnpj, "cnpj")?,
            code: require_text(code, "company code")?,
        })
    }
}
