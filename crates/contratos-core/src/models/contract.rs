//! Contract model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::{normalize_text_option, require_text};

/// A contract signed with a company (`contratos` row), keyed by its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub number: String,
    pub company_code: String,
    /// Contracted party as written on the contract.
    pub contracted_company: Option<String>,
    pub title: Option<String>,
    pub specifications: Option<String>,
    pub folder_id: Option<String>,
}

impl Contract {
    pub fn new(number: &str, company_code: &str) -> Result<Self> {
        Ok(Self {
            number: require_text(number, "contract number")?,
            company_code: require_text(company_code, "company code")?,
            contracted_company: None,
            title: None,
            specifications: None,
            folder_id: None,
        })
    }

    #[must_use]
    pub fn with_contracted_company(mut self, value: Option<String>) -> Self {
        self.contracted_company = normalize_text_option(value);
        self
    }

    #[must_use]
    pub fn with_title(mut self, value: Option<String>) -> Self {
        self.title = normalize_text_option(value);
        self
    }

    #[must_use]
    pub fn with_specifications(mut self, value: Option<String>) -> Self {
        self.specifications = normalize_text_option(value);
        self
    }

    /// Name of the contract's Drive folder: `<number>_<contracted company>`.
    pub fn folder_name(&self) -> String {
        match self.contracted_company.as_deref() {
            Some(contracted) => format!("{}_{contracted}", self.number),
            None => self.number.clone(),
        }
    }
}
