//! Employee model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::{normalize_text_option, require_text};

/// A field employee that can be assigned to service orders (`funcionarios` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub birth_date: Option<String>,
    pub cpf: String,
    pub code: String,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub birth_date: Option<String>,
    pub cpf: String,
    pub code: String,
    pub job_title: Option<String>,
}

impl NewEmployee {
    pub fn new(name: &str, cpf: &str, code: &str) -> Result<Self> {
        Ok(Self {
            name: require_text(name, "employee name")?,
            birth_date: None,
            cpf: require_text(cpf, "cpf")?,
            code: require_text(code, "employee code")?,
            job_title: None,
        })
    }

    #[must_use]
    pub fn with_details(mut self, birth_date: Option<String>, job_title: Option<String>) -> Self {
        self.birth_date = normalize_text_option(birth_date);
        self.job_title = normalize_text_option(job_title);
        self
    }
}
