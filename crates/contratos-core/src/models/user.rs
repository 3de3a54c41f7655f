//! Application user model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{normalize_text_option, require_text};

/// Access level stored in `usuarios.tipo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[serde(rename = "ope")]
    Operator,
}

impl UserRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "ope",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "ope" | "operator" => Ok(Self::Operator),
            other => Err(Error::InvalidInput(format!(
                "unknown user role {other:?} (expected admin or ope)"
            ))),
        }
    }
}

/// A user allowed to log in. The stored password is never loaded into this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub birth_date: Option<String>,
    pub job_title: Option<String>,
    pub login: String,
    pub role: UserRole,
}

#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub birth_date: Option<String>,
    pub job_title: Option<String>,
    pub login: String,
    pub password: String,
    pub role: UserRole,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    pub fn new(name: &str, login: &str, password: &str, role: UserRole) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::InvalidInput("password cannot be empty".to_string()));
        }
        Ok(Self {
            name: require_text(name, "user name")?,
            birth_date: None,
            job_title: None,
            login: require_text(login, "login")?,
            password: password.to_string(),
            role,
        })
    }

    #[must_use]
    pub fn with_details(mut self, birth_date: Option<String>, job_title: Option<String>) -> Self {
        self.birth_date = normalize_text_option(birth_date);
        self.job_title = normalize_text_option(job_title);
        self
    }
}
