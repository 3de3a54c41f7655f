//! Service order model

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{normalize_text_option, require_text};

/// Prefix shared by every generated service order code.
pub const SERVICE_ORDER_PREFIX: &str = "OS";

/// Lifecycle state stored in `servicos.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceOrderStatus {
    #[serde(rename = "Ativo")]
    Active,
    #[serde(rename = "Em andamento")]
    InProgress,
    #[serde(rename = "Pausada")]
    Paused,
    #[serde(rename = "Encerrado")]
    Closed,
}

impl ServiceOrderStatus {
    pub const ALL: [Self; 4] = [Self::Active, Self::InProgress, Self::Paused, Self::Closed];

    /// Value as stored in the database.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Ativo",
            Self::InProgress => "Em andamento",
            Self::Paused => "Pausada",
            Self::Closed => "Encerrado",
        }
    }
}

impl fmt::Display for ServiceOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceOrderStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown service order status {value:?} \
                     (expected one of: Ativo, Em andamento, Pausada, Encerrado)"
                ))
            })
    }
}

/// A work order executed at a unit (`servicos` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub code: String,
    pub unit_code: String,
    pub service_type: Option<String>,
    pub created_on: Option<String>,
    pub execution_date: Option<String>,
    pub status: Option<ServiceOrderStatus>,
    pub notes: Option<String>,
    pub folder_id: Option<String>,
}

impl ServiceOrder {
    pub fn new(code: &str, unit_code: &str, status: ServiceOrderStatus) -> Result<Self> {
        Ok(Self {
            code: require_text(code, "service order code")?,
            unit_code: require_text(unit_code, "unit code")?,
            service_type: None,
            created_on: None,
            execution_date: None,
            status: Some(status),
            notes: None,
            folder_id: None,
        })
    }

    #[must_use]
    pub fn with_service_type(mut self, value: Option<String>) -> Self {
        self.service_type = normalize_text_option(value);
        self
    }

    #[must_use]
    pub fn with_dates(
        mut self,
        created_on: Option<String>,
        execution_date: Option<String>,
    ) -> Self {
        self.created_on = normalize_text_option(created_on);
        self.execution_date = normalize_text_option(execution_date);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, value: Option<String>) -> Self {
        self.notes = normalize_text_option(value);
        self
    }

    /// Name of the order's Drive folder: `<code>_<type with underscores>`.
    pub fn folder_name(&self) -> String {
        match self.service_type.as_deref() {
            Some(kind) => format!("{}_{}", self.code, kind.replace(' ', "_")),
            None => self.code.clone(),
        }
    }
}

/// A service order joined with the names of its unit, contract and company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrderDetails {
    pub order: ServiceOrder,
    pub unit_name: String,
    pub contract_number: String,
    pub company_name: String,
}

/// Generated order code `OS_<YYYYMMDD>_<NNN>`.
pub fn service_order_code(date: NaiveDate, sequence: u32) -> String {
    format!(
        "{SERVICE_ORDER_PREFIX}_{}_{sequence:03}",
        date.format("%Y%m%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_stored_values() {
        for status in ServiceOrderStatus::ALL {
            assert_eq!(status.as_str().parse::<ServiceOrderStatus>().unwrap(), status);
        }
        assert_eq!(
            "em andamento".parse::<ServiceOrderStatus>().unwrap(),
            ServiceOrderStatus::InProgress
        );
        assert!("Cancelado".parse::<ServiceOrderStatus>().is_err());
    }

    #[test]
    fn code_is_zero_padded_per_day() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(service_order_code(date, 7), "OS_20240501_007");
        assert_eq!(service_order_code(date, 1234), "OS_20240501_1234");
    }

    #[test]
    fn folder_name_replaces_spaces_in_type() {
        let order = ServiceOrder::new("OS_20240501_001", "UN01", ServiceOrderStatus::Active)
            .unwrap()
            .with_service_type(Some("Manutencao preventiva".to_string()));
        assert_eq!(order.folder_name(), "OS_20240501_001_Manutencao_preventiva");
    }
}
