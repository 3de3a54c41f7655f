//! Unit model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::{normalize_text_option, require_text};

/// A site covered by a contract (`unidades` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub code: String,
    pub contract_number: String,
    pub name: String,
    pub state: Option<String>,
    pub city: Option<String>,
    /// Free-form location, usually `lat,lng`.
    pub location: Option<String>,
    pub folder_id: Option<String>,
}

impl Unit {
    pub fn new(code: &str, contract_number: &str, name: &str) -> Result<Self> {
        Ok(Self {
            code: require_text(code, "unit code")?,
            contract_number: require_text(contract_number, "contract number")?,
            name: require_text(name, "unit name")?,
            state: None,
            city: None,
            location: None,
            folder_id: None,
        })
    }

    #[must_use]
    pub fn with_address(
        mut self,
        state: Option<String>,
        city: Option<String>,
        location: Option<String>,
    ) -> Self {
        self.state = normalize_text_option(state);
        self.city = normalize_text_option(city);
        self.location = normalize_text_option(location);
        self
    }

    /// Name of the unit's Drive folder: `<name>_<code>`.
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.name, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_folder_name_and_address() {
        let unit = Unit::new("UN01", "CT-001", "Sede")
            .unwrap()
            .with_address(Some("SP".into()), Some(" ".into()), None);
        assert_eq!(unit.folder_name(), "Sede_UN01");
        assert_eq!(unit.state.as_deref(), Some("SP"));
        assert_eq!(unit.city, None);
    }
}
