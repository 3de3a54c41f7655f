//! Attachment metadata model

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::ObjectId;
use crate::util::{normalize_text_option, require_text};

/// Entity an attachment belongs to. Each kind has its own metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    ServiceOrder,
    Contract,
    Unit,
}

impl AttachmentKind {
    pub const ALL: [Self; 3] = [Self::ServiceOrder, Self::Contract, Self::Unit];

    /// Metadata table for this kind.
    pub const fn table(self) -> &'static str {
        match self {
            Self::ServiceOrder => "arquivos_servico",
            Self::Contract => "arquivos_contrato",
            Self::Unit => "arquivos_unidade",
        }
    }

    /// Column holding the parent's key in [`Self::table`].
    pub const fn parent_column(self) -> &'static str {
        match self {
            Self::ServiceOrder => "cod_servico",
            Self::Contract => "numero_contrato",
            Self::Unit => "cod_unidade",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceOrder => "order",
            Self::Contract => "contract",
            Self::Unit => "unit",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "order" | "service_order" | "servico" => Ok(Self::ServiceOrder),
            "contract" | "contrato" => Ok(Self::Contract),
            "unit" | "unidade" => Ok(Self::Unit),
            other => Err(Error::InvalidInput(format!(
                "unknown attachment kind {other:?} (expected order, contract or unit)"
            ))),
        }
    }
}

/// Metadata of a file stored remotely for a parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub kind: AttachmentKind,
    pub parent_key: String,
    /// Generated file name as uploaded.
    pub file_name: String,
    pub mime_type: String,
    pub remote_id: ObjectId,
    /// Local wall-clock upload time, `YYYY-MM-DD HH:MM:SS`.
    pub uploaded_at: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub kind: AttachmentKind,
    pub parent_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub remote_id: ObjectId,
    pub description: Option<String>,
}

impl NewAttachment {
    pub fn new(
        kind: AttachmentKind,
        parent_key: &str,
        file_name: &str,
        mime_type: &str,
        remote_id: ObjectId,
    ) -> Result<Self> {
        if remote_id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput(
                "Attachment remote id cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            kind,
            parent_key: require_text(parent_key, "attachment parent")?,
            file_name: require_text(file_name, "attachment file name")?,
            mime_type: require_text(mime_type, "attachment mime type")?,
            remote_id,
            description: None,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = normalize_text_option(description);
        self
    }
}

/// Generated upload name `<parent>_<YYYYMMDD_HHMMSS>_<NNN>[.<ext>]`.
///
/// The extension is taken from `original_name`, lowercased.
pub fn attachment_file_name(
    parent_key: &str,
    uploaded_at: NaiveDateTime,
    sequence: u32,
    original_name: &str,
) -> String {
    let extension = original_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.trim().to_ascii_lowercase())
        .filter(|extension| !extension.is_empty());
    let stem = format!(
        "{parent_key}_{}_{sequence:03}",
        uploaded_at.format("%Y%m%d_%H%M%S")
    );
    match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 5)
            .unwrap()
    }

    #[test]
    fn file_name_keeps_lowercased_extension() {
        assert_eq!(
            attachment_file_name("OS_20240501_001", at(), 3, "Foto.JPG"),
            "OS_20240501_001_20240501_093005_003.jpg"
        );
        assert_eq!(
            attachment_file_name("CT-9", at(), 1, "README"),
            "CT-9_20240501_093005_001"
        );
    }

    #[test]
    fn kind_maps_to_table_and_column() {
        assert_eq!(AttachmentKind::Contract.table(), "arquivos_contrato");
        assert_eq!(AttachmentKind::Unit.parent_column(), "cod_unidade");
        assert_eq!("order".parse::<AttachmentKind>().unwrap(), AttachmentKind::ServiceOrder);
    }

    #[test]
    fn new_attachment_validation() {
        let remote = ObjectId::new("file-1");
        let unit = AttachmentKind::Unit;
        let pdf = "application/pdf";
        assert!(NewAttachment::new(unit, "UN1", "a.pdf", pdf, remote.clone()).is_ok());
        assert!(NewAttachment::new(unit, "", "a.pdf", pdf, remote.clone()).is_err());
        assert!(NewAttachment::new(unit, "UN1", "a.pdf", "", remote).is_err());
        assert!(NewAttachment::new(unit, "UN1", "a.pdf", "x", ObjectId::new(" ")).is_err());
    }
}
