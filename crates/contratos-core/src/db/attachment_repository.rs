//! Attachment metadata repository
//!
//! One table per [`AttachmentKind`]; the remote files themselves are handled by
//! [`DocumentService`](crate::services::DocumentService).

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{trailing_sequence, Attachment, AttachmentKind, NewAttachment};
use crate::remote::ObjectId;
use crate::sync::Session;
use crate::util::{local_timestamp_text, normalize_text_option};

use super::require_row;

pub struct AttachmentRepository<'a> {
    session: &'a Session<'a>,
}

/// Table and key column of the entity owning attachments of `kind`.
const fn parent_table(kind: AttachmentKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        AttachmentKind::ServiceOrder => ("servicos", "cod_servico", "service order"),
        AttachmentKind::Contract => ("contratos", "numero_contrato", "contract"),
        AttachmentKind::Unit => ("unidades", "cod_unidade", "unit"),
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl<'a> AttachmentRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn select(kind: AttachmentKind) -> String {
        format!(
            "SELECT id, {}, nome_arquivo, tipo_arquivo, drive_file_id, data_upload, descricao
             FROM {}",
            kind.parent_column(),
            kind.table()
        )
    }

    fn parse_attachment(
        kind: AttachmentKind,
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<Attachment> {
        Ok(Attachment {
            id: row.get(0)?,
            kind,
            parent_key: row.get(1)?,
            file_name: row.get(2)?,
            mime_type: row.get(3)?,
            remote_id: ObjectId::new(row.get::<_, String>(4)?),
            uploaded_at: row.get(5)?,
            description: row.get(6)?,
        })
    }

    /// Attachments of one parent, most recent upload first.
    pub fn list(&self, kind: AttachmentKind, parent_key: &str) -> Result<Vec<Attachment>> {
        let mut stmt = self.session.connection().prepare(&format!(
            "{} WHERE {} = ?1 ORDER BY data_upload DESC, id DESC",
            Self::select(kind),
            kind.parent_column()
        ))?;
        let attachments = stmt
            .query_map(params![parent_key], |row| Self::parse_attachment(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attachments)
    }

    pub fn get(&self, kind: AttachmentKind, id: i64) -> Result<Option<Attachment>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("{} WHERE id = ?1", Self::select(kind)),
                params![id],
                |row| Self::parse_attachment(kind, row),
            )
            .optional()?)
    }

    /// Next per-day counter for names generated under `parent_key` on `date`.
    pub fn next_sequence(
        &self,
        kind: AttachmentKind,
        parent_key: &str,
        date: NaiveDate,
    ) -> Result<u32> {
        let pattern = format!(
            "{}%",
            escape_like(&format!("{parent_key}_{}_", date.format("%Y%m%d")))
        );
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT nome_arquivo FROM {} WHERE {} = ?1 AND nome_arquivo LIKE ?2 ESCAPE '\\'",
            kind.table(),
            kind.parent_column()
        ))?;
        let names = stmt
            .query_map(params![parent_key, pattern], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let last = names
            .iter()
            .filter_map(|name| trailing_sequence(name))
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }

    /// Record an uploaded file for an existing parent, stamped with the local time.
    pub fn insert(&self, attachment: &NewAttachment) -> Result<Attachment> {
        let conn = self.session.connection();
        let (table, column, what) = parent_table(attachment.kind);
        require_row(conn, table, column, &attachment.parent_key, what)?;

        let uploaded_at = local_timestamp_text();
        conn.execute(
            &format!(
                "INSERT INTO {}
                     ({}, nome_arquivo, tipo_arquivo, drive_file_id, data_upload, descricao)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                attachment.kind.table(),
                attachment.kind.parent_column()
            ),
            params![
                attachment.parent_key,
                attachment.file_name,
                attachment.mime_type,
                attachment.remote_id.as_str(),
                uploaded_at,
                attachment.description,
            ],
        )?;
        self.session.mark_dirty();

        Ok(Attachment {
            id: conn.last_insert_rowid(),
            kind: attachment.kind,
            parent_key: attachment.parent_key.clone(),
            file_name: attachment.file_name.clone(),
            mime_type: attachment.mime_type.clone(),
            remote_id: attachment.remote_id.clone(),
            uploaded_at,
            description: attachment.description.clone(),
        })
    }

    pub fn update_description(
        &self,
        kind: AttachmentKind,
        id: i64,
        description: Option<String>,
    ) -> Result<()> {
        let updated = self.session.connection().execute(
            &format!("UPDATE {} SET descricao = ?1 WHERE id = ?2", kind.table()),
            params![normalize_text_option(description), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("{kind} attachment {id}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete the metadata row, returning it so the remote file can follow.
    pub fn delete(&self, kind: AttachmentKind, id: i64) -> Result<Attachment> {
        let attachment = self
            .get(kind, id)?
            .ok_or_else(|| Error::NotFound(format!("{kind} attachment {id}")))?;

        self.session.connection().execute(
            &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
            params![id],
        )?;
        self.session.mark_dirty();
        Ok(attachment)
    }
}
