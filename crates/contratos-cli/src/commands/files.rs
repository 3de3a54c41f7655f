use std::path::{Path, PathBuf};

use contratos_core::db::AttachmentRepository;
use contratos_core::models::{Attachment, AttachmentKind};
use contratos_core::remote::RemoteStore;
use contratos_core::services::Upload;

use crate::commands::common::{or_dash, print_json, Runtime};
use crate::error::CliError;

pub fn run_attach<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    kind: AttachmentKind,
    parent: &str,
    path: &Path,
    description: Option<String>,
    mime: Option<&str>,
) -> Result<Attachment, CliError> {
    let bytes = std::fs::read(path)?;
    let original_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let attachment = runtime.scoped(|session, documents| {
        documents.attach(
            session,
            kind,
            parent,
            Upload {
                original_name: &original_name,
                bytes: &bytes,
                mime_type: mime,
                description,
            },
        )
    })?;
    println!("{}  {}", attachment.id, attachment.file_name);
    Ok(attachment)
}

pub fn run_list_files<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    kind: AttachmentKind,
    parent: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let attachments =
        runtime.scoped(|session, _| AttachmentRepository::new(session).list(kind, parent))?;

    if as_json {
        return print_json(&attachments);
    }
    if attachments.is_empty() {
        println!("No files for {kind} {parent}.");
        return Ok(());
    }
    for line in format_attachment_lines(&attachments) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_fetch_file<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    kind: AttachmentKind,
    parent: &str,
    id: i64,
    output: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    let (attachment, bytes) =
        runtime.scoped(|session, documents| documents.fetch(session, kind, id))?;
    ensure_parent(&attachment, parent)?;

    let destination = output.unwrap_or_else(|| PathBuf::from(&attachment.file_name));
    std::fs::write(&destination, bytes)?;
    println!("{}", destination.display());
    Ok(destination)
}

pub fn run_remove_file<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    kind: AttachmentKind,
    parent: &str,
    id: i64,
) -> Result<(), CliError> {
    let removed = runtime.scoped(|session, documents| {
        let attachment = AttachmentRepository::new(session)
            .get(kind, id)?
            .ok_or_else(|| contratos_core::Error::NotFound(format!("{kind} attachment {id}")))?;
        if attachment.parent_key != parent {
            return Ok(Err(attachment));
        }
        documents.remove(session, kind, id).map(Ok)
    })?;

    match removed {
        Ok(attachment) => {
            println!("{}", attachment.file_name);
            Ok(())
        }
        Err(attachment) => ensure_parent(&attachment, parent),
    }
}

fn ensure_parent(attachment: &Attachment, parent: &str) -> Result<(), CliError> {
    if attachment.parent_key == parent {
        Ok(())
    } else {
        Err(CliError::ForeignAttachment {
            kind: attachment.kind.to_string(),
            id: attachment.id,
            parent: parent.to_string(),
        })
    }
}

pub fn format_attachment_lines(attachments: &[Attachment]) -> Vec<String> {
    attachments
        .iter()
        .map(|attachment| {
            format!(
                "{:>4}  {}  {}  {}  {}",
                attachment.id,
                attachment.uploaded_at,
                attachment.file_name,
                attachment.mime_type,
                or_dash(attachment.description.as_deref())
            )
        })
        .collect()
}
