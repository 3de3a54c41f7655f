//! Folder-based document store for attachments.
//!
//! Folders mirror the business hierarchy under the companies root:
//! `<company>/<contract>_<contracted>/<unit>_<code>/<order>_<type>/Arquivos`.
//! Folder ids are stored on the owning rows once created.

use chrono::Local;

use crate::db::{
    AttachmentRepository, CompanyRepository, ContractRepository, ServiceOrderRepository,
    UnitRepository,
};
use crate::error::{Error, Result};
use crate::models::{attachment_file_name, Attachment, AttachmentKind, NewAttachment};
use crate::remote::{FolderId, ObjectId, RemoteError, RemoteStore};
use crate::sync::Session;

/// Sub-folder of a service order holding its attachments.
pub const ORDER_FILES_FOLDER: &str = "Arquivos";

/// File content handed to [`DocumentService::attach`].
#[derive(Debug, Clone)]
pub struct Upload<'b> {
    /// Name the file had on the user's side; only its extension is kept.
    pub original_name: &'b str,
    pub bytes: &'b [u8],
    /// Guessed from `original_name` when absent.
    pub mime_type: Option<&'b str>,
    pub description: Option<String>,
}

pub struct DocumentService<S> {
    store: S,
    companies_root: Option<FolderId>,
}

impl<S: RemoteStore> DocumentService<S> {
    pub const fn new(store: S, companies_root: Option<FolderId>) -> Self {
        Self {
            store,
            companies_root,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    fn companies_root(&self) -> Result<&FolderId> {
        self.companies_root.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "{} is not set; company folders cannot be created",
                crate::config::COMPANIES_FOLDER_VAR
            ))
        })
    }

    /// Folder of a company, created under the companies root on first use.
    pub fn provision_company_folder(&self, session: &Session<'_>, code: &str) -> Result<FolderId> {
        let repo = CompanyRepository::new(session);
        let company = repo
            .get_by_code(code)?
            .ok_or_else(|| Error::NotFound(format!("company {code}")))?;
        if let Some(folder_id) = company.folder_id {
            return Ok(FolderId::new(folder_id));
        }

        let folder = self
            .store
            .ensure_folder(&company.folder_name(), Some(self.companies_root()?))?;
        repo.set_folder(code, folder.as_str())?;
        tracing::info!("Provisioned folder for company {code}");
        Ok(folder)
    }

    /// Folder of a contract, inside its company's folder.
    pub fn provision_contract_folder(
        &self,
        session: &Session<'_>,
        number: &str,
    ) -> Result<FolderId> {
        let repo = ContractRepository::new(session);
        let contract = repo
            .get(number)?
            .ok_or_else(|| Error::NotFound(format!("contract {number}")))?;
        if let Some(folder_id) = contract.folder_id {
            return Ok(FolderId::new(folder_id));
        }

        let parent = self.provision_company_folder(session, &contract.company_code)?;
        let folder = self
            .store
            .ensure_folder(&contract.folder_name(), Some(&parent))?;
        repo.set_folder(number, folder.as_str())?;
        tracing::info!("Provisioned folder for contract {number}");
        Ok(folder)
    }

    /// Folder of a unit, inside its contract's folder.
    pub fn provision_unit_folder(&self, session: &Session<'_>, code: &str) -> Result<FolderId> {
        let repo = UnitRepository::new(session);
        let unit = repo
            .get(code)?
            .ok_or_else(|| Error::NotFound(format!("unit {code}")))?;
        if let Some(folder_id) = unit.folder_id {
            return Ok(FolderId::new(folder_id));
        }

        let parent = self.provision_contract_folder(session, &unit.contract_number)?;
        let folder = self.store.ensure_folder(&unit.folder_name(), Some(&parent))?;
        repo.set_folder(code, folder.as_str())?;
        tracing::info!("Provisioned folder for unit {code}");
        Ok(folder)
    }

    /// Folder of a service order, inside its unit's folder.
    pub fn provision_order_folder(&self, session: &Session<'_>, code: &str) -> Result<FolderId> {
        let repo = ServiceOrderRepository::new(session);
        let order = repo
            .get(code)?
            .ok_or_else(|| Error::NotFound(format!("service order {code}")))?;
        if let Some(folder_id) = order.folder_id {
            return Ok(FolderId::new(folder_id));
        }

        let parent = self.provision_unit_folder(session, &order.unit_code)?;
        let folder = self.store.ensure_folder(&order.folder_name(), Some(&parent))?;
        repo.set_folder(code, folder.as_str())?;
        tracing::info!("Provisioned folder for service order {code}");
        Ok(folder)
    }

    fn attachment_folder(
        &self,
        session: &Session<'_>,
        kind: AttachmentKind,
        parent_key: &str,
    ) -> Result<FolderId> {
        match kind {
            AttachmentKind::ServiceOrder => {
                let order_folder = self.provision_order_folder(session, parent_key)?;
                Ok(self
                    .store
                    .ensure_folder(ORDER_FILES_FOLDER, Some(&order_folder))?)
            }
            AttachmentKind::Contract => self.provision_contract_folder(session, parent_key),
            AttachmentKind::Unit => self.provision_unit_folder(session, parent_key),
        }
    }

    /// Upload a file for `parent_key` and record it.
    ///
    /// The stored name is generated; the remote file is deleted again if the
    /// metadata row cannot be written.
    pub fn attach(
        &self,
        session: &Session<'_>,
        kind: AttachmentKind,
        parent_key: &str,
        upload: Upload<'_>,
    ) -> Result<Attachment> {
        let folder = self.attachment_folder(session, kind, parent_key)?;

        let now = Local::now().naive_local();
        let sequence =
            AttachmentRepository::new(session).next_sequence(kind, parent_key, now.date())?;
        let file_name = attachment_file_name(parent_key, now, sequence, upload.original_name);
        let mime_type = upload.mime_type.map_or_else(
            || {
                mime_guess::from_path(upload.original_name)
                    .first_or_octet_stream()
                    .to_string()
            },
            str::to_string,
        );

        let remote_id = self
            .store
            .upload_bytes(upload.bytes, &file_name, &mime_type, &folder)?;
        tracing::info!(
            "Uploaded {file_name} ({} bytes) for {kind} {parent_key}",
            upload.bytes.len()
        );

        let recorded =
            NewAttachment::new(kind, parent_key, &file_name, &mime_type, remote_id.clone())
                .map(|attachment| attachment.with_description(upload.description))
                .and_then(|attachment| AttachmentRepository::new(session).insert(&attachment));
        if recorded.is_err() {
            self.delete_remote(&remote_id);
        }
        recorded
    }

    /// Metadata and content of an attachment.
    pub fn fetch(
        &self,
        session: &Session<'_>,
        kind: AttachmentKind,
        id: i64,
    ) -> Result<(Attachment, Vec<u8>)> {
        let attachment = AttachmentRepository::new(session)
            .get(kind, id)?
            .ok_or_else(|| Error::NotFound(format!("{kind} attachment {id}")))?;
        let bytes = self.store.download_bytes(&attachment.remote_id)?;
        Ok((attachment, bytes))
    }

    /// Delete the metadata row and retire its remote file.
    ///
    /// The file itself is deleted once the change reaches the remote database.
    pub fn remove(
        &self,
        session: &Session<'_>,
        kind: AttachmentKind,
        id: i64,
    ) -> Result<Attachment> {
        let attachment = AttachmentRepository::new(session).delete(kind, id)?;
        session.retire_remote(attachment.remote_id.clone());
        Ok(attachment)
    }

    /// Delete a service order with its rows and retire its remote files.
    pub fn remove_order(&self, session: &Session<'_>, code: &str) -> Result<usize> {
        let attachments = ServiceOrderRepository::new(session).delete(code)?;
        for attachment in &attachments {
            session.retire_remote(attachment.remote_id.clone());
        }
        Ok(attachments.len())
    }

    fn delete_remote(&self, id: &ObjectId) {
        match self.store.delete(id) {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(error) => tracing::warn!("Could not delete remote file {id}: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDb;
    use crate::models::{Contract, NewCompany, ServiceOrder, ServiceOrderStatus, Unit};
    use crate::remote::{InMemoryStore, StoreOperation};
    use crate::sync::{
        ConflictResolution, ConnectionRegistry, ContextKey, PushOutcome, SyncContext,
    };
    use pretty_assertions::assert_eq;

    fn seed(session: &Session<'_>) {
        CompanyRepository::new(session)
            .create(&NewCompany::new("ACME", "1", "EMP01").unwrap())
            .unwrap();
        ContractRepository::new(session)
            .create(
                &Contract::new("CT-001", "EMP01")
                    .unwrap()
                    .with_contracted_company(Some("Obras SA".to_string())),
            )
            .unwrap();
        UnitRepository::new(session)
            .create(&Unit::new("UN01", "CT-001", "Sede").unwrap())
            .unwrap();
        ServiceOrderRepository::new(session)
            .create(
                &ServiceOrder::new("OS_20240501_001", "UN01", ServiceOrderStatus::Active)
                    .unwrap()
                    .with_service_type(Some("Manutencao Preventiva".to_string())),
            )
            .unwrap();
    }

    fn service(store: &InMemoryStore) -> DocumentService<&InMemoryStore> {
        let root = store.ensure_folder("Empresas", None).unwrap();
        DocumentService::new(store, Some(root))
    }

    fn upload<'b>(name: &'b str, bytes: &'b [u8]) -> Upload<'b> {
        Upload {
            original_name: name,
            bytes,
            mime_type: None,
            description: None,
        }
    }

    #[test]
    fn test_order_folder_hierarchy() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        let folder = documents
            .provision_order_folder(&session, "OS_20240501_001")
            .unwrap();

        let root = documents.companies_root.clone().unwrap();
        let company = FolderId::from(&store.lookup("ACME", &root).unwrap());
        let contract = FolderId::from(&store.lookup("CT-001_Obras SA", &company).unwrap());
        let unit = FolderId::from(&store.lookup("Sede_UN01", &contract).unwrap());
        let order = FolderId::from(
            &store
                .lookup("OS_20240501_001_Manutencao_Preventiva", &unit)
                .unwrap(),
        );
        assert_eq!(folder, order);

        let stored = ServiceOrderRepository::new(&session)
            .get("OS_20240501_001")
            .unwrap()
            .unwrap()
            .folder_id;
        assert_eq!(stored.as_deref(), Some(order.as_str()));
    }

    #[test]
    fn test_provisioning_reuses_stored_folder() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        let first = documents.provision_unit_folder(&session, "UN01").unwrap();
        store.reset_calls();
        let second = documents.provision_unit_folder(&session, "UN01").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.calls(StoreOperation::EnsureFolder), 0);
    }

    #[test]
    fn test_attach_fetch_remove() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        let attachment = documents
            .attach(
                &session,
                AttachmentKind::ServiceOrder,
                "OS_20240501_001",
                upload("Foto.JPG", b"jpeg"),
            )
            .unwrap();
        assert!(attachment.file_name.starts_with("OS_20240501_001_"));
        assert!(attachment.file_name.ends_with("_001.jpg"));
        assert_eq!(attachment.mime_type, "image/jpeg");

        let order_folder = documents
            .provision_order_folder(&session, "OS_20240501_001")
            .unwrap();
        let files = store.lookup(ORDER_FILES_FOLDER, &order_folder).unwrap();
        assert_eq!(
            store.lookup(&attachment.file_name, &FolderId::from(&files)),
            Some(attachment.remote_id.clone())
        );

        let second = documents
            .attach(
                &session,
                AttachmentKind::ServiceOrder,
                "OS_20240501_001",
                upload("laudo.pdf", b"pdf"),
            )
            .unwrap();
        assert!(second.file_name.ends_with("_002.pdf"));

        let (fetched, bytes) = documents
            .fetch(&session, AttachmentKind::ServiceOrder, attachment.id)
            .unwrap();
        assert_eq!(fetched, attachment);
        assert_eq!(bytes, b"jpeg");

        documents
            .remove(&session, AttachmentKind::ServiceOrder, attachment.id)
            .unwrap();
        assert_eq!(store.content(&attachment.remote_id), Some(b"jpeg".to_vec()));
        assert_eq!(
            session.retired_remote_objects(),
            vec![attachment.remote_id.clone()]
        );
        assert_eq!(
            AttachmentRepository::new(&session)
                .list(AttachmentKind::ServiceOrder, "OS_20240501_001")
                .unwrap(),
            vec![second]
        );
    }

    #[test]
    fn test_remove_unknown_attachment_retires_nothing() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        let error = documents
            .remove(&session, AttachmentKind::Unit, 99)
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert!(session.retired_remote_objects().is_empty());
        assert_eq!(store.calls(StoreOperation::Delete), 0);
    }

    #[test]
    fn test_remove_order_retires_remote_files() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        let attachment = documents
            .attach(
                &session,
                AttachmentKind::ServiceOrder,
                "OS_20240501_001",
                upload("a.txt", b"a"),
            )
            .unwrap();

        assert_eq!(documents.remove_order(&session, "OS_20240501_001").unwrap(), 1);
        assert_eq!(store.content(&attachment.remote_id), Some(b"a".to_vec()));
        assert_eq!(session.retired_remote_objects(), vec![attachment.remote_id]);
        assert_eq!(
            ServiceOrderRepository::new(&session)
                .get("OS_20240501_001")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_company_folder_needs_root() {
        let store = InMemoryStore::new();
        let documents = DocumentService::new(&store, None);
        let mut db = TestDb::new();
        let session = db.session();
        seed(&session);

        assert!(matches!(
            documents.provision_company_folder(&session, "EMP01").unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_failed_upload_records_nothing() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let mut db = TestDb::new();
        {
            let session = db.session();
            seed(&session);
            documents.provision_contract_folder(&session, "CT-001").unwrap();
            store.fail_next(StoreOperation::UploadBytes, 1);

            let error = documents
                .attach(&session, AttachmentKind::Contract, "CT-001", upload("a.pdf", b"a"))
                .unwrap_err();
            assert!(error.is_retryable());
            assert!(AttachmentRepository::new(&session)
                .list(AttachmentKind::Contract, "CT-001")
                .unwrap()
                .is_empty());
        }
    }

    fn synced<'a>(
        store: &'a InMemoryStore,
        tmp: &tempfile::TempDir,
        key: &str,
    ) -> (ConnectionRegistry<&'a InMemoryStore>, SyncContext) {
        let registry =
            ConnectionRegistry::new(store, FolderId::new("database-folder"), "db.sqlite");
        let ctx = registry.context(ContextKey::new(key).unwrap(), tmp.path());
        (registry, ctx)
    }

    fn attach_to_seeded_order(
        registry: &ConnectionRegistry<&InMemoryStore>,
        ctx: &mut SyncContext,
        documents: &DocumentService<&InMemoryStore>,
    ) -> Attachment {
        registry
            .transaction(ctx, |session| {
                seed(session);
                documents.attach(
                    session,
                    AttachmentKind::ServiceOrder,
                    "OS_20240501_001",
                    upload("laudo.pdf", b"laudo"),
                )
            })
            .unwrap()
            .value
    }

    #[test]
    fn test_pushed_removal_deletes_remote_file() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let tmp = tempfile::TempDir::new().unwrap();
        let (registry, mut ctx) = synced(&store, &tmp, "a");
        let attachment = attach_to_seeded_order(&registry, &mut ctx, &documents);

        let scoped = registry
            .transaction(&mut ctx, |session| {
                documents.remove(session, AttachmentKind::ServiceOrder, attachment.id)
            })
            .unwrap();

        assert!(matches!(scoped.sync, PushOutcome::Pushed { .. }));
        assert_eq!(store.content(&attachment.remote_id), None);
        assert!(ctx.retired_objects().is_empty());
    }

    #[test]
    fn test_conflicting_removal_keeps_remote_file_for_take_remote() {
        let store = InMemoryStore::new();
        let documents = service(&store);
        let tmp_a = tempfile::TempDir::new().unwrap();
        let tmp_b = tempfile::TempDir::new().unwrap();
        let (registry, mut a) = synced(&store, &tmp_a, "a");
        let mut b = registry.context(ContextKey::new("b").unwrap(), tmp_b.path());
        let attachment = attach_to_seeded_order(&registry, &mut a, &documents);

        registry
            .transaction(&mut b, |session| {
                CompanyRepository::new(session).create(&NewCompany::new("Obras", "2", "EMP02")?)
            })
            .unwrap();

        let scoped = registry
            .transaction(&mut a, |session| documents.remove_order(session, "OS_20240501_001"))
            .unwrap();
        assert!(matches!(scoped.sync, PushOutcome::Conflict(_)));
        assert_eq!(store.content(&attachment.remote_id), Some(b"laudo".to_vec()));
        assert_eq!(a.retired_objects(), vec![attachment.remote_id.clone()]);

        registry.resync(&mut a, ConflictResolution::TakeRemote).unwrap();
        assert!(a.retired_objects().is_empty());

        let (fetched, bytes) = registry
            .transaction(&mut a, |session| {
                documents.fetch(session, AttachmentKind::ServiceOrder, attachment.id)
            })
            .unwrap()
            .value;
        assert_eq!(fetched, attachment);
        assert_eq!(bytes, b"laudo");
    }
}
