use std::collections::HashMap;

use clap::CommandFactory;
use contratos_core::config::{
    parse_config, CACHE_DIR_VAR, COMPANIES_FOLDER_VAR, CREDENTIALS_JSON_VAR, DATABASE_FOLDER_VAR,
};
use contratos_core::db::CompanyRepository;
use contratos_core::models::{
    Attachment, AttachmentKind, Company, ServiceOrder, ServiceOrderStatus, User, UserRole,
};
use contratos_core::remote::{InMemoryStore, ObjectId, RemoteStore};
use contratos_core::{AppConfig, PushOutcome, SyncConflict};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::cli::{Cli, CompanyCommands, CompletionShell};
use crate::commands::common::{format_mark, or_dash, sync_message, Runtime};
use crate::commands::completions::render_completions;
use crate::commands::files::{format_attachment_lines, run_attach, run_fetch_file, run_remove_file};
use crate::commands::hierarchy::{format_company_lines, run_company};
use crate::commands::order::format_order_lines;
use crate::commands::people::{format_user_lines, run_login};
use crate::error::CliError;

fn test_config(tmp: &TempDir, companies_root: Option<&str>) -> AppConfig {
    let mut values: HashMap<&str, String> = HashMap::from([
        (DATABASE_FOLDER_VAR, "database-folder".to_string()),
        (CREDENTIALS_JSON_VAR, "{}".to_string()),
        (CACHE_DIR_VAR, tmp.path().display().to_string()),
    ]);
    if let Some(root) = companies_root {
        values.insert(COMPANIES_FOLDER_VAR, root.to_string());
    }
    parse_config(|name| values.get(name).cloned()).unwrap()
}

fn open_runtime<'s>(store: &'s InMemoryStore, config: &AppConfig) -> Runtime<&'s InMemoryStore> {
    Runtime::new(store, config, "cli-test").unwrap()
}

fn company_codes(runtime: &mut Runtime<&InMemoryStore>) -> Vec<String> {
    runtime
        .scoped(|session, _| CompanyRepository::new(session).list())
        .unwrap()
        .into_iter()
        .map(|company| company.code)
        .collect()
}

fn add_company(runtime: &mut Runtime<&InMemoryStore>, code: &str, folder: bool) {
    run_company(
        runtime,
        CompanyCommands::Add {
            code: code.to_string(),
            name: format!("Company {code}"),
            cnpj: format!("cnpj-{code}"),
            folder,
        },
    )
    .unwrap();
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn clean_push_is_silent() {
    assert_eq!(sync_message(&PushOutcome::Clean), None);
    assert_eq!(
        sync_message(&PushOutcome::Pushed { modified_at: 1 }).as_deref(),
        Some("Pushed to Google Drive.")
    );
}

#[test]
fn deferred_push_mentions_the_reason() {
    let message = sync_message(&PushOutcome::Deferred {
        reason: "timeout".to_string(),
    })
    .unwrap();
    assert!(message.contains("Saved locally"));
    assert!(message.contains("timeout"));
}

#[test]
fn conflict_message_points_to_resync() {
    let message = sync_message(&PushOutcome::Conflict(SyncConflict {
        context: "cli".to_string(),
        object_id: "db-1".to_string(),
        local_mark: Some(1_000),
        remote_modified_at: 2_000,
        detected_at: 3_000,
    }))
    .unwrap();
    assert!(message.contains("--take-remote"));
    assert!(message.contains("--keep-local"));
    assert!(message.contains("db-1"));
}

#[test]
fn or_dash_fills_missing_columns() {
    assert_eq!(or_dash(None), "-");
    assert_eq!(or_dash(Some("Pintura")), "Pintura");
}

#[test]
fn missing_mark_reads_never() {
    assert_eq!(format_mark(None), "never");
    assert_ne!(format_mark(Some(1_700_000_000_000)), "never");
}

#[test]
fn company_lines_flag_provisioned_folders() {
    let companies = vec![
        Company {
            id: 1,
            name: "ACME".to_string(),
            cnpj: "00.000.000/0001-00".to_string(),
            code: "AC".to_string(),
            folder_id: Some("folder-1".to_string()),
        },
        Company {
            id: 2,
            name: "Obras SA".to_string(),
            cnpj: "11.111.111/0001-11".to_string(),
            code: "OB".to_string(),
            folder_id: None,
        },
    ];
    assert_eq!(
        format_company_lines(&companies),
        vec![
            "AC  ACME  00.000.000/0001-00  [folder]".to_string(),
            "OB  Obras SA  11.111.111/0001-11".to_string(),
        ]
    );
}

#[test]
fn order_lines_show_status_label() {
    let order = ServiceOrder::new("OS_20240501_001", "UN01", ServiceOrderStatus::InProgress)
        .unwrap()
        .with_dates(Some("2024-05-01".to_string()), None);
    assert_eq!(
        format_order_lines(&[order]),
        vec!["OS_20240501_001  UN01  2024-05-01  Em andamento  -".to_string()]
    );
}

#[test]
fn user_lines_show_role() {
    let user = User {
        id: 1,
        name: "Administrador".to_string(),
        birth_date: None,
        job_title: None,
        login: "admin".to_string(),
        role: UserRole::Admin,
    };
    let lines = format_user_lines(&[user]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("admin  Administrador  "));
    assert!(lines[0].ends_with("  -"));
}

#[test]
fn attachment_lines_include_description() {
    let attachment = Attachment {
        id: 7,
        kind: AttachmentKind::ServiceOrder,
        parent_key: "OS_20240501_001".to_string(),
        file_name: "OS_20240501_001_20240501_001.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        remote_id: ObjectId::new("remote-7"),
        uploaded_at: "2024-05-01 10:00:00".to_string(),
        description: Some("laudo".to_string()),
    };
    assert_eq!(
        format_attachment_lines(&[attachment]),
        vec![
            "   7  2024-05-01 10:00:00  OS_20240501_001_20240501_001.pdf  application/pdf  laudo"
                .to_string()
        ]
    );
}

#[test]
fn completions_use_binary_name() {
    for shell in [
        CompletionShell::Bash,
        CompletionShell::Zsh,
        CompletionShell::Fish,
        CompletionShell::PowerShell,
    ] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("contratos"), "{shell:?}");
    }
}

#[test]
fn company_commands_round_trip_through_remote() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = test_config(&tmp, None);
    let mut runtime = open_runtime(&store, &config);

    add_company(&mut runtime, "AC", false);
    add_company(&mut runtime, "OB", false);
    assert_eq!(company_codes(&mut runtime), vec!["AC", "OB"]);
    assert!(!runtime.context.is_dirty());

    run_company(
        &mut runtime,
        CompanyCommands::Remove {
            code: "AC".to_string(),
        },
    )
    .unwrap();

    let tmp_other = TempDir::new().unwrap();
    let mut other = open_runtime(&store, &test_config(&tmp_other, None));
    assert_eq!(company_codes(&mut other), vec!["OB"]);
}

#[test]
fn duplicate_company_is_reported() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = test_config(&tmp, None);
    let mut runtime = open_runtime(&store, &config);

    add_company(&mut runtime, "AC", false);
    let error = run_company(
        &mut runtime,
        CompanyCommands::Add {
            code: "AC".to_string(),
            name: "Other".to_string(),
            cnpj: "other".to_string(),
            folder: false,
        },
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Core(contratos_core::Error::Duplicate(_))));
    assert_eq!(error.exit_code(), 1);
}

#[test]
fn push_conflict_fails_with_conflict_exit_code() {
    let store = InMemoryStore::new();
    let tmp_a = TempDir::new().unwrap();
    let tmp_b = TempDir::new().unwrap();
    let mut a = open_runtime(&store, &test_config(&tmp_a, None));
    let mut b = open_runtime(&store, &test_config(&tmp_b, None));

    add_company(&mut a, "AC", false);
    add_company(&mut b, "OB", false);

    let error = run_company(
        &mut a,
        CompanyCommands::Add {
            code: "ZZ".to_string(),
            name: "Late".to_string(),
            cnpj: "late".to_string(),
            folder: false,
        },
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Core(contratos_core::Error::Conflict(_))));
    assert_eq!(error.exit_code(), 3);
    assert!(a.context.is_dirty());
    assert_eq!(a.context.conflicts().len(), 1);
}

#[test]
fn folder_without_companies_root_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = test_config(&tmp, None);
    let mut runtime = open_runtime(&store, &config);

    let error = run_company(
        &mut runtime,
        CompanyCommands::Add {
            code: "AC".to_string(),
            name: "ACME".to_string(),
            cnpj: "cnpj".to_string(),
            folder: true,
        },
    )
    .unwrap_err();
    assert_eq!(error.exit_code(), 2);
    assert!(company_codes(&mut runtime).is_empty());
}

#[test]
fn login_checks_seeded_admin() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = test_config(&tmp, None);
    let mut runtime = open_runtime(&store, &config);

    let user = run_login(&mut runtime, "admin", "admin123").unwrap();
    assert_eq!(user.role, UserRole::Admin);

    let error = run_login(&mut runtime, "admin", "wrong").unwrap_err();
    assert!(matches!(error, CliError::LoginFailed));
}

#[test]
fn attach_fetch_and_remove_company_contract_file() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let root = store.ensure_folder("Empresas", None).unwrap();
    let config = test_config(&tmp, Some(root.as_str()));
    let mut runtime = open_runtime(&store, &config);

    add_company(&mut runtime, "AC", true);
    crate::commands::hierarchy::run_contract(
        &mut runtime,
        crate::cli::ContractCommands::Add {
            number: "CT-001".to_string(),
            company: "AC".to_string(),
            contracted: Some("Obras SA".to_string()),
            title: None,
            specifications: None,
            folder: true,
        },
    )
    .unwrap();

    let source = tmp.path().join("planta.pdf");
    std::fs::write(&source, b"%PDF-1.4").unwrap();
    let attachment = run_attach(
        &mut runtime,
        AttachmentKind::Contract,
        "CT-001",
        &source,
        Some("planta baixa".to_string()),
        None,
    )
    .unwrap();
    assert_eq!(attachment.mime_type, "application/pdf");
    assert!(store.content(&attachment.remote_id).is_some());

    let error = run_fetch_file(
        &mut runtime,
        AttachmentKind::Contract,
        "CT-999",
        attachment.id,
        None,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::ForeignAttachment { .. }));

    let output = tmp.path().join("copy.pdf");
    let written = run_fetch_file(
        &mut runtime,
        AttachmentKind::Contract,
        "CT-001",
        attachment.id,
        Some(output.clone()),
    )
    .unwrap();
    assert_eq!(written, output);
    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4");

    run_remove_file(&mut runtime, AttachmentKind::Contract, "CT-001", attachment.id).unwrap();
    assert!(store.content(&attachment.remote_id).is_none());
}

#[test]
fn context_state_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = test_config(&tmp, None);

    let mut first = open_runtime(&store, &config);
    add_company(&mut first, "AC", false);
    let mark = first.context.remote_mark();
    assert!(mark.is_some());
    first.finish().unwrap();

    let second = open_runtime(&store, &config);
    assert_eq!(second.context.remote_mark(), mark);
    assert!(!second.context.is_dirty());
}
