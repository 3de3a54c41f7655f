use std::path::PathBuf;

use contratos_core::remote::{FolderId, GoogleDriveStore, RemoteStore, RetryingStore};
use contratos_core::services::DocumentService;
use contratos_core::sync::ContextKey;
use contratos_core::{AppConfig, ConnectionRegistry, PushOutcome, Session, SyncContext};
use serde::Serialize;

use crate::error::CliError;

/// Registry and context one CLI invocation works with.
pub struct Runtime<S> {
    pub registry: ConnectionRegistry<S>,
    pub context: SyncContext,
    pub companies_root: Option<FolderId>,
}

impl Runtime<RetryingStore<GoogleDriveStore>> {
    /// Build the Drive-backed runtime from the environment.
    pub fn from_env(cache_dir: Option<PathBuf>, context: &str) -> Result<Self, CliError> {
        let mut config = AppConfig::from_env()?;
        if let Some(cache_dir) = cache_dir {
            config.cache_dir = cache_dir;
        }
        let store = config.drive_store()?;
        Self::new(store, &config, context)
    }
}

impl<S: RemoteStore> Runtime<S> {
    /// Restore the named context left by a previous invocation.
    pub fn new(store: S, config: &AppConfig, context: &str) -> Result<Self, CliError> {
        let registry = ConnectionRegistry::from_config(store, config);
        let key = ContextKey::new(context)?;
        let context = SyncContext::restore(key, &config.cache_dir, &config.db_name)?;
        Ok(Self {
            registry,
            context,
            companies_root: config.companies_folder_id.clone(),
        })
    }

    /// Run `body` in one scoped transaction and report what happened to the push.
    ///
    /// A push conflict fails the command even though the change is committed
    /// locally.
    pub fn scoped<T>(
        &mut self,
        body: impl FnOnce(&Session<'_>, &DocumentService<&S>) -> contratos_core::Result<T>,
    ) -> Result<T, CliError> {
        let documents =
            DocumentService::new(self.registry.gate().store(), self.companies_root.clone());
        let scoped = self
            .registry
            .transaction(&mut self.context, |session| body(session, &documents))?;
        if let Some(message) = sync_message(&scoped.sync) {
            eprintln!("{message}");
        }
        match scoped.sync {
            PushOutcome::Conflict(conflict) => {
                Err(CliError::Core(contratos_core::Error::Conflict(conflict)))
            }
            _ => Ok(scoped.value),
        }
    }

    /// Save the context state for the next invocation.
    pub fn finish(self) -> Result<(), CliError> {
        self.context.persist()?;
        Ok(())
    }
}

/// What the user is told about a push.
pub fn sync_message(outcome: &PushOutcome) -> Option<String> {
    match outcome {
        PushOutcome::Clean => None,
        PushOutcome::Pushed { .. } => Some("Pushed to Google Drive.".to_string()),
        PushOutcome::Deferred { reason } => Some(format!(
            "Saved locally; remote sync will be retried ({reason})."
        )),
        PushOutcome::Conflict(conflict) => Some(format!(
            "Conflict detected: the remote database changed since it was last read ({conflict}). \
             The change was kept locally only. Run `contratos resync --take-remote` or \
             `contratos resync --keep-local`."
        )),
    }
}

pub fn print_json<T: Serialize>(items: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(items)?);
    Ok(())
}

/// `value` or `-` for empty optional columns.
pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Render a unix-ms timestamp as local time, or `never`.
pub fn format_mark(mark: Option<i64>) -> String {
    mark.and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || "never".to_string(),
            |utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
}
