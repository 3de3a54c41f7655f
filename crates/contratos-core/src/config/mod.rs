//! Startup configuration.
//!
//! Everything the sync path needs is resolved once by [`AppConfig::from_env`]
//! and passed down explicitly. Parsing goes through [`parse_config`] so it can
//! be exercised with a plain map instead of the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::{DriveCredentials, FolderId, GoogleDriveStore, RetryPolicy, RetryingStore};
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub const DATABASE_FOLDER_VAR: &str = "GDRIVE_DATABASE_FOLDER_ID";
pub const COMPANIES_FOLDER_VAR: &str = "GDRIVE_EMPRESAS_FOLDER_ID";
pub const DB_NAME_VAR: &str = "CONTRATOS_DB_NAME";
pub const CACHE_DIR_VAR: &str = "CONTRATOS_CACHE_DIR";
pub const REMOTE_TIMEOUT_VAR: &str = "CONTRATOS_REMOTE_TIMEOUT_SECS";
pub const REMOTE_MAX_ATTEMPTS_VAR: &str = "CONTRATOS_REMOTE_MAX_ATTEMPTS";
pub const CREDENTIALS_JSON_VAR: &str = "GOOGLE_CREDENTIALS_JSON";
pub const CREDENTIALS_FILE_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub const DEFAULT_DB_NAME: &str = "db_gestaodecontratos.db";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REMOTE_MAX_ATTEMPTS: u32 = 3;
const CACHE_SUBDIR: &str = "contratos";

/// Where the service-account key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    /// Key JSON given inline.
    Inline(String),
    /// Path to a key file.
    File(PathBuf),
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => formatter.write_str("Inline([REDACTED])"),
            Self::File(path) => formatter.debug_tuple("File").field(path).finish(),
        }
    }
}

impl CredentialsSource {
    pub fn load(&self) -> Result<DriveCredentials> {
        let credentials = match self {
            Self::Inline(payload) => DriveCredentials::from_json(payload),
            Self::File(path) => DriveCredentials::from_file(path),
        };
        credentials.map_err(|error| Error::Config(error.to_string()))
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Drive folder holding the database file.
    pub database_folder_id: FolderId,
    /// Root folder under which company document folders are created.
    pub companies_folder_id: Option<FolderId>,
    /// Name of the database object, remotely and in the cache.
    pub db_name: String,
    /// Directory holding one sub-directory per context.
    pub cache_dir: PathBuf,
    pub remote_timeout: Duration,
    pub remote_max_attempts: u32,
    pub credentials: CredentialsSource,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = std::env::vars().collect();
        parse_config(|name| values.get(name).cloned())
    }

    /// Retry policy for remote calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.remote_max_attempts)
    }

    /// Build the Drive client wrapped in the configured retry policy.
    pub fn drive_store(&self) -> Result<RetryingStore<GoogleDriveStore>> {
        let credentials = self.credentials.load()?;
        let drive = GoogleDriveStore::new(credentials, self.remote_timeout)?;
        Ok(RetryingStore::new(drive, self.retry_policy()))
    }
}

/// Build an [`AppConfig`] from a variable lookup.
pub fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
    let database_folder_id = required_trimmed(&lookup, DATABASE_FOLDER_VAR)?;
    let companies_folder_id = optional_trimmed(&lookup, COMPANIES_FOLDER_VAR);

    let db_name = optional_trimmed(&lookup, DB_NAME_VAR)
        .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
    if db_name.contains(['/', '\\']) {
        return Err(Error::Config(format!(
            "{DB_NAME_VAR} must be a file name, not a path"
        )));
    }

    let cache_dir =
        optional_trimmed(&lookup, CACHE_DIR_VAR).map_or_else(default_cache_dir, PathBuf::from);

    let timeout_secs = parse_number(&lookup, REMOTE_TIMEOUT_VAR, DEFAULT_REMOTE_TIMEOUT_SECS)?;
    if timeout_secs == 0 {
        return Err(Error::Config(format!("{REMOTE_TIMEOUT_VAR} must be > 0")));
    }

    let remote_max_attempts =
        parse_number(&lookup, REMOTE_MAX_ATTEMPTS_VAR, DEFAULT_REMOTE_MAX_ATTEMPTS)?;
    if !(1..=10).contains(&remote_max_attempts) {
        return Err(Error::Config(format!(
            "{REMOTE_MAX_ATTEMPTS_VAR} must be in [1, 10]"
        )));
    }

    let credentials = if let Some(json) = optional_trimmed(&lookup, CREDENTIALS_JSON_VAR) {
        CredentialsSource::Inline(json)
    } else if let Some(path) = optional_trimmed(&lookup, CREDENTIALS_FILE_VAR) {
        CredentialsSource::File(PathBuf::from(path))
    } else {
        return Err(Error::Config(format!(
            "Drive credentials missing: set {CREDENTIALS_JSON_VAR} or {CREDENTIALS_FILE_VAR}"
        )));
    };

    Ok(AppConfig {
        database_folder_id: FolderId::new(database_folder_id),
        companies_folder_id: companies_folder_id.map(FolderId::new),
        db_name,
        cache_dir,
        remote_timeout: Duration::from_secs(timeout_secs),
        remote_max_attempts,
        credentials,
    })
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_SUBDIR)
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

fn required_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional_trimmed(lookup, name).ok_or_else(|| Error::Config(format!("{name} is not set")))
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    optional_trimmed(lookup, name).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(lookup_from(&[
            (DATABASE_FOLDER_VAR, " folder-db "),
            (CREDENTIALS_FILE_VAR, "/etc/contratos/key.json"),
        ]))
        .unwrap();

        assert_eq!(config.database_folder_id, FolderId::new("folder-db"));
        assert_eq!(config.companies_folder_id, None);
        assert_eq!(config.db_name, DEFAULT_DB_NAME);
        assert_eq!(config.remote_timeout, Duration::from_secs(30));
        assert_eq!(config.remote_max_attempts, 3);
        assert_eq!(
            config.credentials,
            CredentialsSource::File(PathBuf::from("/etc/contratos/key.json"))
        );
        assert!(config.cache_dir.ends_with(CACHE_SUBDIR));
    }

    #[test]
    fn missing_database_folder_is_a_config_error() {
        let error = parse_config(lookup_from(&[(CREDENTIALS_JSON_VAR, "{}")])).unwrap_err();
        assert!(matches!(error, Error::Config(message) if message.contains(DATABASE_FOLDER_VAR)));
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let error = parse_config(lookup_from(&[(DATABASE_FOLDER_VAR, "f")])).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn inline_credentials_take_precedence_and_are_redacted() {
        let config = parse_config(lookup_from(&[
            (DATABASE_FOLDER_VAR, "f"),
            (CREDENTIALS_JSON_VAR, "{\"private_key\":\"secret\"}"),
            (CREDENTIALS_FILE_VAR, "/ignored.json"),
        ]))
        .unwrap();
        assert!(matches!(config.credentials, CredentialsSource::Inline(_)));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let config = parse_config(lookup_from(&[
            (DATABASE_FOLDER_VAR, "f"),
            (COMPANIES_FOLDER_VAR, "companies"),
            (CREDENTIALS_JSON_VAR, "{}"),
            (DB_NAME_VAR, "other.db"),
            (CACHE_DIR_VAR, "/var/cache/contratos"),
            (REMOTE_TIMEOUT_VAR, "5"),
            (REMOTE_MAX_ATTEMPTS_VAR, "4"),
        ]))
        .unwrap();
        assert_eq!(config.db_name, "other.db");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/contratos"));
        assert_eq!(config.remote_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_attempts, 4);
        assert_eq!(
            config.companies_folder_id,
            Some(FolderId::new("companies"))
        );

        for (name, value) in [
            (REMOTE_TIMEOUT_VAR, "0"),
            (REMOTE_TIMEOUT_VAR, "soon"),
            (REMOTE_MAX_ATTEMPTS_VAR, "0"),
            (DB_NAME_VAR, "../escape.db"),
        ] {
            let result = parse_config(lookup_from(&[
                (DATABASE_FOLDER_VAR, "f"),
                (CREDENTIALS_JSON_VAR, "{}"),
                (name, value),
            ]));
            assert!(result.is_err(), "{name}={value} should be rejected");
        }
    }
}
