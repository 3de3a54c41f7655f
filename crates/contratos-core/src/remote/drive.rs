//! Google Drive v3 client authenticated with a service account.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{FolderId, ObjectId, RemoteEntry, RemoteError, RemoteResult, RemoteStore};
use crate::util::{compact_text, unix_millis_now};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;
const LIST_PAGE_SIZE: &str = "1000";
/// Oldest first, so duplicates of a name always resolve to the same file.
const LIST_ORDER: &str = "createdTime";

/// Service-account credentials as found in the JSON key file.
#[derive(Clone, Deserialize)]
pub struct DriveCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for DriveCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DriveCredentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl DriveCredentials {
    /// Parse a service-account key from its JSON text.
    pub fn from_json(payload: &str) -> RemoteResult<Self> {
        let credentials: Self = serde_json::from_str(payload)
            .map_err(|error| RemoteError::Auth(format!("invalid credentials JSON: {error}")))?;
        if credentials.client_email.trim().is_empty() || credentials.private_key.trim().is_empty()
        {
            return Err(RemoteError::Auth(
                "credentials must include client_email and private_key".to_string(),
            ));
        }
        Ok(credentials)
    }

    /// Read a service-account key file.
    pub fn from_file(path: &Path) -> RemoteResult<Self> {
        let payload = fs::read_to_string(path).map_err(|error| {
            RemoteError::Auth(format!(
                "cannot read credentials file {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json(&payload)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at_ms: i64,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileMetadata>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveErrorBody {
    error: DriveErrorDetail,
}

#[derive(Debug, Deserialize)]
struct DriveErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<DriveErrorReason>,
}

#[derive(Debug, Deserialize)]
struct DriveErrorReason {
    #[serde(default)]
    reason: String,
}

/// Blocking Google Drive client implementing [`RemoteStore`].
pub struct GoogleDriveStore {
    client: Client,
    credentials: DriveCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for GoogleDriveStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GoogleDriveStore")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl GoogleDriveStore {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(credentials: DriveCredentials, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RemoteError::Api {
                status: 0,
                message: format!("cannot build HTTP client: {error}"),
            })?;
        Ok(Self {
            client,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Check that the credentials work by listing a single file.
    pub fn check_access(&self) -> RemoteResult<()> {
        let request = self
            .client
            .get(DRIVE_FILES_URL)
            .query(&[("pageSize", "1"), ("fields", "files(id)")]);
        self.send(request)?;
        Ok(())
    }

    fn access_token(&self) -> RemoteResult<String> {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref() {
            if token.expires_at_ms - TOKEN_REFRESH_MARGIN_MS > unix_millis_now() {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_access_token()?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn fetch_access_token(&self) -> RemoteResult<AccessToken> {
        let issued_at = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.credentials.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.credentials.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|error| RemoteError::Auth(format!("invalid private key: {error}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|error| RemoteError::Auth(format!("cannot sign assertion: {error}")))?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|error| classify_transport(&error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(match classify_status(status, &body) {
                RemoteError::Api { message, .. } => RemoteError::Auth(message),
                other => other,
            });
        }

        let payload = response
            .json::<TokenResponse>()
            .map_err(|error| RemoteError::Auth(format!("invalid token response: {error}")))?;
        let lifetime_ms = payload.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS) * 1000;
        tracing::debug!("Obtained Drive access token for {}", self.credentials.client_email);

        Ok(AccessToken {
            value: payload.access_token,
            expires_at_ms: unix_millis_now() + lifetime_ms,
        })
    }

    fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let token = self.access_token()?;
        let response = request
            .bearer_auth(token)
            .send()
            .map_err(|error| classify_transport(&error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_status(status, &body))
    }

    fn list_matching(&self, query: &str, fields: &str) -> RemoteResult<Vec<FileMetadata>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(DRIVE_FILES_URL).query(&[
                ("q", query),
                ("fields", fields),
                ("pageSize", LIST_PAGE_SIZE),
                ("spaces", "drive"),
                ("orderBy", LIST_ORDER),
            ]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page = self
                .send(request)?
                .json::<FileList>()
                .map_err(|error| invalid_payload("files.list", &error))?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(files),
            }
        }
    }

    fn create_with_content(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId> {
        let boundary = multipart_boundary();
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent.as_str()],
        });
        let body = multipart_related_body(&boundary, &metadata.to_string(), mime_type, bytes);

        let request = self
            .client
            .post(DRIVE_UPLOAD_URL)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);

        let created = self
            .send(request)?
            .json::<FileRef>()
            .map_err(|error| invalid_payload("files.create", &error))?;
        tracing::info!("Uploaded {name} to Drive folder {parent}");
        Ok(ObjectId::new(created.id))
    }
}

impl RemoteStore for GoogleDriveStore {
    fn find_by_name(&self, name: &str, parent: &FolderId) -> RemoteResult<Option<ObjectId>> {
        let query = name_query(name, Some(parent), None);
        let files = self.list_matching(&query, "nextPageToken, files(id)")?;
        Ok(files.into_iter().next().map(|file| ObjectId::new(file.id)))
    }

    fn download(&self, id: &ObjectId, destination: &Path) -> RemoteResult<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let request = self
            .client
            .get(format!("{DRIVE_FILES_URL}/{id}"))
            .query(&[("alt", "media")]);
        let mut response = self.send(request)?;

        let partial = partial_path(destination);
        let mut file = fs::File::create(&partial)?;
        if let Err(error) = response.copy_to(&mut file) {
            drop(file);
            fs::remove_file(&partial).ok();
            return Err(classify_transport(&error));
        }
        file.flush()?;
        drop(file);
        fs::rename(&partial, destination)?;

        tracing::info!("Downloaded Drive file {id} to {}", destination.display());
        Ok(())
    }

    fn upload(&self, local_path: &Path, parent: &FolderId) -> RemoteResult<ObjectId> {
        let bytes = fs::read(local_path)?;
        let name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| RemoteError::Api {
                status: 0,
                message: format!("{} has no file name", local_path.display()),
            })?;
        let mime_type = guess_mime_type(local_path);
        self.create_with_content(&bytes, &name, &mime_type, parent)
    }

    fn update_content(&self, id: &ObjectId, local_path: &Path) -> RemoteResult<()> {
        let bytes = fs::read(local_path)?;
        let request = self
            .client
            .patch(format!("{DRIVE_UPLOAD_URL}/{id}"))
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, guess_mime_type(local_path))
            .body(bytes);
        self.send(request)?;
        tracing::info!("Updated content of Drive file {id}");
        Ok(())
    }

    fn modified_time(&self, id: &ObjectId) -> RemoteResult<i64> {
        let request = self
            .client
            .get(format!("{DRIVE_FILES_URL}/{id}"))
            .query(&[("fields", "id, modifiedTime")]);
        let metadata = self
            .send(request)?
            .json::<FileMetadata>()
            .map_err(|error| invalid_payload("files.get", &error))?;
        let raw = metadata.modified_time.ok_or_else(|| RemoteError::Api {
            status: 200,
            message: format!("file {id} has no modifiedTime"),
        })?;
        parse_modified_time(&raw)
    }

    fn ensure_folder(&self, name: &str, parent: Option<&FolderId>) -> RemoteResult<FolderId> {
        let query = name_query(name, parent, Some(FOLDER_MIME_TYPE));
        if let Some(existing) = self
            .list_matching(&query, "nextPageToken, files(id)")?
            .into_iter()
            .next()
        {
            tracing::debug!("Found Drive folder {name}");
            return Ok(FolderId::new(existing.id));
        }

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent.as_str()]);
        }

        let request = self
            .client
            .post(DRIVE_FILES_URL)
            .query(&[("fields", "id")])
            .json(&metadata);
        let created = self
            .send(request)?
            .json::<FileRef>()
            .map_err(|error| invalid_payload("files.create", &error))?;
        tracing::info!("Created Drive folder {name}");
        Ok(FolderId::new(created.id))
    }

    fn upload_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        parent: &FolderId,
    ) -> RemoteResult<ObjectId> {
        self.create_with_content(bytes, name, mime_type, parent)
    }

    fn download_bytes(&self, id: &ObjectId) -> RemoteResult<Vec<u8>> {
        let request = self
            .client
            .get(format!("{DRIVE_FILES_URL}/{id}"))
            .query(&[("alt", "media")]);
        let bytes = self
            .send(request)?
            .bytes()
            .map_err(|error| classify_transport(&error))?;
        Ok(bytes.to_vec())
    }

    fn delete(&self, id: &ObjectId) -> RemoteResult<()> {
        let request = self.client.delete(format!("{DRIVE_FILES_URL}/{id}"));
        self.send(request)?;
        tracing::info!("Deleted Drive file {id}");
        Ok(())
    }

    fn list_folder(&self, parent: &FolderId) -> RemoteResult<Vec<RemoteEntry>> {
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query_value(parent.as_str())
        );
        let files = self.list_matching(
            &query,
            "nextPageToken, files(id, name, mimeType, size, modifiedTime)",
        )?;

        files
            .into_iter()
            .map(|file| {
                let modified_at = file
                    .modified_time
                    .as_deref()
                    .map(parse_modified_time)
                    .transpose()?
                    .unwrap_or_default();
                Ok(RemoteEntry {
                    id: ObjectId::new(file.id),
                    name: file.name,
                    mime_type: file.mime_type,
                    size_bytes: file.size.and_then(|size| size.parse().ok()),
                    modified_at,
                })
            })
            .collect()
    }
}

/// Build a `files.list` query matching one name, optionally within a parent and of a MIME type.
fn name_query(name: &str, parent: Option<&FolderId>, mime_type: Option<&str>) -> String {
    let mut query = format!("name = '{}' and trashed = false", escape_query_value(name));
    if let Some(mime_type) = mime_type {
        query.push_str(&format!(" and mimeType = '{}'", escape_query_value(mime_type)));
    }
    if let Some(parent) = parent {
        query.push_str(&format!(
            " and '{}' in parents",
            escape_query_value(parent.as_str())
        ));
    }
    query
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn parse_modified_time(raw: &str) -> RemoteResult<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|time| time.timestamp_millis())
        .map_err(|error| RemoteError::Api {
            status: 200,
            message: format!("invalid modifiedTime {raw:?}: {error}"),
        })
}

fn classify_transport(error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        RemoteError::Transient(error.to_string())
    } else {
        RemoteError::Api {
            status: error.status().map_or(0, |status| status.as_u16()),
            message: error.to_string(),
        }
    }
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<DriveErrorBody>(body).ok();
    let rate_limited = parsed.as_ref().is_some_and(|payload| {
        payload
            .error
            .errors
            .iter()
            .any(|reason| {
                reason.reason.contains("RateLimitExceeded")
                    || reason.reason == "rateLimitExceeded"
            })
    });
    let message = parsed
        .map(|payload| payload.error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| compact_text(body));

    match status.as_u16() {
        404 => RemoteError::NotFound(message),
        403 if rate_limited => RemoteError::Transient(message),
        408 | 429 | 500..=599 => {
            RemoteError::Transient(format!("HTTP {}: {message}", status.as_u16()))
        }
        401 | 403 => RemoteError::Auth(message),
        code => RemoteError::Api {
            status: code,
            message,
        },
    }
}

fn invalid_payload(call: &str, error: &reqwest::Error) -> RemoteError {
    RemoteError::Api {
        status: 200,
        message: format!("unexpected {call} response: {error}"),
    }
}

fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn multipart_boundary() -> String {
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(24)
        .collect();
    format!("contratos-{suffix}")
}

fn multipart_related_body(
    boundary: &str,
    metadata: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
