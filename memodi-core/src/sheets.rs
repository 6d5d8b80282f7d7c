//! Spreadsheet-backed score store.
//!
//! `GoogleSheetsStore` appends one row per graded attempt to the first
//! worksheet of a pre-existing spreadsheet, located by its document name.
//! Authentication is a service-account JWT bearer grant; the access token and
//! the resolved spreadsheet id are cached for the life of the store.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ScoringConfig;
use crate::models::ScoreRecord;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets \
                            https://www.googleapis.com/auth/drive.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the cached token expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// ScoreStore trait
// ============================================================================

/// Append-only sink for score records.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn append(&self, record: &ScoreRecord) -> Result<(), StoreError>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid service-account credentials: {0}")]
    Credentials(String),

    #[error("Token exchange failed: {0}")]
    Auth(String),

    #[error("Spreadsheet '{0}' not found or not shared with the service account")]
    DocumentNotFound(String),
}

impl StoreError {
    /// Rate limits, server errors and connection drops are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect(),
            StoreError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Service-account key
// ============================================================================

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Credentials(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Credentials(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Google API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Serialize)]
struct AppendBody {
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: Option<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    code: u16,
    message: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

// ============================================================================
// GoogleSheetsStore
// ============================================================================

pub struct GoogleSheetsStore {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    document_name: String,
    sheets_base_url: String,
    drive_base_url: String,
    max_retries: usize,
    retry_delay_ms: u64,
    token: Mutex<Option<CachedToken>>,
    spreadsheet_id: Mutex<Option<String>>,
}

impl GoogleSheetsStore {
    pub fn new(key: ServiceAccountKey, config: &ScoringConfig) -> Result<Self, StoreError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StoreError::Credentials(format!("private_key: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            key,
            encoding_key,
            document_name: config.document_name.clone(),
            sheets_base_url: config.sheets_base_url.trim_end_matches('/').to_string(),
            drive_base_url: config.drive_base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            token: Mutex::new(None),
            spreadsheet_id: Mutex::new(None),
        })
    }

    /// Build from `[scoring]`, reading the key file it points at.
    pub fn from_config(config: &ScoringConfig) -> Result<Self, StoreError> {
        let path = config.credentials_path().ok_or_else(|| {
            StoreError::Credentials(
                "no service-account key configured (scoring.credentials_path or \
                 GOOGLE_APPLICATION_CREDENTIALS)"
                    .to_string(),
            )
        })?;
        let key = ServiceAccountKey::from_file(&path)?;
        Self::new(key, config)
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.token.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let assertion = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| StoreError::Auth(format!("jwt encode error: {}", e)))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), body = %body, "Service-account token exchange rejected");
            return Err(StoreError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Obtained Sheets access token");

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn resolve_spreadsheet_id(&self, token: &str) -> Result<String, StoreError> {
        let mut cached = self.spreadsheet_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.document_name.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let response = self
            .client
            .get(format!("{}/files", self.drive_base_url))
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        let list: DriveFileList = parse_google_response(response).await?;
        let id = list
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| StoreError::DocumentNotFound(self.document_name.clone()))?;

        tracing::info!(document = %self.document_name, spreadsheet_id = %id, "Resolved score spreadsheet");
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn append_once(&self, record: &ScoreRecord) -> Result<(), StoreError> {
        let token = self.access_token().await?;
        let spreadsheet_id = self.resolve_spreadsheet_id(&token).await?;

        // A range without a sheet name targets the first worksheet.
        let url = format!(
            "{}/spreadsheets/{}/values/A1:append",
            self.sheets_base_url, spreadsheet_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&AppendBody {
                values: vec![record.to_row()],
            })
            .send()
            .await?;

        let _: serde_json::Value = parse_google_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for GoogleSheetsStore {
    async fn append(&self, record: &ScoreRecord) -> Result<(), StoreError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.append_once(record),
            |e: &StoreError| e.is_transient(),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    document = %self.document_name,
                    topic = %record.topic,
                    score = record.score,
                    "Appended score row"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(document = %self.document_name, error = %e, "Failed to append score row");
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "google-sheets"
    }
}

async fn parse_google_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        let (code, message) = serde_json::from_str::<GoogleErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error)
            .map(|e| (e.code, e.message))
            .unwrap_or((status.as_u16(), error_body));

        tracing::warn!(code = code, message = %message, "Google API error");
        return Err(StoreError::Api { code, message });
    }
    Ok(response.json().await?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_JSON: &str = include_str!("../tests/fixtures/test_service_account.json");

    fn store_for(server: &MockServer, max_retries: usize) -> GoogleSheetsStore {
        let mut key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        key.token_uri = format!("{}/token", server.uri());
        let config = ScoringConfig {
            document_name: "Registro Simulador".to_string(),
            sheets_base_url: server.uri(),
            drive_base_url: server.uri(),
            max_retries,
            retry_delay_ms: 10,
            ..ScoringConfig::default()
        };
        GoogleSheetsStore::new(key, &config).unwrap()
    }

    async fn mount_token_and_drive(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "id": "sheet-123", "name": "Registro Simulador" }]
            })))
            .mount(server)
            .await;
    }

    fn record() -> ScoreRecord {
        ScoreRecord::new("Síncope", 85, "CALIFICACIÓN: 85/100 buen trabajo")
    }

    #[test]
    fn test_key_debug_hides_private_key() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("simulador@memodi-test"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        let key = ServiceAccountKey {
            client_email: "x@y".to_string(),
            private_key: "not a pem".to_string(),
            private_key_id: None,
            token_uri: default_token_uri(),
        };
        match GoogleSheetsStore::new(key, &ScoringConfig::default()) {
            Err(StoreError::Credentials(_)) => {}
            _ => panic!("Expected Credentials error"),
        }
    }

    #[test]
    fn test_from_config_without_credentials_fails() {
        let config = ScoringConfig {
            credentials_path: Some("/nonexistent/memodi/sa.json".to_string()),
            ..ScoringConfig::default()
        };
        assert!(matches!(
            GoogleSheetsStore::from_config(&config),
            Err(StoreError::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn test_append_writes_row_to_first_sheet() {
        let server = MockServer::start().await;
        mount_token_and_drive(&server).await;

        let record = record();
        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values/A1:append"))
            .and(query_param("valueInputOption", "RAW"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(body_json(serde_json::json!({ "values": [record.to_row()] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "spreadsheetId": "sheet-123",
                "updates": { "updatedRows": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, 0);
        store.append(&record).await.expect("append should succeed");
    }

    #[tokio::test]
    async fn test_token_and_document_cached_across_appends() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "id": "sheet-123" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values/A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let store = store_for(&server, 0);
        store.append(&record()).await.unwrap();
        store.append(&record()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_document_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
            .mount(&server)
            .await;

        let store = store_for(&server, 2);
        match store.append(&record()).await {
            Err(StoreError::DocumentNotFound(name)) => assert_eq!(name, "Registro Simulador"),
            other => panic!("Expected DocumentNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid JWT Signature."
            })))
            .mount(&server)
            .await;

        let store = store_for(&server, 2);
        assert!(matches!(store.append(&record()).await, Err(StoreError::Auth(_))));
    }

    #[tokio::test]
    async fn test_append_retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        mount_token_and_drive(&server).await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values/A1:append"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "code": 503, "message": "The service is currently unavailable." }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values/A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let store = store_for(&server, 2);
        store.append(&record()).await.expect("retry should recover");
    }

    #[tokio::test]
    async fn test_permission_error_not_retried() {
        let server = MockServer::start().await;
        mount_token_and_drive(&server).await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values/A1:append"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": { "code": 403, "message": "The caller does not have permission" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, 3);
        match store.append(&record()).await {
            Err(StoreError::Api { code, message }) => {
                assert_eq!(code, 403);
                assert!(message.contains("permission"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Api { code: 429, message: String::new() }.is_transient());
        assert!(StoreError::Api { code: 500, message: String::new() }.is_transient());
        assert!(!StoreError::Api { code: 404, message: String::new() }.is_transient());
        assert!(!StoreError::DocumentNotFound("x".into()).is_transient());
    }
}
