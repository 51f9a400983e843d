//! Google Sheets audit log.
//!
//! Every append reads the whole worksheet, drops blank rows, adds the new
//! record as the last row and writes the whole table back. There is no
//! concurrency control: two dispatchers writing to the same sheet at the same
//! time can lose rows.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{AuditRecord, AuditSink, COLUMNS, LogWriteError};
use crate::config::SheetsConfig;

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh the access token this long before Google says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, LogWriteError> {
        serde_json::from_str(raw)
            .map_err(|e| LogWriteError::Misconfigured(format!("invalid service account key: {e}")))
    }

    /// The key file wins over the inline JSON variable.
    pub fn load(config: &SheetsConfig) -> Result<Self, LogWriteError> {
        let path = &config.service_account_file;
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                LogWriteError::Misconfigured(format!("cannot read {}: {e}", path.display()))
            })?;
            return Self::from_json(&raw);
        }

        match &config.service_account_json {
            Some(raw) => Self::from_json(raw),
            None => Err(LogWriteError::Misconfigured(format!(
                "service account file {} not found and SERVICE_ACCOUNT_JSON is not set",
                path.display()
            ))),
        }
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

/// Build the signed RS256 JWT exchanged for an OAuth access token.
pub fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, LogWriteError> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SPREADSHEETS_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| LogWriteError::Misconfigured(format!("invalid private key: {e}")))?;

    encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| LogWriteError::Misconfigured(format!("failed to sign token assertion: {e}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct SheetsAuditLog {
    client: reqwest::Client,
    config: SheetsConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsAuditLog {
    pub fn new(config: SheetsConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    /// Checks that need no network: sheet id present, credentials parse.
    pub fn validate_config(&self) -> Result<(), LogWriteError> {
        self.sheet_id()?;
        ServiceAccountKey::load(&self.config)?;
        Ok(())
    }

    fn sheet_id(&self) -> Result<&str, LogWriteError> {
        self.config.sheet_id.as_deref().ok_or_else(|| {
            LogWriteError::Misconfigured("GOOGLE_SHEET_ID is empty or not set".to_string())
        })
    }

    async fn access_token(&self) -> Result<String, LogWriteError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let key = ServiceAccountKey::load(&self.config)?;
        let assertion = sign_assertion(&key, Utc::now())?;

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| LogWriteError::Unreachable(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LogWriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LogWriteError::Unreachable(format!("invalid token response: {e}")))?;

        let lifetime = (token.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        });

        tracing::debug!("Obtained Sheets access token for {}", key.client_email);
        Ok(token.access_token)
    }

    fn read_range(&self) -> String {
        match &self.config.worksheet {
            Some(name) => quote_sheet_name(name),
            None => "A:ZZ".to_string(),
        }
    }

    fn write_range(&self) -> String {
        match &self.config.worksheet {
            Some(name) => format!("{}!A1", quote_sheet_name(name)),
            None => "A1".to_string(),
        }
    }

    fn values_url(&self, sheet_id: &str, range: &str, query: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}?{query}",
            self.config.api_base,
            encode_segment(sheet_id),
            encode_segment(range)
        )
    }

    async fn read_rows(&self, sheet_id: &str, token: &str) -> Result<Vec<Vec<Value>>, LogWriteError> {
        let url = self.values_url(
            sheet_id,
            &self.read_range(),
            "majorDimension=ROWS&valueRenderOption=UNFORMATTED_VALUE",
        );

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| LogWriteError::Unreachable(format!("read failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LogWriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let range: ValueRange = resp
            .json()
            .await
            .map_err(|e| LogWriteError::Unreachable(format!("invalid read response: {e}")))?;

        Ok(range.values)
    }

    async fn write_rows(
        &self,
        sheet_id: &str,
        token: &str,
        rows: &[Vec<Value>],
    ) -> Result<(), LogWriteError> {
        let url = self.values_url(sheet_id, &self.write_range(), "valueInputOption=RAW");

        let resp = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .map_err(|e| LogWriteError::Unreachable(format!("write failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LogWriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AuditSink for SheetsAuditLog {
    async fn check(&self) -> Result<(), LogWriteError> {
        self.validate_config()?;
        self.access_token().await?;
        Ok(())
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), LogWriteError> {
        let sheet_id = self.sheet_id()?;
        let token = self.access_token().await?;

        let existing = self.read_rows(sheet_id, &token).await?;
        let mut table = merge_table(&existing, record);
        blank_stale_tail(&mut table, &existing);

        self.write_rows(sheet_id, &token, &table).await
    }
}

/// Drop blank rows from `existing` and append `record`, aligned by header name.
///
/// An empty sheet gets the standard header first. Columns of the record that
/// the existing header lacks are appended to it; existing columns the record
/// does not know are left empty in the new row.
pub fn merge_table(existing: &[Vec<Value>], record: &AuditRecord) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = existing
        .iter()
        .filter(|row| !is_blank_row(row))
        .cloned()
        .collect();

    if rows.is_empty() {
        return vec![COLUMNS.iter().map(|c| json!(c)).collect(), record.row()];
    }

    let mut header = rows[0].clone();
    for column in COLUMNS {
        if !header.iter().any(|h| h.as_str() == Some(column)) {
            header.push(json!(column));
        }
    }

    let new_row: Vec<Value> = header
        .iter()
        .map(|h| h.as_str().and_then(|name| record.cell(name)).unwrap_or_else(|| json!("")))
        .collect();

    rows[0] = header;
    rows.push(new_row);

    let width = rows.iter().map(Vec::len).max().unwrap_or_default();
    for row in &mut rows {
        row.resize(width, json!(""));
    }

    rows
}

/// Pad `table` with blank rows so the rewrite overwrites every row that was
/// on the sheet before blank rows were dropped.
pub fn blank_stale_tail(table: &mut Vec<Vec<Value>>, existing: &[Vec<Value>]) {
    let width = table
        .iter()
        .chain(existing.iter())
        .map(Vec::len)
        .max()
        .unwrap_or_default();

    for row in table.iter_mut() {
        row.resize(width, json!(""));
    }
    while table.len() < existing.len() {
        table.push(vec![json!(""); width]);
    }
}

fn is_blank_row(row: &[Value]) -> bool {
    row.iter().all(|cell| match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
