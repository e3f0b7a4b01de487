//! Google Sheets v4 `SheetStore` with service-account authentication.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConfigError, SheetsError};
use crate::extract::schema::column_count;
use crate::sheets::router::column_letter;
use crate::sheets::traits::{PartitionHandle, SheetStore};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime; Google caps it at one hour.
const ASSERTION_TTL_SECS: i64 = 3600;

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// The fields of a service-account key file we use.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

struct AccessToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Sheets REST client bound to one spreadsheet document.
pub struct GoogleSheetsStore {
    http: reqwest::Client,
    spreadsheet_id: String,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleSheetsStore {
    /// Parse the service-account JSON and prepare the signing key.
    ///
    /// Misconfiguration surfaces here, at startup, never on a write.
    pub fn new(
        service_account_json: &SecretString,
        spreadsheet_id: &str,
    ) -> Result<Self, ConfigError> {
        let key: ServiceAccountKey = serde_json::from_str(service_account_json.expose_secret())
            .map_err(|e| ConfigError::InvalidValue {
                key: "GCP_SERVICE_ACCOUNT_JSON".into(),
                message: e.to_string(),
            })?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "GCP_SERVICE_ACCOUNT_JSON".into(),
                message: format!("private_key: {e}"),
            }
        })?;
        if spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("SPREADSHEET_KEY".into()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ConfigError::ParseError(format!("HTTP client: {e}")))?;

        info!(client = %key.client_email, "Google Sheets store configured");
        Ok(Self {
            http,
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            client_email: key.client_email,
            token_uri: key.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            signing_key,
            api_base: SHEETS_API_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Point at a different Sheets API host (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Cached bearer token, refreshed shortly before expiry.
    async fn access_token(&self) -> Result<String, SheetsError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = guard.as_ref()
            && token.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
        {
            return Ok(token.value.expose_secret().to_string());
        }

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        };
        let header = Header::new(Algorithm::RS256);
        let assertion = jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| SheetsError::Auth(format!("sign assertion: {e}")))?;

        let resp = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("token endpoint {status}: {body}")));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SheetsError::Auth(format!("token response: {e}")))?;

        debug!(expires_in = body.expires_in, "Access token refreshed");
        let value = body.access_token.clone();
        *guard = Some(AccessToken {
            value: SecretString::from(body.access_token),
            expires_at: now + chrono::Duration::seconds(body.expires_in),
        });
        Ok(value)
    }

    /// Send an authorized request and decode the JSON body.
    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SheetsError> {
        let token = self.access_token().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SheetsError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json().await.map_err(|e| SheetsError::InvalidResponse {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }

    fn document_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.api_base, self.spreadsheet_id, suffix)
    }

    /// `…/values/<range><suffix>` with the range percent-encoded.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let invalid = |reason: String| SheetsError::InvalidResponse {
            operation: "build url".into(),
            reason,
        };
        let mut url =
            Url::parse(&self.document_url("/values")).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base url cannot hold a path".into()))?
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }
}

/// `'<name>'!<cells>` with embedded quotes doubled.
fn a1_range(name: &str, cells: &str) -> String {
    format!("'{}'!{}", name.replace('\'', "''"), cells)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsStore {
    async fn find_partition(&self, name: &str) -> Result<Option<PartitionHandle>, SheetsError> {
        let request = self
            .http
            .get(self.document_url(""))
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let body = self.send("spreadsheets.get", request).await?;
        let meta: SpreadsheetMeta =
            serde_json::from_value(body).map_err(|e| SheetsError::InvalidResponse {
                operation: "spreadsheets.get".into(),
                reason: e.to_string(),
            })?;
        Ok(meta
            .sheets
            .into_iter()
            .find(|s| s.properties.title == name)
            .map(|s| PartitionHandle {
                name: s.properties.title,
                sheet_id: s.properties.sheet_id,
            }))
    }

    async fn create_partition(&self, name: &str) -> Result<PartitionHandle, SheetsError> {
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": name } } }]
        });
        let request = self.http.post(self.document_url(":batchUpdate")).json(&body);
        let resp = self.send("addSheet", request).await?;
        let sheet_id = resp
            .pointer("/replies/0/addSheet/properties/sheetId")
            .and_then(Value::as_i64)
            .ok_or_else(|| SheetsError::InvalidResponse {
                operation: "addSheet".into(),
                reason: "missing sheetId".into(),
            })?;
        info!(partition = %name, sheet_id, "Sheet tab created");
        Ok(PartitionHandle {
            name: name.to_string(),
            sheet_id,
        })
    }

    async fn read_rows(
        &self,
        partition: &PartitionHandle,
        row_count: usize,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let last = column_letter(column_count().saturating_sub(1));
        let range = a1_range(&partition.name, &format!("A1:{last}{row_count}"));
        let url = self.values_url(&range, "")?;
        let request = self
            .http
            .get(url)
            .query(&[("valueRenderOption", "FORMULA")]);
        let body = self.send("values.get", request).await?;
        let values: ValueRange =
            serde_json::from_value(body).map_err(|e| SheetsError::InvalidResponse {
                operation: "values.get".into(),
                reason: e.to_string(),
            })?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_rows(
        &self,
        partition: &PartitionHandle,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SheetsError> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let last = column_letter(width - 1);
        let range = a1_range(&partition.name, &format!("A1:{last}{}", rows.len().max(1)));
        let url = self.values_url(&range, "")?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let request = self
            .http
            .put(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body);
        self.send("values.update", request).await?;
        Ok(())
    }

    async fn append_row(
        &self,
        partition: &PartitionHandle,
        first_data_row: usize,
        row: Vec<String>,
    ) -> Result<(), SheetsError> {
        let range = a1_range(&partition.name, &format!("A{first_data_row}"));
        let url = self.values_url(&range, ":append")?;
        let body = json!({ "majorDimension": "ROWS", "values": [row] });
        let request = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body);
        self.send("values.append", request).await?;
        Ok(())
    }
}
