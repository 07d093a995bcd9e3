//! Sheets v4 REST client authenticated with a service-account key.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::debug;
use volleystat_core::config::SheetsConfig;

use crate::{SheetsApi, SheetsApiError};

// ============================================================================
// Constants
// ============================================================================

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Fields of a service-account key file that the token exchange needs.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
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
}

pub struct HttpSheetsApi {
    client: Client,
    api_base: String,
    credentials_file: PathBuf,
    token_uri: Option<String>,
    access_token: Option<String>,
}

// ============================================================================
// Public API
// ============================================================================

impl HttpSheetsApi {
    pub fn new(credentials_file: impl Into<PathBuf>, api_base: impl Into<String>) -> Result<Self, SheetsApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            credentials_file: credentials_file.into(),
            token_uri: None,
            access_token: None,
        })
    }

    pub fn from_config(config: &SheetsConfig) -> Result<Self, SheetsApiError> {
        let mut api = Self::new(&config.credentials_file, &config.api_base)?;
        api.token_uri = config.token_uri.clone();
        Ok(api)
    }

    /// `/v4/spreadsheets/{id}` followed by `segments`, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, SheetsApiError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SheetsApiError::Config(format!("api base {:?}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| SheetsApiError::Config(format!("api base {:?} cannot take a path", self.api_base)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str, action: Option<&str>) -> Result<Url, SheetsApiError> {
        let last = match action {
            Some(action) => format!("{range}:{action}"),
            None => range.to_string(),
        };
        self.url(&[spreadsheet_id, "values", &last])
    }

    fn send(&self, request: RequestBuilder) -> Result<Json, SheetsApiError> {
        let token = self.access_token.as_deref().ok_or(SheetsApiError::Unauthorized)?;
        let response = request.bearer_auth(token).send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SheetsApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json()?)
    }
}

impl SheetsApi for HttpSheetsApi {
    fn authorize(&mut self) -> Result<(), SheetsApiError> {
        let raw = fs::read_to_string(&self.credentials_file).map_err(|e| {
            SheetsApiError::Credentials(format!("{}: {e}", self.credentials_file.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            SheetsApiError::Credentials(format!("{}: {e}", self.credentials_file.display()))
        })?;
        let token_uri = self
            .token_uri
            .clone()
            .or(key.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let assertion = sign_assertion(&key, &token_uri)?;
        let response = self
            .client
            .post(&token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SheetsApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let token: TokenResponse = response.json()?;

        debug!(account = %key.client_email, "service account authorized");
        self.access_token = Some(token.access_token);
        Ok(())
    }

    fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsApiError> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        let body = self.send(self.client.get(url))?;

        let titles = body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), SheetsApiError> {
        let url = self.url(&[&format!("{spreadsheet_id}:batchUpdate")])?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        self.send(self.client.post(url).json(&body))?;
        Ok(())
    }

    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<Json>>, SheetsApiError> {
        let mut url = self.values_url(spreadsheet_id, range, None)?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        let body = self.send(self.client.get(url))?;

        // An empty range comes back without a `values` key.
        match body.get("values") {
            None => Ok(Vec::new()),
            Some(values) => serde_json::from_value(values.clone())
                .map_err(|e| SheetsApiError::Response(format!("values of {range}: {e}"))),
        }
    }

    fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<(), SheetsApiError> {
        let url = self.values_url(spreadsheet_id, range, Some("clear"))?;
        self.send(self.client.post(url).json(&json!({})))?;
        Ok(())
    }

    fn update_values(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError> {
        let mut url = self.values_url(spreadsheet_id, range, None)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let response = self.send(self.client.put(url).json(&body))?;
        Ok(updated_rows(&response["updatedRows"]))
    }

    fn append_values(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError> {
        let mut url = self.values_url(spreadsheet_id, range, Some("append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        let response = self.send(self.client.post(url).json(&body))?;
        Ok(updated_rows(&response["updates"]["updatedRows"]))
    }
}

// ============================================================================
// Private helpers
// ============================================================================

fn sign_assertion(key: &ServiceAccountKey, audience: &str) -> Result<String, SheetsApiError> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?)
}

fn updated_rows(field: &Json) -> usize {
    field
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn api() -> HttpSheetsApi {
        HttpSheetsApi::new("unused.json", "https://sheets.googleapis.com").unwrap()
    }

    #[test]
    fn test_values_url_encodes_range() {
        let url = api()
            .values_url("abc123", "Player Stats!A1:K9", Some("clear"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/Player%20Stats!A1:K9:clear"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let api = HttpSheetsApi::new("unused.json", "http://127.0.0.1:8080/proxy/").unwrap();
        let url = api.url(&["abc123:batchUpdate"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/proxy/v4/spreadsheets/abc123:batchUpdate");
    }

    #[test]
    fn test_missing_credentials_file() {
        let tmp = TempDir::new().unwrap();
        let mut api = HttpSheetsApi::new(tmp.path().join("nope.json"), "https://sheets.googleapis.com").unwrap();
        assert!(matches!(api.authorize(), Err(SheetsApiError::Credentials(_))));
    }

    #[test]
    fn test_malformed_private_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.json");
        fs::write(
            &path,
            r#"{"client_email": "stats@example.iam.gserviceaccount.com", "private_key": "not a pem"}"#,
        )
        .unwrap();
        let mut api = HttpSheetsApi::new(path, "https://sheets.googleapis.com").unwrap();
        assert!(matches!(api.authorize(), Err(SheetsApiError::Token(_))));
    }

    #[test]
    fn test_calls_require_authorization() {
        let err = api().sheet_titles("abc123").unwrap_err();
        assert!(matches!(err, SheetsApiError::Unauthorized));
    }

    #[test]
    fn test_updated_rows_defaults_to_zero() {
        assert_eq!(updated_rows(&json!(4)), 4);
        assert_eq!(updated_rows(&Json::Null), 0);
    }
}
