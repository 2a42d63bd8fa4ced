//! Google integration configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GoogleError, GoogleResult};

/// OAuth 2.0 application credentials.
///
/// These identify the application, not the user; they come from the
/// `credentials.json` downloaded from the Google Cloud Console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports the Cloud Console format with an `installed` or `web` section,
/// and a flat format with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google credentials JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> GoogleResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GoogleError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON string.
    pub fn from_json(json: &str) -> GoogleResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            GoogleError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(GoogleError::configuration(
            "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
        ))
    }

    /// Checks that both halves are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Google endpoints used by the integration.
///
/// Only overridden in tests, to point at a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    /// OAuth consent page.
    pub auth_url: String,
    /// OAuth token endpoint (code exchange and refresh).
    pub token_url: String,
    /// Calendar API v3 base URL.
    pub api_base: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://www.googleapis.com/calendar/v3".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Points every endpoint at one base URL (`{base}/auth`, `{base}/token`, `{base}/calendar/v3`).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/auth", base),
            token_url: format!("{}/token", base),
            api_base: format!("{}/calendar/v3", base),
        }
    }

    /// URL of the free/busy query endpoint.
    pub fn freebusy_url(&self) -> String {
        format!("{}/freeBusy", self.api_base.trim_end_matches('/'))
    }
}

/// Configuration for authorization and free/busy queries.
///
/// Passed explicitly to the [`crate::Authorizer`], [`crate::CredentialStore`]
/// and [`crate::FreeBusyClient`]; nothing reads paths from the process
/// environment.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Path to the application credentials file (input only).
    pub credentials_path: PathBuf,

    /// Path to the stored authorized-user token (read and overwritten).
    pub token_path: PathBuf,

    /// OAuth scopes requested during consent.
    pub scopes: Vec<String>,

    /// Timeout applied to every HTTP request to Google.
    pub timeout: Duration,

    /// How long to wait for the browser to hit the loopback callback.
    pub consent_timeout: Duration,

    /// Port range for the loopback OAuth server.
    pub loopback_port_range: (u16, u16),

    /// User agent string for requests.
    pub user_agent: String,

    /// Endpoints to talk to.
    pub endpoints: GoogleEndpoints,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self::new("credentials.json", "token.json")
    }
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default consent callback timeout in seconds.
    pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;

    /// Read-only free/busy scope.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.freebusy";

    /// Creates a configuration for the given credentials and token paths.
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            consent_timeout: Duration::from_secs(Self::DEFAULT_CONSENT_TIMEOUT_SECS),
            loopback_port_range: (8080, 8090),
            user_agent: format!("freebusy/{}", env!("CARGO_PKG_VERSION")),
            endpoints: GoogleEndpoints::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the consent callback timeout.
    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Sets the loopback port range for OAuth.
    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the endpoints.
    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Loads the application credentials from `credentials_path`.
    pub async fn load_credentials(&self) -> GoogleResult<OAuthCredentials> {
        let credentials = OAuthCredentials::from_file(&self.credentials_path).await?;
        credentials
            .validate()
            .map_err(|e| GoogleError::configuration(format!("invalid credentials: {}", e)))?;
        Ok(credentials)
    }

    /// Builds the shared HTTP client, bounded by `timeout`.
    pub fn http_client(&self) -> GoogleResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| {
                GoogleError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> GoogleResult<()> {
        if self.scopes.is_empty() {
            return Err(GoogleError::configuration(
                "at least one OAuth scope is required",
            ));
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(GoogleError::configuration("invalid loopback port range"));
        }
        if self.timeout.is_zero() {
            return Err(GoogleError::configuration("timeout must be non-zero"));
        }
        Ok(())
    }
}
