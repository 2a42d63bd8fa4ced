//! Token records and the on-disk credential store.
//!
//! The store holds a single `authorized_user` record:
//!
//! ```json
//! {"type": "authorized_user", "client_id": "...", "client_secret": "...", "refresh_token": "..."}
//! ```
//!
//! There is no locking around the file. Writes are atomic (temp file plus
//! rename) so readers never see a torn record, but two processes writing
//! at once still race and the last writer wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::authorizer::AuthorizedClient;
use crate::config::{GoogleConfig, OAuthCredentials};
use crate::error::{GoogleError, GoogleResult};

/// Value of the `type` field of a stored token.
pub const AUTHORIZED_USER: &str = "authorized_user";

/// Tokens minted by the OAuth token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenInfo {
    /// Short-lived bearer token, if one has been minted.
    pub access_token: Option<String>,

    /// Long-lived token used to mint new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token expires (already shifted 60 s early).
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    /// Creates token info from an OAuth token response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
        }
    }

    /// Token info holding only a refresh token, as loaded from disk.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Default::default()
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Returns the access token if one is present and still valid.
    pub fn usable_access_token(&self) -> Option<&str> {
        match self.access_token.as_deref() {
            Some(token) if !token.is_empty() && !self.is_expired() => Some(token),
            _ => None,
        }
    }
}

/// Subtracts a buffer so tokens are refreshed before their real expiry.
fn expiry_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs) - Duration::seconds(60)
}

/// The persisted authorized-user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    /// Always [`AUTHORIZED_USER`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Application client ID.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
    /// The user's refresh token.
    pub refresh_token: String,
}

impl AuthorizedUser {
    /// Builds a record from application credentials and a refresh token.
    pub fn new(credentials: &OAuthCredentials, refresh_token: impl Into<String>) -> Self {
        Self {
            kind: AUTHORIZED_USER.to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Returns the application credentials embedded in the record.
    pub fn credentials(&self) -> OAuthCredentials {
        OAuthCredentials::new(&self.client_id, &self.client_secret)
    }

    /// A record is usable if it can mint access tokens without consent.
    pub fn is_usable(&self) -> bool {
        self.kind == AUTHORIZED_USER
            && !self.refresh_token.is_empty()
            && !self.client_id.is_empty()
    }
}

/// File-backed store for the authorized-user record.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    token_path: PathBuf,
    credentials_path: PathBuf,
}

impl CredentialStore {
    /// Creates a store for the given token and application credentials paths.
    pub fn new(token_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            credentials_path: credentials_path.into(),
        }
    }

    /// Creates a store from the paths in a [`GoogleConfig`].
    pub fn from_config(config: &GoogleConfig) -> Self {
        Self::new(&config.token_path, &config.credentials_path)
    }

    /// Returns the token file path.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Loads the stored record.
    ///
    /// Missing, unreadable or malformed files, and records without a
    /// refresh token, all yield `None` so the caller can fall back to
    /// interactive consent.
    pub async fn load(&self) -> Option<AuthorizedUser> {
        let content = match fs::read_to_string(&self.token_path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("no stored token at {:?}: {}", self.token_path, e);
                return None;
            }
        };

        let record: AuthorizedUser = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("ignoring unparseable token file {:?}: {}", self.token_path, e);
                return None;
            }
        };

        if !record.is_usable() {
            warn!(
                "ignoring token file {:?}: not a usable authorized_user record",
                self.token_path
            );
            return None;
        }

        debug!("loaded stored token from {:?}", self.token_path);
        Some(record)
    }

    /// Persists the client's refresh token, overwriting any previous record.
    ///
    /// The application credentials are re-read from disk so the record always
    /// matches the current `credentials.json`.
    pub async fn save(&self, client: &AuthorizedClient) -> GoogleResult<()> {
        let refresh_token = client
            .refresh_token()
            .ok_or_else(|| GoogleError::internal("authorized client has no refresh token"))?;

        let credentials = OAuthCredentials::from_file(&self.credentials_path).await?;
        let record = AuthorizedUser::new(&credentials, refresh_token);
        self.write(&record).await?;

        info!("saved authorized-user token to {:?}", self.token_path);
        Ok(())
    }

    async fn write(&self, record: &AuthorizedUser) -> GoogleResult<()> {
        if let Some(parent) = self.token_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                GoogleError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let content = serde_json::to_string(record)
            .map_err(|e| GoogleError::internal(format!("failed to serialize token: {}", e)))?;

        let temp_path = self.token_path.with_extension("json.tmp");
        fs::write(&temp_path, content).await.map_err(|e| {
            GoogleError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await;
        }

        fs::rename(&temp_path, &self.token_path).await.map_err(|e| {
            GoogleError::configuration(format!("failed to replace token file: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::config::GoogleEndpoints;
    use crate::oauth::OAuthClient;

    const CREDENTIALS: &str =
        r#"{"installed": {"client_id": "id.apps.googleusercontent.com", "client_secret": "secret"}}"#;

    fn store_in(dir: &Path) -> CredentialStore {
        fs::write(dir.join("credentials.json"), CREDENTIALS).unwrap();
        CredentialStore::new(dir.join("token.json"), dir.join("credentials.json"))
    }

    fn client_with_refresh(refresh_token: Option<&str>) -> AuthorizedClient {
        let oauth = OAuthClient::new(
            OAuthCredentials::new("id.apps.googleusercontent.com", "secret"),
            reqwest::Client::new(),
            GoogleEndpoints::default(),
        );
        let tokens = TokenInfo::new(
            "access",
            refresh_token.map(String::from),
            Some(3600),
        );
        AuthorizedClient::new(oauth, tokens)
    }

    #[test]
    fn token_info_expiry() {
        let mut token = TokenInfo::new("access", None, Some(3600));
        assert!(!token.is_expired());
        assert_eq!(token.usable_access_token(), Some("access"));

        token.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(token.is_expired());
        assert!(token.usable_access_token().is_none());
    }

    #[test]
    fn refresh_only_token_has_no_access_token() {
        let token = TokenInfo::from_refresh_token("refresh");
        assert!(token.usable_access_token().is_none());
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn record_shape() {
        let record = AuthorizedUser::new(
            &OAuthCredentials::new("id.apps.googleusercontent.com", "secret"),
            "refresh-1",
        );
        insta::assert_json_snapshot!(record, @r#"
        {
          "type": "authorized_user",
          "client_id": "id.apps.googleusercontent.com",
          "client_secret": "secret",
          "refresh_token": "refresh-1"
        }
        "#);
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.token_path(), "{not json").unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn load_rejects_records_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.token_path(),
            r#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": ""}"#,
        )
        .unwrap();
        assert!(store.load().await.is_none());

        fs::write(
            store.token_path(),
            r#"{"type": "service_account", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        )
        .unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.save(&client_with_refresh(Some("refresh-1"))).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.client_id, "id.apps.googleusercontent.com");
        assert_eq!(loaded.client_secret, "secret");
        assert!(!dir.path().join("token.json.tmp").exists());
    }

    #[tokio::test]
    async fn save_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.save(&client_with_refresh(Some("first"))).await.unwrap();
        store.save(&client_with_refresh(Some("second"))).await.unwrap();

        assert_eq!(store.load().await.unwrap().refresh_token, "second");
    }

    #[tokio::test]
    async fn save_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let err = store.save(&client_with_refresh(None)).await.unwrap_err();
        assert_eq!(err.code(), crate::GoogleErrorCode::InternalError);
        assert!(!store.token_path().exists());
    }

    #[tokio::test]
    async fn save_without_credentials_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(
            dir.path().join("token.json"),
            dir.path().join("missing.json"),
        );

        let err = store.save(&client_with_refresh(Some("r"))).await.unwrap_err();
        assert_eq!(err.code(), crate::GoogleErrorCode::ConfigurationError);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_token_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&client_with_refresh(Some("r"))).await.unwrap();

        let mode = fs::metadata(store.token_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
