//! Authorization: reuse the stored token or run interactive consent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GoogleConfig;
use crate::error::{GoogleError, GoogleResult};
use crate::oauth::{LoopbackConsent, OAuthClient};
use crate::store::{AuthorizedUser, CredentialStore, TokenInfo};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Obtains tokens from the user interactively.
///
/// The production implementation is [`LoopbackConsent`]; tests substitute
/// a scripted flow.
pub trait ConsentFlow: Send + Sync {
    /// Runs consent for the application in `oauth`, requesting `scopes`.
    fn run<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        scopes: &'a [String],
    ) -> BoxFuture<'a, GoogleResult<TokenInfo>>;
}

/// A client authorized to call the Calendar API on the user's behalf.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    oauth: OAuthClient,
    tokens: TokenInfo,
}

impl AuthorizedClient {
    /// Creates a client from an OAuth client and the tokens it holds.
    pub fn new(oauth: OAuthClient, tokens: TokenInfo) -> Self {
        Self { oauth, tokens }
    }

    /// Rebuilds a client from a stored authorized-user record.
    pub fn from_stored(
        record: &AuthorizedUser,
        http_client: reqwest::Client,
        config: &GoogleConfig,
    ) -> Self {
        let oauth = OAuthClient::new(record.credentials(), http_client, config.endpoints.clone());
        Self::new(oauth, TokenInfo::from_refresh_token(&record.refresh_token))
    }

    /// Returns the refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns the tokens held by this client.
    pub fn tokens(&self) -> &TokenInfo {
        &self.tokens
    }

    /// Returns a bearer token, minting one from the refresh token if needed.
    ///
    /// Expiry of the stored refresh token is not checked up front; a revoked
    /// token surfaces here as an authentication error.
    pub async fn access_token(&self) -> GoogleResult<String> {
        if let Some(token) = self.tokens.usable_access_token() {
            return Ok(token.to_string());
        }

        let refresh_token = self.refresh_token().ok_or_else(|| {
            GoogleError::authentication("no refresh token - re-authorization required")
        })?;

        let (access_token, _expires_in) = self.oauth.refresh_token(refresh_token).await?;
        Ok(access_token)
    }
}

/// Produces [`AuthorizedClient`]s, from the stored token when possible.
pub struct Authorizer {
    config: GoogleConfig,
    store: CredentialStore,
    http_client: reqwest::Client,
    consent: Arc<dyn ConsentFlow>,
    consent_lock: Mutex<()>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("token_path", &self.store.token_path())
            .field("credentials_path", &self.config.credentials_path)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Creates an authorizer that runs browser consent on the loopback interface.
    pub fn new(config: GoogleConfig) -> GoogleResult<Self> {
        let consent = LoopbackConsent::new(config.loopback_port_range, config.consent_timeout);
        Self::with_consent(config, Arc::new(consent))
    }

    /// Creates an authorizer with a custom consent flow.
    pub fn with_consent(config: GoogleConfig, consent: Arc<dyn ConsentFlow>) -> GoogleResult<Self> {
        config.validate()?;
        let http_client = config.http_client()?;
        Ok(Self {
            store: CredentialStore::from_config(&config),
            config,
            http_client,
            consent,
            consent_lock: Mutex::new(()),
        })
    }

    /// Returns the credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns an authorized client.
    ///
    /// A usable stored token is returned as-is. Otherwise consent runs with
    /// the application credentials and, if it yields a refresh token, the
    /// result is persisted. Concurrent callers share one consent flow.
    pub async fn authorize(&self) -> GoogleResult<AuthorizedClient> {
        if let Some(client) = self.load_stored().await {
            return Ok(client);
        }

        let _guard = self.consent_lock.lock().await;

        // Another request may have finished consent while we waited.
        if let Some(client) = self.load_stored().await {
            return Ok(client);
        }

        let credentials = self.config.load_credentials().await?;
        let oauth = OAuthClient::new(
            credentials,
            self.http_client.clone(),
            self.config.endpoints.clone(),
        );

        info!("no usable stored token, starting interactive consent");
        let tokens = self.consent.run(&oauth, &self.config.scopes).await?;
        let client = AuthorizedClient::new(oauth, tokens);

        if client.refresh_token().is_some() {
            self.store.save(&client).await?;
        } else {
            warn!("consent returned no refresh token; token not persisted");
        }

        info!("authorization complete");
        Ok(client)
    }

    async fn load_stored(&self) -> Option<AuthorizedClient> {
        let record = self.store.load().await?;
        debug!("using stored token for client {}", record.client_id);
        Some(AuthorizedClient::from_stored(
            &record,
            self.http_client.clone(),
            &self.config,
        ))
    }
}
