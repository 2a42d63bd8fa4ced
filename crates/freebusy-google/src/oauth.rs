//! OAuth 2.0 token endpoint client and the loopback PKCE consent flow.
//!
//! # Consent flow
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a local HTTP listener on the first free port in the range
//! 3. Open the user's browser on Google's consent page
//! 4. Google redirects to `http://127.0.0.1:{port}/callback?code=...&state=...`
//! 5. Exchange the code (with the verifier) for access and refresh tokens
//!
//! The consent page is requested with `access_type=offline` and
//! `prompt=consent` so Google always returns a refresh token.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::authorizer::{BoxFuture, ConsentFlow};
use crate::config::{GoogleEndpoints, OAuthCredentials};
use crate::error::{GoogleError, GoogleResult};
use crate::store::TokenInfo;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long a loopback connection may take to send its request line.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for Google's OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
    endpoints: GoogleEndpoints,
}

impl OAuthClient {
    /// Creates a client for the given application credentials.
    pub fn new(
        credentials: OAuthCredentials,
        http_client: reqwest::Client,
        endpoints: GoogleEndpoints,
    ) -> Self {
        Self {
            credentials,
            http_client,
            endpoints,
        }
    }

    /// Returns the application credentials.
    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    /// Returns the endpoints this client talks to.
    pub fn endpoints(&self) -> &GoogleEndpoints {
        &self.endpoints
    }

    /// Mints a new access token from a refresh token.
    ///
    /// Returns the access token and its lifetime in seconds.
    pub async fn refresh_token(&self, refresh_token: &str) -> GoogleResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token_response = self.post_token_form(&params, "token refresh").await?;
        debug!("refreshed access token");
        Ok((token_response.access_token, token_response.expires_in))
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> GoogleResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let token_response = self.post_token_form(&params, "token exchange").await?;
        info!("obtained tokens from authorization code");

        Ok(TokenInfo::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        ))
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> GoogleResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| GoogleError::network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(GoogleError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| GoogleError::invalid_response(format!("invalid token response: {}", e)))
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent page URL.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Interactive consent through the user's browser and a loopback redirect.
#[derive(Debug, Clone)]
pub struct LoopbackConsent {
    port_range: (u16, u16),
    timeout: Duration,
}

impl LoopbackConsent {
    /// Creates a consent flow listening on `port_range`, waiting at most `timeout`.
    pub fn new(port_range: (u16, u16), timeout: Duration) -> Self {
        Self {
            port_range,
            timeout,
        }
    }

    async fn authorize(&self, oauth: &OAuthClient, scopes: &[String]) -> GoogleResult<TokenInfo> {
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback_server(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(
            &oauth.endpoints().auth_url,
            &oauth.credentials().client_id,
            &redirect_uri,
            scopes,
        );

        info!("starting OAuth consent, open this URL if no browser appears: {}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            warn!("failed to open browser: {}", e);
        }

        let (code, received_state) = wait_for_callback(listener, self.timeout).await?;

        if received_state != pkce.state {
            return Err(GoogleError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        oauth
            .exchange_code(&code, &pkce.verifier, &redirect_uri)
            .await
    }
}

impl ConsentFlow for LoopbackConsent {
    fn run<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        scopes: &'a [String],
    ) -> BoxFuture<'a, GoogleResult<TokenInfo>> {
        Box::pin(self.authorize(oauth, scopes))
    }
}

/// Binds a listener on the first available port in the range.
async fn bind_loopback_server(port_range: (u16, u16)) -> GoogleResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
            debug!("bound loopback server on port {}", port);
            return Ok((listener, port));
        }
    }
    Err(GoogleError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Waits until the browser hits `/callback` or the timeout elapses.
///
/// Each connection is served on its own task so an idle socket cannot hold
/// up the callback. The listener and any pending connections are dropped
/// when this returns.
async fn wait_for_callback(
    listener: TcpListener,
    timeout: Duration,
) -> GoogleResult<(String, String)> {
    let mut connections = JoinSet::new();

    let wait = async {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        connections.spawn(handle_callback(stream));
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                },
                Some(joined) = connections.join_next() => {
                    if let Ok(Some(result)) = joined {
                        return result;
                    }
                }
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(GoogleError::authentication("OAuth callback timeout")),
    }
}

/// Handles one connection on the loopback server.
///
/// Returns `None` for requests that are not the OAuth callback (favicon etc.)
/// and for connections that send nothing within [`REQUEST_READ_TIMEOUT`].
async fn handle_callback(mut stream: TcpStream) -> Option<GoogleResult<(String, String)>> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut request_line))
            .await
            .ok()?
            .ok()?;
    }

    let result = parse_callback_request(&request_line)?;

    let response = if result.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
        <html><body><h1>Authorization Successful</h1>\
        <p>You can close this window and return to the application.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
        <html><body><h1>Authorization Failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;

    Some(result)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback_request(request_line: &str) -> Option<GoogleResult<(String, String)>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let path = parts.next()?;
    if !path.starts_with("/callback") {
        return None;
    }

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            let value = urlencoding::decode(value).unwrap_or_default().into_owned();
            match key {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                _ => {}
            }
        }
    }

    if let Some(error) = error {
        return Some(Err(GoogleError::authentication(format!(
            "authorization denied: {}",
            error
        ))));
    }

    Some(match code {
        Some(code) => Ok((code, state.unwrap_or_default())),
        None => Err(GoogleError::authentication(
            "missing authorization code in callback",
        )),
    })
}
