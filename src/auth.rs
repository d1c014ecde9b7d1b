//! OAuth2 authentication management for Gmail API

use chrono::{Duration as ChronoDuration, Utc};
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use yup_oauth2::ApplicationSecret;

use crate::cache::TokenCache;
use crate::callback::CallbackListener;
use crate::error::{GmailError, Result};
use crate::models::OAuthToken;

/// Gmail API scopes required for label listing and filter management
///
/// These scopes provide:
/// - gmail.labels: Label listing
/// - gmail.settings.basic: Filter listing, creation and deletion
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.settings.basic",
];

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const CLIENT_ID_VAR: &str = "GMAIL_FILTERS_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "GMAIL_FILTERS_CLIENT_SECRET";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Options controlling how a user gets authenticated
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// Google "installed app" credentials file; falls back to the environment
    pub credentials_path: Option<std::path::PathBuf>,
    /// Bound on the wait for the browser redirect; `None` waits forever
    pub callback_timeout: Option<Duration>,
}

/// Resolve the OAuth client credentials.
///
/// Order: credentials file, `GMAIL_FILTERS_CLIENT_ID`/`GMAIL_FILTERS_CLIENT_SECRET`
/// at runtime, then the same variables captured at build time.
pub async fn load_client_secret(credentials_path: Option<&Path>) -> Result<ApplicationSecret> {
    if let Some(path) = credentials_path {
        let secret = yup_oauth2::read_application_secret(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read credentials {:?}: {}", path, e)))?;
        debug!("Loaded OAuth client credentials from {:?}", path);
        return Ok(secret);
    }

    load_credentials_from_env()
}

/// Load OAuth2 client credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_FILTERS_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_FILTERS_CLIENT_SECRET`: OAuth2 client secret
///
/// Either may also be baked in at build time under the same name.
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env_or_baked(CLIENT_ID_VAR, option_env!("GMAIL_FILTERS_CLIENT_ID"))
        .ok_or_else(|| {
            GmailError::ConfigError(format!(
                "{} not set (or pass --credentials <file>)",
                CLIENT_ID_VAR
            ))
        })?;
    let client_secret = env_or_baked(CLIENT_SECRET_VAR, option_env!("GMAIL_FILTERS_CLIENT_SECRET"))
        .ok_or_else(|| GmailError::ConfigError(format!("{} not set", CLIENT_SECRET_VAR)))?;

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: DEFAULT_AUTH_URI.to_string(),
        token_uri: DEFAULT_TOKEN_URI.to_string(),
        ..Default::default()
    })
}

/// Runtime value of `var`, else the value captured at build time; empty counts as unset
fn env_or_baked(var: &str, baked: Option<&str>) -> Option<String> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| baked.map(str::to_string))
        .filter(|v| !v.is_empty())
}

/// Build the URL the user opens to grant access
pub fn authorization_url(
    secret: &ApplicationSecret,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
) -> Result<String> {
    let url = Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("access_type", "offline"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scopes.join(" ").as_str()),
            ("state", state),
        ],
    )
    .map_err(|e| GmailError::ConfigError(format!("Invalid auth_uri {:?}: {}", secret.auth_uri, e)))?;
    Ok(url.into())
}

/// Raw JSON shape returned by the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

impl From<TokenResponse> for OAuthToken {
    fn from(raw: TokenResponse) -> Self {
        OAuthToken {
            access_token: raw.access_token,
            token_type: raw.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: raw.refresh_token,
            expiry: raw
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Client for the provider's token endpoint
pub struct TokenEndpoint {
    http: reqwest::Client,
    secret: ApplicationSecret,
}

impl TokenEndpoint {
    pub fn new(secret: ApplicationSecret) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret,
        }
    }

    /// Exchange an authorization code for a token. Attempted once.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
        ];
        self.request_token("Token exchange", &params).await
    }

    /// Trade a refresh token for a new access token. Attempted once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
        ];
        let mut token = self.request_token("Token refresh", &params).await?;
        // Google omits the refresh token on refresh responses
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn request_token(&self, what: &str, params: &[(&str, &str)]) -> Result<OAuthToken> {
        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| GmailError::AuthError(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::AuthError(format!(
                "{} failed ({}): {}",
                what,
                status,
                body.trim()
            )));
        }

        let raw: TokenResponse = response
            .json()
            .await
            .map_err(|e| GmailError::AuthError(format!("{} returned malformed JSON: {}", what, e)))?;
        Ok(raw.into())
    }
}

/// Interactive authorization-code flow over a loopback redirect
pub struct AuthorizationFlow {
    secret: ApplicationSecret,
    scopes: Vec<String>,
    callback_timeout: Option<Duration>,
}

impl AuthorizationFlow {
    pub fn new(secret: ApplicationSecret, callback_timeout: Option<Duration>) -> Self {
        Self {
            secret,
            scopes: REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect(),
            callback_timeout,
        }
    }

    /// Run the flow, printing the authorization URL through `prompt`.
    ///
    /// The callback listener is closed before the code is exchanged, on every
    /// path.
    pub async fn run_with_prompt<P>(&self, prompt: P) -> Result<OAuthToken>
    where
        P: FnOnce(&str),
    {
        let state = format!("st{}", uuid::Uuid::new_v4().simple());
        let listener = CallbackListener::bind(state.clone()).await?;
        let redirect_uri = listener.redirect_uri();

        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let url = authorization_url(&self.secret, &redirect_uri, &scopes, &state)?;
        prompt(&url);

        let code = listener.wait_for_code(self.callback_timeout).await?;
        debug!("Exchanging authorization code");

        TokenEndpoint::new(self.secret.clone())
            .exchange_code(&code, &redirect_uri)
            .await
    }

    /// Run the flow, printing the authorization URL to stdout
    pub async fn run(&self) -> Result<OAuthToken> {
        self.run_with_prompt(|url| {
            println!("Authorize this app at: {}", url);
        })
        .await
    }
}

/// Return a usable token for `user`, refreshing or authorizing as needed.
///
/// The cache is written back whenever a new token was obtained; a failed
/// write does not fail authentication.
pub async fn obtain_token(
    cache: &mut TokenCache,
    user: &str,
    secret: &ApplicationSecret,
    callback_timeout: Option<Duration>,
) -> Result<OAuthToken> {
    if let Some(cached) = cache.get(user) {
        if !cached.is_expired() {
            info!("Using cached token from {:?}", cache.path());
            return Ok(cached.clone());
        }

        if let Some(refresh_token) = cached.refresh_token.clone() {
            info!("Cached token for {} expired, refreshing", user);
            match TokenEndpoint::new(secret.clone()).refresh(&refresh_token).await {
                Ok(token) => {
                    cache.insert(user, token.clone());
                    cache.persist().await;
                    return Ok(token);
                }
                Err(e) => warn!("Token refresh failed, re-authorizing: {}", e),
            }
        }
    }

    let token = AuthorizationFlow::new(secret.clone(), callback_timeout)
        .run()
        .await?;
    cache.insert(user, token.clone());
    cache.persist().await;
    Ok(token)
}

/// Authenticate `user` and initialize the Gmail API hub
///
/// Sets up:
/// - the token from the local cache, or the interactive flow on first use
/// - HTTP/1 client with TLS support
pub async fn authenticate(user: &str, options: &AuthOptions) -> Result<GmailHub> {
    let secret = load_client_secret(options.credentials_path.as_deref()).await?;
    let mut cache = TokenCache::open_default().await?;
    let token = obtain_token(&mut cache, user, &secret, options.callback_timeout).await?;
    build_hub(token)
}

/// Build the Gmail hub authorized with `token`
pub fn build_hub(token: OAuthToken) -> Result<GmailHub> {
    // Use HTTP/1 for compatibility (HTTP/2 is default but HTTP/1 works better with google-gmail1)
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, token.access_token))
}
