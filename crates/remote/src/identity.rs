use std::env;

use chrono::Utc;
use cipherstudio_settings::{AuthProvider, AuthStore, AuthStoreError, AuthUser};
use cipherstudio_storage::Storage;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const PLACEHOLDER_CLIENT_ID: &str = "your-google-client-id";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/google/callback";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "http://localhost:3000/api/auth/google/token";

const SCOPE: &str = "openid email profile";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(EMAIL_PATTERN));
const STATE_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0}")]
    NotConfigured(String),
    #[error("Authentication was cancelled or failed")]
    Cancelled,
    #[error("Invalid authentication response")]
    InvalidResponse,
    #[error("Invalid state parameter")]
    InvalidState,
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Store(#[from] AuthStoreError),
    #[error("email pattern failed to compile: {0}")]
    Pattern(regex::Error),
}

/// Client settings for the Google sign-in flow.
/// Google 登入流程的用戶端設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub token_endpoint: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: PLACEHOLDER_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
        }
    }
}

impl OAuthConfig {
    /// Reads `CIPHERSTUDIO_GOOGLE_CLIENT_ID`, `CIPHERSTUDIO_GOOGLE_REDIRECT_URI`
    /// and `CIPHERSTUDIO_TOKEN_ENDPOINT`, keeping defaults for unset values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: String| {
            env::var(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(fallback)
        };
        Self {
            client_id: read("CIPHERSTUDIO_GOOGLE_CLIENT_ID", defaults.client_id),
            redirect_uri: read("CIPHERSTUDIO_GOOGLE_REDIRECT_URI", defaults.redirect_uri),
            token_endpoint: read("CIPHERSTUDIO_TOKEN_ENDPOINT", defaults.token_endpoint),
        }
    }

    /// Checks that a real client id is present and looks like one.
    pub fn check(&self) -> Result<(), IdentityError> {
        let client_id = self.client_id.trim();
        if client_id.is_empty() || client_id == PLACEHOLDER_CLIENT_ID {
            return Err(IdentityError::NotConfigured(
                "Google OAuth is not configured. Please set CIPHERSTUDIO_GOOGLE_CLIENT_ID in your environment."
                    .to_string(),
            ));
        }
        if !client_id.contains('.') {
            return Err(IdentityError::NotConfigured(
                "Invalid Google OAuth Client ID format.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Profile returned by the provider's user-info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub verified_email: bool,
}

impl From<GoogleProfile> for AuthUser {
    fn from(profile: GoogleProfile) -> Self {
        AuthUser {
            id: profile.id,
            email: profile.email,
            name: profile.name,
            picture: profile.picture,
            provider: AuthProvider::Google,
            is_verified: profile.verified_email,
        }
    }
}

/// Code-for-credential exchange and profile lookup.
/// （授權碼換取憑證以及取得使用者資料。）
pub trait IdentityProvider {
    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, IdentityError>;
    fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, IdentityError>;
}

/// Blocking HTTP implementation against the token relay and Google.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: Client,
    token_endpoint: String,
    userinfo_endpoint: String,
}

impl GoogleProvider {
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            http: Client::new(),
            token_endpoint: config.token_endpoint.clone(),
            userinfo_endpoint: GOOGLE_USERINFO_ENDPOINT.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    message: Option<String>,
}

impl IdentityProvider for GoogleProvider {
    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .json(&json!({ "code": code, "redirect_uri": redirect_uri }))
            .send()?;
        let ok = response.status().is_success();
        let body: TokenResponse = response.json()?;
        match (ok, body.access_token) {
            (true, Some(token)) => Ok(token),
            _ => Err(IdentityError::Provider(
                body.message
                    .unwrap_or_else(|| "Failed to exchange code for tokens".to_string()),
            )),
        }
    }

    fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, IdentityError> {
        let response = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()?;
        if !response.status().is_success() {
            return Err(IdentityError::Provider(
                "Failed to get user information".to_string(),
            ));
        }
        Ok(response.json()?)
    }
}

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Parses the query of a full callback URL.
    pub fn from_url(callback: &str) -> Result<Self, IdentityError> {
        let url = Url::parse(callback)?;
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        Ok(params)
    }
}

/// Sign-in flows backed by the identity record.
/// 以身分紀錄為基礎的登入流程。
#[derive(Debug)]
pub struct IdentityService<P, S> {
    config: OAuthConfig,
    provider: P,
    store: AuthStore<S>,
}

impl<P: IdentityProvider, S: Storage> IdentityService<P, S> {
    pub fn new(config: OAuthConfig, provider: P, storage: S) -> Self {
        Self {
            config,
            provider,
            store: AuthStore::new(storage),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn store(&self) -> &AuthStore<S> {
        &self.store
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.store.current_user()
    }

    /// Builds the consent URL and remembers a fresh anti-forgery state.
    /// 產生授權網址並保存新的防偽 state。
    pub fn authorization_url(&mut self) -> Result<Url, IdentityError> {
        self.config.check()?;
        let state = generate_state();
        self.store.set_pending_state(&state)?;
        let url = Url::parse_with_params(
            GOOGLE_AUTH_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", SCOPE),
                ("response_type", "code"),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url)
    }

    /// Completes sign-in from the redirect's query parameters.
    /// 依回呼參數完成登入。
    pub fn handle_callback(&mut self, params: &CallbackParams) -> Result<AuthUser, IdentityError> {
        if params.error.is_some() {
            return Err(IdentityError::Cancelled);
        }
        let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
            return Err(IdentityError::InvalidResponse);
        };
        if self.store.pending_state().as_deref() != Some(state) {
            tracing::warn!("oauth state mismatch");
            return Err(IdentityError::InvalidState);
        }

        let token = self.provider.exchange_code(code, &self.config.redirect_uri)?;
        let user = AuthUser::from(self.provider.fetch_profile(&token)?);
        self.store.set_current_user(&user)?;
        self.store.clear_pending_state()?;
        Ok(user)
    }

    pub fn sign_in_with_email(&mut self, email: &str, password: &str) -> Result<AuthUser, IdentityError> {
        if email.is_empty() || password.is_empty() {
            return Err(invalid("Email and password are required"));
        }
        check_password(password)?;
        check_email(email)?;

        let name = email.split('@').next().unwrap_or(email);
        let user = email_user(email, name);
        self.store.set_current_user(&user)?;
        Ok(user)
    }

    pub fn sign_up_with_email(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthUser, IdentityError> {
        if email.is_empty() || password.is_empty() || name.is_empty() {
            return Err(invalid("All fields are required"));
        }
        check_password(password)?;
        if name.chars().count() < 2 {
            return Err(invalid("Name must be at least 2 characters"));
        }
        check_email(email)?;
        if self
            .store
            .registered_users()
            .iter()
            .any(|user| user.email == email)
        {
            return Err(invalid("User with this email already exists"));
        }

        let user = email_user(email, name);
        self.store.register(&user)?;
        self.store.set_current_user(&user)?;
        Ok(user)
    }

    pub fn sign_out(&mut self) -> Result<(), IdentityError> {
        self.store.sign_out()?;
        Ok(())
    }
}

fn invalid(message: &str) -> IdentityError {
    IdentityError::Validation(message.to_string())
}

fn check_password(password: &str) -> Result<(), IdentityError> {
    if password.chars().count() < 6 {
        return Err(invalid("Password must be at least 6 characters"));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), IdentityError> {
    let pattern = EMAIL.as_ref().map_err(|err| IdentityError::Pattern(err.clone()))?;
    if !pattern.is_match(email) {
        return Err(invalid("Please enter a valid email address"));
    }
    Ok(())
}

fn email_user(email: &str, name: &str) -> AuthUser {
    AuthUser {
        id: format!("email_{}", Utc::now().timestamp_millis()),
        email: email.to_string(),
        name: name.to_string(),
        picture: None,
        provider: AuthProvider::Email,
        is_verified: false,
    }
}

fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}
