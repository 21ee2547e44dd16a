use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Anything that can hand out the bearer token for the current session.
pub trait TokenSource: Send + Sync {
    /// `None` when nobody is signed in or the credential has expired.
    fn current_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub email: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn { user_id: String, email: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredential,
    #[error("network failure: {0}")]
    Network(String),
    #[error("identity provider error (status={status:?}): {message}")]
    ServerError {
        status: Option<u16>,
        message: String,
    },
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::ServerError {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

/// Email/password identity provider.
#[async_trait]
pub trait Authenticator: TokenSource {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, AuthError>;

    async fn sign_out(&self);

    /// Credential-state changes. The receiver starts at the current state.
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    fn state(&self) -> AuthState {
        self.subscribe().borrow().clone()
    }
}

/// Holds the active credential and fans out state changes.
struct CredentialCell {
    credential: RwLock<Option<Credential>>,
    state: watch::Sender<AuthState>,
}

impl CredentialCell {
    fn new() -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            credential: RwLock::new(None),
            state,
        }
    }

    fn store(&self, credential: Credential) {
        let next = AuthState::SignedIn {
            user_id: credential.user_id.clone(),
            email: credential.email.clone(),
        };
        *self.credential.write() = Some(credential);
        self.state.send_replace(next);
    }

    fn clear(&self) {
        *self.credential.write() = None;
        self.state.send_replace(AuthState::SignedOut);
    }

    fn token(&self) -> Option<String> {
        let guard = self.credential.read();
        let credential = guard.as_ref()?;
        if credential.is_expired_at(Utc::now()) {
            debug!(target: "storefront.auth", user_id = %credential.user_id, "credential expired");
            return None;
        }
        Some(credential.token.clone())
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Identity-toolkit style password sign-in over HTTP.
pub struct PasswordAuthClient {
    http: Client,
    sign_in_url: String,
    api_key: String,
    cell: CredentialCell,
}

impl PasswordAuthClient {
    pub fn new(sign_in_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_http(Client::new(), sign_in_url, api_key)
    }

    pub fn with_http(http: Client, sign_in_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            sign_in_url: sign_in_url.into(),
            api_key: api_key.into(),
            cell: CredentialCell::new(),
        }
    }
}

impl TokenSource for PasswordAuthClient {
    fn current_token(&self) -> Option<String> {
        self.cell.token()
    }
}

#[async_trait]
impl Authenticator for PasswordAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let res = self
            .http
            .post(&self.sign_in_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            let body = res.text().await.unwrap_or_default();
            warn!(target: "storefront.auth", %status, body = %body, "sign-in rejected");
            return Err(AuthError::InvalidCredential);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AuthError::ServerError {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let body: SignInResponse = res.json().await?;
        let expires_at = body
            .expires_in
            .as_deref()
            .and_then(|secs| secs.parse::<i64>().ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));
        let credential = Credential {
            user_id: body.local_id,
            email: body.email.unwrap_or_else(|| email.to_string()),
            token: body.id_token,
            expires_at,
        };
        info!(target: "storefront.auth", user_id = %credential.user_id, "signed in");
        self.cell.store(credential.clone());
        Ok(credential)
    }

    async fn sign_out(&self) {
        self.cell.clear();
        info!(target: "storefront.auth", "signed out");
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.cell.subscribe()
    }
}

/// In-memory identity provider for tests and offline wiring.
pub struct InMemoryAuthenticator {
    users: RwLock<HashMap<String, String>>,
    token_ttl: Duration,
    cell: CredentialCell,
}

impl Default for InMemoryAuthenticator {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            token_ttl: Duration::hours(1),
            cell: CredentialCell::new(),
        }
    }
}

impl InMemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.write().insert(email.into(), password.into());
        self
    }

    /// Marks `email` as signed in without going through `sign_in`.
    pub fn signed_in_as(self, email: impl Into<String>) -> Self {
        let email = email.into();
        let credential = self.mint(&email);
        self.cell.store(credential);
        self
    }

    /// Forces the active credential past its expiry.
    pub fn expire(&self) {
        if let Some(credential) = self.cell.credential.write().as_mut() {
            credential.expires_at = Some(Utc::now() - Duration::seconds(1));
        }
    }

    fn mint(&self, email: &str) -> Credential {
        Credential {
            user_id: format!("uid-{email}"),
            email: email.to_string(),
            token: format!("token-{}", uuid::Uuid::new_v4()),
            expires_at: Some(Utc::now() + self.token_ttl),
        }
    }
}

impl TokenSource for InMemoryAuthenticator {
    fn current_token(&self) -> Option<String> {
        self.cell.token()
    }
}

#[async_trait]
impl Authenticator for InMemoryAuthenticator {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let known = self
            .users
            .read()
            .get(email)
            .is_some_and(|stored| stored == password);
        if !known {
            return Err(AuthError::InvalidCredential);
        }
        let credential = self.mint(email);
        self.cell.store(credential.clone());
        Ok(credential)
    }

    async fn sign_out(&self) {
        self.cell.clear();
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.cell.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_publishes_state_and_token() {
        let auth = InMemoryAuthenticator::new().with_user("admin@shop.test", "hunter2");
        let mut states = auth.subscribe();
        assert_eq!(*states.borrow(), AuthState::SignedOut);
        assert!(auth.current_token().is_none());

        let credential = auth
            .sign_in("admin@shop.test", "hunter2")
            .await
            .expect("sign in");
        states.changed().await.expect("state change");
        assert!(matches!(&*states.borrow(), AuthState::SignedIn { email, .. } if email == "admin@shop.test"));
        assert_eq!(auth.current_token(), Some(credential.token));

        auth.sign_out().await;
        assert_eq!(auth.state(), AuthState::SignedOut);
        assert!(auth.current_token().is_none());
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credential() {
        let auth = InMemoryAuthenticator::new().with_user("admin@shop.test", "hunter2");
        let err = auth.sign_in("admin@shop.test", "nope").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredential);
        assert_eq!(auth.state(), AuthState::SignedOut);
    }

    #[test]
    fn expired_credentials_yield_no_token() {
        let auth = InMemoryAuthenticator::new().signed_in_as("admin@shop.test");
        assert!(auth.current_token().is_some());
        auth.expire();
        assert!(auth.current_token().is_none());
    }
}
