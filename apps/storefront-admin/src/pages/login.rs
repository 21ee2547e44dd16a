use std::sync::Arc;

use dashboard_core::validation::LoginForm;
use dashboard_core::{ControllerError, ControllerResult};
use notice_bus::{Notice, NoticeSink};
use storefront_sdk::{AuthError, AuthState, Authenticator, Credential};
use tracing::info;

use crate::state::AppState;

pub const TOPIC: &str = "login";

pub struct LoginPage {
    auth: Arc<dyn Authenticator>,
    notices: Arc<dyn NoticeSink>,
}

impl LoginPage {
    pub fn mount(state: &AppState) -> Self {
        Self {
            auth: state.auth(),
            notices: state.notices(),
        }
    }

    /// Validates the form, then signs in. Invalid input never reaches the
    /// identity provider.
    pub async fn submit(&self, form: &LoginForm) -> ControllerResult<Credential> {
        let (email, password) = match form.validate() {
            Ok(fields) => fields,
            Err(err) => {
                self.notices.publish(TOPIC, Notice::error(err.to_string()));
                return Err(err.into());
            }
        };
        match self.auth.sign_in(&email, &password).await {
            Ok(credential) => {
                info!(user_id = %credential.user_id, "admin signed in");
                self.notices
                    .publish(TOPIC, Notice::success(format!("Welcome back, {}", credential.email)));
                Ok(credential)
            }
            Err(err) => {
                let message = match &err {
                    AuthError::InvalidCredential => "Wrong email or password".to_string(),
                    other => other.to_string(),
                };
                self.notices.publish(TOPIC, Notice::error(message));
                Err(ControllerError::Auth(err))
            }
        }
    }

    pub async fn sign_out(&self) {
        self.auth.sign_out().await;
    }

    /// Whether protected pages may be shown.
    pub fn is_signed_in(&self) -> bool {
        matches!(self.auth.state(), AuthState::SignedIn { .. }) && self.auth.current_token().is_some()
    }
}
