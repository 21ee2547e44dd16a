use storefront_sdk::{AuthError, GatewayError};
use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} is not in the current list")]
    UnknownRecord { kind: &'static str, id: String },
    #[error("{kind} {id} already has a change in flight")]
    MutationInFlight { kind: &'static str, id: String },
}

impl ControllerError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ControllerError::Gateway(GatewayError::Unauthorized))
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
