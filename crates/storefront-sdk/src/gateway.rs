use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::Record;

/// Opaque continuation token handed out by a paginated query.
///
/// A cursor is only meaningful to the gateway that issued it, for the search
/// term it was issued under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a collection query. An absent cursor marks the end of the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub cursor: Option<Cursor>,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>, cursor: Option<Cursor>) -> Self {
        Self { records, cursor }
    }

    /// Final page of a collection.
    pub fn last(records: Vec<R>) -> Self {
        Self {
            records,
            cursor: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("not signed in or credential expired")]
    Unauthorized,
    #[error("network failure: {0}")]
    Network(String),
    #[error("server error (status={status:?}): {message}")]
    ServerError {
        status: Option<u16>,
        message: String,
    },
    #[error("record {0} not found")]
    NotFound(String),
}

impl GatewayError {
    pub fn server(message: impl Into<String>) -> Self {
        GatewayError::ServerError {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_status() {
            GatewayError::ServerError {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Authenticated access to one remote collection.
///
/// `update_record` and `delete_record` have no ordering relationship with
/// in-flight `fetch_page` calls; callers reconcile by record id.
#[async_trait]
pub trait CollectionGateway<R: Record>: Send + Sync {
    /// Fetches the page after `cursor` (or the first page) for `search_term`.
    /// `cursor` must come from this gateway for the same search term.
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        search_term: &str,
    ) -> Result<Page<R>, GatewayError>;

    async fn fetch_record(&self, id: &str) -> Result<R, GatewayError>;

    async fn create_record(&self, data: &R::Draft) -> Result<R, GatewayError>;

    /// Returns the persisted record when the store echoes it back.
    async fn update_record(&self, id: &str, data: &R::Draft) -> Result<Option<R>, GatewayError>;

    async fn delete_record(&self, id: &str) -> Result<(), GatewayError>;
}

pub type GatewayHandle<R> = Arc<dyn CollectionGateway<R>>;
