use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::TokenSource;
use crate::gateway::GatewayError;

/// Folder that product images are uploaded under.
pub const PRODUCT_IMAGE_PREFIX: &str = "product_images";

/// An image selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the image under a fresh unique name and returns its public URL.
    async fn upload(&self, image: ImageUpload) -> Result<String, GatewayError>;

    /// Removes the object behind `url`. Deleting an absent object succeeds.
    async fn delete_by_url(&self, url: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

/// Object store speaking the `/o` media API (`uploadType=media` uploads,
/// `alt=media` download URLs).
pub struct HttpObjectStore {
    http: Client,
    base_url: String,
    prefix: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, prefix: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prefix: prefix.into().trim_matches('/').to_string(),
            tokens,
        }
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{}/o/{}",
            self.base_url,
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    }

    /// Recovers the object name from a download URL issued by this store.
    fn object_name(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&format!("{}/o/", self.base_url))?;
        let encoded = rest.split(['?', '#']).next().unwrap_or_default();
        if encoded.is_empty() {
            return None;
        }
        percent_decode_str(encoded)
            .decode_utf8()
            .ok()
            .map(|name| name.into_owned())
    }

    fn token(&self) -> Result<String, GatewayError> {
        self.tokens
            .current_token()
            .ok_or(GatewayError::Unauthorized)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, image: ImageUpload) -> Result<String, GatewayError> {
        let token = self.token()?;
        let name = format!("{}/{}", self.prefix, Uuid::new_v4());
        let res = self
            .http
            .post(format!("{}/o", self.base_url))
            .bearer_auth(&token)
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, image.content_type.as_str())
            .body(image.bytes)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
                _ => GatewayError::ServerError {
                    status: Some(status.as_u16()),
                    message: format!("image upload failed: {body}"),
                },
            });
        }

        let uploaded: UploadResponse = res.json().await?;
        let mut url = format!("{}?alt=media", self.object_url(&uploaded.name));
        if let Some(download) = uploaded.download_tokens.filter(|t| !t.is_empty()) {
            url.push_str("&token=");
            url.push_str(&download);
        }
        info!(target: "storefront.storage", object = %uploaded.name, file = %image.file_name, "uploaded image");
        Ok(url)
    }

    async fn delete_by_url(&self, url: &str) -> Result<(), GatewayError> {
        let Some(name) = self.object_name(url) else {
            warn!(target: "storefront.storage", %url, "url not served by this store; nothing to delete");
            return Ok(());
        };
        let token = self.token()?;
        let res = self
            .http
            .delete(self.object_url(&name))
            .bearer_auth(&token)
            .send()
            .await?;
        match res.status() {
            status if status.is_success() => {
                info!(target: "storefront.storage", object = %name, "deleted image");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(target: "storefront.storage", object = %name, "image already absent");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            status => Err(GatewayError::ServerError {
                status: Some(status.as_u16()),
                message: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// In-memory object store for tests and offline wiring.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_uploads: Mutex<Option<GatewayError>>,
}

impl InMemoryObjectStore {
    pub const URL_PREFIX: &'static str = "memory://objects/";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.objects.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Makes every upload fail with `error` until cleared with `None`.
    pub fn fail_uploads(&self, error: Option<GatewayError>) {
        *self.fail_uploads.lock() = error;
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, image: ImageUpload) -> Result<String, GatewayError> {
        if let Some(err) = self.fail_uploads.lock().clone() {
            return Err(err);
        }
        let url = format!("{}{}/{}", Self::URL_PREFIX, PRODUCT_IMAGE_PREFIX, Uuid::new_v4());
        self.objects.lock().insert(url.clone(), image.bytes);
        Ok(url)
    }

    async fn delete_by_url(&self, url: &str) -> Result<(), GatewayError> {
        self.objects.lock().remove(url);
        Ok(())
    }
}
