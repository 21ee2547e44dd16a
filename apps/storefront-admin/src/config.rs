use std::time::Duration;

use dashboard_core::context::Theme;
use dashboard_core::debounce::DEFAULT_SEARCH_DEBOUNCE;
use serde::Deserialize;
use storefront_sdk::storage::PRODUCT_IMAGE_PREFIX;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_url")]
    pub storefront_api_url: String,
    #[serde(default = "default_auth_url")]
    pub storefront_auth_url: String,
    #[serde(default)]
    pub storefront_api_key: Option<String>,
    #[serde(default = "default_storage_url")]
    pub storefront_storage_url: String,
    #[serde(default = "default_image_prefix")]
    pub storefront_image_prefix: String,
    /// Serve everything from in-memory collaborators instead of the remote stores.
    #[serde(default)]
    pub storefront_offline: bool,
    #[serde(default = "default_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default)]
    pub storefront_theme: Option<String>,
    #[serde(default = "default_log_filter")]
    pub rust_log: String,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            storefront_api_url: default_api_url(),
            storefront_auth_url: default_auth_url(),
            storefront_api_key: None,
            storefront_storage_url: default_storage_url(),
            storefront_image_prefix: default_image_prefix(),
            storefront_offline: false,
            search_debounce_ms: default_debounce_ms(),
            storefront_theme: None,
            rust_log: default_log_filter(),
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment. Keys are the
    /// upper-cased field names, e.g. `STOREFRONT_API_URL`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map(AppConfig::normalize)
            .unwrap_or_else(|_| AppConfig::default().normalize())
    }

    fn normalize(mut self) -> Self {
        self.storefront_api_url = Self::normalize_url(&self.storefront_api_url, default_api_url);
        self.storefront_auth_url = Self::normalize_url(&self.storefront_auth_url, default_auth_url);
        self.storefront_storage_url =
            Self::normalize_url(&self.storefront_storage_url, default_storage_url);
        self.storefront_image_prefix = self.storefront_image_prefix.trim().trim_matches('/').to_string();
        if self.storefront_image_prefix.is_empty() {
            self.storefront_image_prefix = default_image_prefix();
        }
        self.storefront_api_key = Self::normalize_opt(self.storefront_api_key.take());
        self.storefront_theme = Self::normalize_opt(self.storefront_theme.take());
        self.admin_email = Self::normalize_opt(self.admin_email.take());
        self.admin_password = Self::normalize_opt(self.admin_password.take());
        if self.search_debounce_ms == 0 {
            self.search_debounce_ms = default_debounce_ms();
        }
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn normalize_url(value: &str, fallback: fn() -> String) -> String {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            fallback()
        } else {
            trimmed.to_string()
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Configured initial theme; unknown names fall back to light.
    pub fn theme(&self) -> Theme {
        self.storefront_theme
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or_default()
    }

    /// Credentials for an unattended sign-in at boot, when both are set.
    pub fn boot_credentials(&self) -> Option<(&str, &str)> {
        Some((self.admin_email.as_deref()?, self.admin_password.as_deref()?))
    }
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_auth_url() -> String {
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword".to_string()
}

fn default_storage_url() -> String {
    "https://firebasestorage.googleapis.com/v0/b/storefront-admin.appspot.com".to_string()
}

fn default_image_prefix() -> String {
    PRODUCT_IMAGE_PREFIX.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE.as_millis() as u64
}

/// Directives used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info,storefront_admin=debug,dashboard=debug";

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
