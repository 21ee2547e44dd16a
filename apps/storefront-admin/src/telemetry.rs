use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::DEFAULT_LOG_FILTER;

/// Parses `filter`, falling back to [`DEFAULT_LOG_FILTER`]. The rejected
/// directive string is returned so it can be reported once logging is up.
fn env_filter(filter: &str) -> (EnvFilter, Option<String>) {
    let filter = filter.trim();
    if filter.is_empty() {
        return (EnvFilter::new(DEFAULT_LOG_FILTER), None);
    }
    match EnvFilter::try_new(filter) {
        Ok(parsed) => (parsed, None),
        Err(_) => (EnvFilter::new(DEFAULT_LOG_FILTER), Some(filter.to_string())),
    }
}

/// Installs the global fmt subscriber. Targets stay visible so records from
/// `storefront.*`, `dashboard.*` and `notice.bus` can be told apart.
pub fn init_tracing(filter: &str) {
    let (env_filter, rejected) = env_filter(filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    if Registry::default().with(env_filter).with(fmt_layer).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    if let Some(rejected) = rejected {
        tracing::warn!(filter = %rejected, fallback = DEFAULT_LOG_FILTER, "invalid RUST_LOG; using defaults");
    }
}
