use anyhow::Context;
use dashboard_core::validation::LoginForm;
use storefront_admin::config::AppConfig;
use storefront_admin::pages::customers::CustomersPage;
use storefront_admin::pages::login::LoginPage;
use storefront_admin::pages::orders::OrdersPage;
use storefront_admin::pages::products::ProductsPage;
use storefront_admin::state::AppState;
use storefront_admin::telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    init_tracing(&cfg.rust_log);

    let state = AppState::from_config(&cfg);
    info!(
        api = %cfg.storefront_api_url,
        storage = %cfg.storefront_storage_url,
        offline = cfg.storefront_offline,
        debounce_ms = cfg.search_debounce_ms,
        theme = %state.theme().get(),
        "starting storefront-admin"
    );

    let Some((email, password)) = cfg.boot_credentials() else {
        warn!("ADMIN_EMAIL / ADMIN_PASSWORD not set; nothing to do without a session");
        return Ok(());
    };
    LoginPage::mount(&state)
        .submit(&LoginForm::new(email, password))
        .await
        .context("sign-in failed")?;

    let products = ProductsPage::mount(&state);
    products.load().await.context("loading products")?;
    let customers = CustomersPage::mount(&state);
    customers.load().await.context("loading customers")?;
    let orders = OrdersPage::mount(&state);
    orders.load().await.context("loading orders")?;

    for (name, count, more) in [
        ("products", products.view().records.len(), products.view().has_more),
        ("customers", customers.view().records.len(), customers.view().has_more),
        ("orders", orders.view().records.len(), orders.view().has_more),
    ] {
        info!(collection = name, loaded = count, has_more = more, "first page ready");
    }
    Ok(())
}
