use std::sync::Arc;
use std::time::Duration;

use dashboard_core::context::{SidebarHandle, ThemeHandle};
use notice_bus::{LocalNoticeBus, NoticeSink};
use storefront_sdk::auth::{InMemoryAuthenticator, PasswordAuthClient};
use storefront_sdk::memory::InMemoryCollection;
use storefront_sdk::storage::{HttpObjectStore, InMemoryObjectStore, ObjectStore};
use storefront_sdk::{
    Authenticator, Customer, GatewayHandle, Order, Product, Record, StorefrontClient, TokenSource,
};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Builds the order-history gateway for one customer id.
pub type CustomerOrdersFactory = Arc<dyn Fn(&str) -> GatewayHandle<Order> + Send + Sync>;

const OFFLINE_PAGE_SIZE: usize = 10;

/// Everything a page needs, built once at start and handed to page
/// constructors explicitly.
#[derive(Clone)]
pub struct AppState {
    auth: Arc<dyn Authenticator>,
    products: GatewayHandle<Product>,
    customers: GatewayHandle<Customer>,
    orders: GatewayHandle<Order>,
    customer_orders: CustomerOrdersFactory,
    images: Arc<dyn ObjectStore>,
    notices: Arc<dyn NoticeSink>,
    theme: ThemeHandle,
    sidebar: SidebarHandle,
    search_debounce: Duration,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Arc<dyn Authenticator>,
        products: GatewayHandle<Product>,
        customers: GatewayHandle<Customer>,
        orders: GatewayHandle<Order>,
        customer_orders: CustomerOrdersFactory,
        images: Arc<dyn ObjectStore>,
        notices: Arc<dyn NoticeSink>,
        theme: ThemeHandle,
        search_debounce: Duration,
    ) -> Self {
        Self {
            auth,
            products,
            customers,
            orders,
            customer_orders,
            images,
            notices,
            theme,
            sidebar: SidebarHandle::new(true),
            search_debounce,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        if cfg.storefront_offline {
            info!(mode = "offline", "using in-memory collaborators");
            return Self::offline(cfg);
        }

        let api_key = cfg.storefront_api_key.clone().unwrap_or_else(|| {
            warn!("STOREFRONT_API_KEY is not set; sign-in will be rejected");
            String::new()
        });
        let auth = Arc::new(PasswordAuthClient::new(cfg.storefront_auth_url.clone(), api_key));
        let tokens: Arc<dyn TokenSource> = auth.clone();
        let client = StorefrontClient::new(cfg.storefront_api_url.clone(), tokens.clone());
        let images = HttpObjectStore::new(
            cfg.storefront_storage_url.clone(),
            cfg.storefront_image_prefix.clone(),
            tokens,
        );
        let history = client.clone();

        Self::new(
            auth,
            client.products(),
            client.customers(),
            client.orders(),
            Arc::new(move |user_id: &str| history.customer_orders(user_id)),
            Arc::new(images),
            Arc::new(LocalNoticeBus::new()),
            ThemeHandle::new(cfg.theme()),
            cfg.search_debounce(),
        )
    }

    /// In-memory wiring. Collections start empty; the boot credentials (if
    /// any) are the only accepted sign-in.
    fn offline(cfg: &AppConfig) -> Self {
        let mut auth = InMemoryAuthenticator::new();
        if let Some((email, password)) = cfg.boot_credentials() {
            auth = auth.with_user(email, password);
        }
        let auth = Arc::new(auth);
        let tokens: Arc<dyn TokenSource> = auth.clone();
        let orders = Arc::new(InMemoryCollection::<Order>::new(OFFLINE_PAGE_SIZE).require_auth(tokens.clone()));
        let history = orders.clone();

        Self::new(
            auth,
            offline_collection(&tokens),
            offline_collection(&tokens),
            orders,
            Arc::new(move |user_id: &str| -> GatewayHandle<Order> {
                let owned: Vec<Order> = history
                    .snapshot()
                    .into_iter()
                    .filter(|order| order.user_id == user_id)
                    .collect();
                Arc::new(InMemoryCollection::with_records(owned, OFFLINE_PAGE_SIZE))
            }),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(LocalNoticeBus::new()),
            ThemeHandle::new(cfg.theme()),
            cfg.search_debounce(),
        )
    }

    pub fn auth(&self) -> Arc<dyn Authenticator> {
        Arc::clone(&self.auth)
    }

    pub fn products(&self) -> GatewayHandle<Product> {
        Arc::clone(&self.products)
    }

    pub fn customers(&self) -> GatewayHandle<Customer> {
        Arc::clone(&self.customers)
    }

    pub fn orders(&self) -> GatewayHandle<Order> {
        Arc::clone(&self.orders)
    }

    pub fn customer_orders(&self, user_id: &str) -> GatewayHandle<Order> {
        (self.customer_orders)(user_id)
    }

    pub fn images(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.images)
    }

    pub fn notices(&self) -> Arc<dyn NoticeSink> {
        Arc::clone(&self.notices)
    }

    pub fn theme(&self) -> ThemeHandle {
        self.theme.clone()
    }

    pub fn sidebar(&self) -> SidebarHandle {
        self.sidebar.clone()
    }

    pub fn search_debounce(&self) -> Duration {
        self.search_debounce
    }
}

fn offline_collection<R: Record>(tokens: &Arc<dyn TokenSource>) -> GatewayHandle<R> {
    Arc::new(InMemoryCollection::<R>::new(OFFLINE_PAGE_SIZE).require_auth(tokens.clone()))
}
