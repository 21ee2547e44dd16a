use std::sync::Arc;

use dashboard_core::{ControllerResult, FetchOutcome, ListView, PagedList};
use notice_bus::NoticeSink;
use storefront_sdk::Order;

use super::failure_notice;
use crate::state::AppState;

pub const TOPIC: &str = "customer-detail";

/// Order history of one customer.
pub struct CustomerDetailPage {
    customer_id: String,
    orders: PagedList<Order>,
    notices: Arc<dyn NoticeSink>,
}

impl CustomerDetailPage {
    pub fn mount(state: &AppState, customer_id: impl Into<String>) -> Self {
        let customer_id = customer_id.into();
        Self {
            orders: PagedList::new(state.customer_orders(&customer_id)),
            customer_id,
            notices: state.notices(),
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub async fn load(&self) -> ControllerResult<FetchOutcome> {
        let result = self.orders.reset("").await;
        if let Err(err) = &result {
            self.notices
                .publish(TOPIC, failure_notice(err, "Failed to load order history"));
        }
        result
    }

    pub async fn load_more(&self) -> ControllerResult<FetchOutcome> {
        let result = self.orders.fetch().await;
        if let Err(err) = &result {
            self.notices
                .publish(TOPIC, failure_notice(err, "Failed to load order history"));
        }
        result
    }

    pub fn view(&self) -> ListView<Order> {
        self.orders.view()
    }
}

impl Drop for CustomerDetailPage {
    fn drop(&mut self) {
        self.orders.cancel();
    }
}
