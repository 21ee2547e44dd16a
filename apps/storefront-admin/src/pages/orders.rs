use std::ops::Deref;

use dashboard_core::mutation::{Change, OptimisticMutator};
use dashboard_core::{ControllerError, ControllerResult};
use storefront_sdk::records::OrderUpdate;
use storefront_sdk::{Order, OrderStatus, Record};

use super::ListPage;
use crate::state::AppState;

pub const TOPIC: &str = "orders";

/// Notice shown after a confirmed status change, e.g. `Order #a1b2... updated to Shipped`.
pub fn status_updated_message(order: &Order, status: OrderStatus) -> String {
    format!("Order #{}... updated to {}", order.short_id(), status)
}

pub struct OrdersPage {
    page: ListPage<Order>,
    mutator: OptimisticMutator<Order>,
}

impl OrdersPage {
    pub fn mount(state: &AppState) -> Self {
        let page = ListPage::mount(state.orders(), state.notices(), TOPIC, state.search_debounce());
        let mutator = OptimisticMutator::new(page.list().clone(), page.sink(), TOPIC);
        Self { page, mutator }
    }

    /// Moves an order to `status` immediately, reverting if the store refuses.
    pub async fn update_status(&self, order_id: &str, status: OrderStatus) -> ControllerResult<()> {
        let current = self
            .page
            .list()
            .find(order_id)
            .ok_or_else(|| ControllerError::UnknownRecord {
                kind: Order::KIND,
                id: order_id.to_string(),
            })?;
        let update = OrderUpdate::status(status);
        let tentative = current.with_draft(&update);
        let gateway = self.page.list().gateway();
        let persisted = self
            .mutator
            .mutate(
                order_id,
                Change::Replace(tentative),
                status_updated_message(&current, status),
                async move { gateway.update_record(order_id, &update).await },
            )
            .await?;
        if let Some(order) = persisted {
            self.page.list().replace(order);
        }
        Ok(())
    }
}

impl Deref for OrdersPage {
    type Target = ListPage<Order>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}
