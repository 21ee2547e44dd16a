use std::sync::Arc;

use dashboard_core::mutation::{Change, OptimisticMutator};
use dashboard_core::{ControllerError, ControllerResult, ListStatus, PagedList};
use notice_bus::NoticeSink;
use storefront_sdk::records::OrderUpdate;
use storefront_sdk::{Order, OrderStatus, Record};

use super::failure_notice;
use crate::state::AppState;

pub const TOPIC: &str = "order-detail";

/// Money summary shown under the line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: u64,
    pub shipping: u64,
    pub total: u64,
}

impl OrderTotals {
    pub fn of(order: &Order) -> Self {
        Self {
            subtotal: order.items_subtotal(),
            shipping: order.shipping_cost.unwrap_or(0),
            total: order.total_amount,
        }
    }
}

/// One order, with in-place status changes.
pub struct OrderDetailPage {
    order_id: String,
    order: PagedList<Order>,
    mutator: OptimisticMutator<Order>,
    notices: Arc<dyn NoticeSink>,
}

impl OrderDetailPage {
    pub fn mount(state: &AppState, order_id: impl Into<String>) -> Self {
        let order = PagedList::new(state.orders());
        let notices = state.notices();
        Self {
            order_id: order_id.into(),
            mutator: OptimisticMutator::new(order.clone(), Arc::clone(&notices), TOPIC),
            order,
            notices,
        }
    }

    pub async fn load(&self) -> ControllerResult<Order> {
        let result = self.order.open_record(&self.order_id).await;
        if let Err(err) = &result {
            self.notices
                .publish(TOPIC, failure_notice(err, "Failed to load order details"));
        }
        result
    }

    /// The loaded order, if any.
    pub fn order(&self) -> Option<Order> {
        self.order.find(&self.order_id)
    }

    pub fn status(&self) -> ListStatus {
        self.order.view().status
    }

    pub fn totals(&self) -> Option<OrderTotals> {
        self.order().map(|order| OrderTotals::of(&order))
    }

    pub async fn update_status(&self, status: OrderStatus) -> ControllerResult<()> {
        let current = self.order().ok_or_else(|| ControllerError::UnknownRecord {
            kind: Order::KIND,
            id: self.order_id.clone(),
        })?;
        if current.order_status == status {
            return Ok(());
        }
        let update = OrderUpdate::status(status);
        let gateway = self.order.gateway();
        let order_id = self.order_id.as_str();
        let persisted = self
            .mutator
            .mutate(
                order_id,
                Change::Replace(current.with_draft(&update)),
                format!("Order status updated to {status}"),
                async move { gateway.update_record(order_id, &update).await },
            )
            .await?;
        if let Some(order) = persisted {
            self.order.replace(order);
        }
        Ok(())
    }
}
