use std::ops::Deref;

use storefront_sdk::Customer;

use super::ListPage;
use crate::state::AppState;

pub const TOPIC: &str = "customers";

/// Read-only customer directory.
pub struct CustomersPage {
    page: ListPage<Customer>,
}

impl CustomersPage {
    pub fn mount(state: &AppState) -> Self {
        Self {
            page: ListPage::mount(state.customers(), state.notices(), TOPIC, state.search_debounce()),
        }
    }
}

impl Deref for CustomersPage {
    type Target = ListPage<Customer>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}
