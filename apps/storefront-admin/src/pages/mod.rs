//! Page controllers. Each page owns the controllers for one screen and is
//! built from an [`AppState`](crate::state::AppState).

pub mod customer_detail;
pub mod customers;
pub mod login;
pub mod order_detail;
pub mod orders;
pub mod products;

use std::sync::Arc;
use std::time::Duration;

use dashboard_core::debounce::{SearchDebouncer, SearchInput};
use dashboard_core::{ControllerError, ControllerResult, FetchOutcome, ListView, PagedList};
use notice_bus::{Notice, NoticeSink};
use storefront_sdk::{GatewayHandle, Record};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Turns a controller failure into the notice shown for it.
pub(crate) fn failure_notice(err: &ControllerError, context: &str) -> Notice {
    if err.is_unauthorized() {
        Notice::blocking(dashboard_core::mutation::SIGN_IN_REQUIRED)
    } else {
        Notice::error(format!("{context}: {err}"))
    }
}

/// A searchable, paginated list screen.
///
/// Mounting spawns the search debouncer and a driver that starts a new list
/// session for every settled term. Dropping the page aborts both and
/// discards whatever fetch is still in flight.
pub struct ListPage<R: Record> {
    list: PagedList<R>,
    notices: Arc<dyn NoticeSink>,
    topic: &'static str,
    search: SearchInput,
    tasks: Vec<JoinHandle<()>>,
}

impl<R: Record> ListPage<R> {
    pub fn mount(
        gateway: GatewayHandle<R>,
        notices: Arc<dyn NoticeSink>,
        topic: &'static str,
        debounce: Duration,
    ) -> Self {
        let list = PagedList::new(gateway);
        let (search, settled, debouncer) = SearchDebouncer::spawn(debounce).into_parts();
        let driver = tokio::spawn(drive_search(list.clone(), settled, Arc::clone(&notices), topic));
        Self {
            list,
            notices,
            topic,
            search,
            tasks: vec![debouncer, driver],
        }
    }

    /// Loads the first page with an empty search.
    pub async fn load(&self) -> ControllerResult<FetchOutcome> {
        let result = self.list.reset("").await;
        self.report(result, "Failed to load")
    }

    /// Feeds the full search box value after a keystroke.
    pub fn type_search(&self, value: impl Into<String>) {
        if !self.search.keystroke(value) {
            warn!(topic = self.topic, "search input closed");
        }
    }

    pub async fn load_more(&self) -> ControllerResult<FetchOutcome> {
        let result = self.list.fetch().await;
        self.report(result, "Failed to load more")
    }

    pub fn view(&self) -> ListView<R> {
        self.list.view()
    }

    pub fn list(&self) -> &PagedList<R> {
        &self.list
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.recent(self.topic)
    }

    pub(crate) fn sink(&self) -> Arc<dyn NoticeSink> {
        Arc::clone(&self.notices)
    }

    fn report(
        &self,
        result: ControllerResult<FetchOutcome>,
        context: &str,
    ) -> ControllerResult<FetchOutcome> {
        if let Err(err) = &result {
            self.notices.publish(self.topic, failure_notice(err, context));
        }
        result
    }
}

impl<R: Record> Drop for ListPage<R> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.list.cancel();
    }
}

async fn drive_search<R: Record>(
    list: PagedList<R>,
    mut settled: mpsc::UnboundedReceiver<String>,
    notices: Arc<dyn NoticeSink>,
    topic: &'static str,
) {
    let mut inflight: Option<JoinHandle<()>> = None;
    while let Some(term) = settled.recv().await {
        if term == list.search_term() {
            debug!(topic, term = %term, "settled term unchanged; keeping session");
            continue;
        }
        if let Some(previous) = inflight.take() {
            previous.abort();
        }
        let list = list.clone();
        let notices = Arc::clone(&notices);
        inflight = Some(tokio::spawn(async move {
            if let Err(err) = list.reset(term).await {
                notices.publish(topic, failure_notice(&err, "Search failed"));
            }
        }));
    }
    if let Some(previous) = inflight {
        previous.abort();
    }
}
