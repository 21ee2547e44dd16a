use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use storefront_sdk::{Cursor, GatewayError, GatewayHandle, Page, Record};
use tracing::{debug, warn};

use crate::error::ControllerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    /// First fetch of a session, nothing to show yet.
    InitialLoading,
    LoadingMore,
}

/// What a view should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    Loading,
    /// The session's first page came back empty.
    Empty,
    Error,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Appended { added: usize, has_more: bool },
    /// The collection is exhausted; nothing was requested.
    Exhausted,
    /// A fetch for this session is already in flight; nothing was requested.
    Busy,
    /// The session moved on while the request was in flight; the result was discarded.
    Stale,
}

/// Immutable rendering snapshot of a list.
#[derive(Debug, Clone)]
pub struct ListView<R> {
    pub records: Vec<R>,
    pub search_term: String,
    pub has_more: bool,
    pub phase: LoadPhase,
    pub error: Option<GatewayError>,
    pub status: ListStatus,
    pub can_load_more: bool,
}

pub(crate) struct ListState<R> {
    pub(crate) records: Vec<R>,
    cursor: Option<Cursor>,
    has_more: bool,
    search_term: String,
    /// Bumped on every reset/cancel; results tagged with an older session are stale.
    pub(crate) session: u64,
    /// Bumped on every structural change to `records`.
    pub(crate) revision: u64,
    phase: LoadPhase,
    pages: u32,
    error: Option<GatewayError>,
    /// Ids with a mutation in flight.
    pub(crate) pending: HashSet<String>,
}

impl<R: Record> ListState<R> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            cursor: None,
            has_more: true,
            search_term: String::new(),
            session: 0,
            revision: 0,
            phase: LoadPhase::Idle,
            pages: 0,
            error: None,
            pending: HashSet::new(),
        }
    }

    fn begin_session(&mut self, search_term: String) {
        self.session += 1;
        self.revision += 1;
        self.records.clear();
        self.cursor = None;
        self.has_more = true;
        self.search_term = search_term;
        self.phase = LoadPhase::Idle;
        self.pages = 0;
        self.error = None;
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Appends in arrival order, dropping ids already present in the session.
    fn append(&mut self, page: Page<R>) -> usize {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.id().to_string()).collect();
        let mut added = 0;
        for record in page.records {
            if seen.insert(record.id().to_string()) {
                self.records.push(record);
                added += 1;
            } else {
                debug!(target: "dashboard.list", kind = R::KIND, record_id = %record.id(), "dropping duplicate record from later page");
            }
        }
        self.has_more = page.cursor.is_some();
        self.cursor = page.cursor;
        self.pages += 1;
        self.revision += 1;
        added
    }

    fn status(&self) -> ListStatus {
        if self.phase == LoadPhase::InitialLoading {
            ListStatus::Loading
        } else if self.error.is_some() {
            ListStatus::Error
        } else if self.records.is_empty() && self.pages > 0 {
            ListStatus::Empty
        } else if self.records.is_empty() {
            ListStatus::Loading
        } else {
            ListStatus::Ready
        }
    }

    fn can_load_more(&self) -> bool {
        self.has_more && self.phase == LoadPhase::Idle
    }
}

/// Cursor-paginated, searchable list of records.
///
/// Cloning yields another handle to the same list. State is only locked for
/// short critical sections, never across a gateway call, so fetches and
/// mutations may interleave; every fetch is tagged with the session it was
/// issued under and its result is dropped if a reset happened meanwhile.
pub struct PagedList<R: Record> {
    gateway: GatewayHandle<R>,
    pub(crate) state: Arc<Mutex<ListState<R>>>,
}

impl<R: Record> Clone for PagedList<R> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Record> PagedList<R> {
    pub fn new(gateway: GatewayHandle<R>) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(ListState::new())),
        }
    }

    pub fn gateway(&self) -> GatewayHandle<R> {
        Arc::clone(&self.gateway)
    }

    /// Starts a new search session for `search_term` and fetches its first page.
    pub async fn reset(&self, search_term: impl Into<String>) -> ControllerResult<FetchOutcome> {
        let search_term = search_term.into();
        let session = {
            let mut state = self.state.lock();
            state.begin_session(search_term.clone());
            state.session
        };
        debug!(target: "dashboard.list", kind = R::KIND, session, term = %search_term, "search session reset");
        self.fetch().await
    }

    /// Fetches the next page of the current session.
    pub async fn fetch(&self) -> ControllerResult<FetchOutcome> {
        let (session, cursor, search_term) = {
            let mut state = self.state.lock();
            if !state.has_more {
                return Ok(FetchOutcome::Exhausted);
            }
            if state.phase != LoadPhase::Idle {
                return Ok(FetchOutcome::Busy);
            }
            state.phase = if state.pages == 0 && state.records.is_empty() {
                LoadPhase::InitialLoading
            } else {
                LoadPhase::LoadingMore
            };
            state.error = None;
            (state.session, state.cursor.clone(), state.search_term.clone())
        };

        let result = self.gateway.fetch_page(cursor.as_ref(), &search_term).await;

        let mut state = self.state.lock();
        if state.session != session {
            debug!(
                target: "dashboard.list",
                kind = R::KIND,
                issued_session = session,
                current_session = state.session,
                term = %search_term,
                "discarding stale page"
            );
            return Ok(FetchOutcome::Stale);
        }
        state.phase = LoadPhase::Idle;
        match result {
            Ok(page) => {
                let added = state.append(page);
                debug!(
                    target: "dashboard.list",
                    kind = R::KIND,
                    session,
                    added,
                    total = state.records.len(),
                    has_more = state.has_more,
                    "page appended"
                );
                Ok(FetchOutcome::Appended {
                    added,
                    has_more: state.has_more,
                })
            }
            Err(err) => {
                warn!(target: "dashboard.list", kind = R::KIND, session, error = %err, "page fetch failed");
                state.error = Some(err.clone());
                Err(err.into())
            }
        }
    }

    /// Replaces the list with the single record `id` (detail views).
    pub async fn open_record(&self, id: &str) -> ControllerResult<R> {
        let session = {
            let mut state = self.state.lock();
            state.begin_session(String::new());
            state.phase = LoadPhase::InitialLoading;
            state.session
        };
        let result = self.gateway.fetch_record(id).await;

        let mut state = self.state.lock();
        if state.session == session {
            state.phase = LoadPhase::Idle;
        }
        match result {
            Ok(record) => {
                if state.session == session {
                    state.append(Page::last(vec![record.clone()]));
                }
                Ok(record)
            }
            Err(err) => {
                warn!(target: "dashboard.list", kind = R::KIND, record_id = %id, error = %err, "record fetch failed");
                if state.session == session {
                    state.error = Some(err.clone());
                }
                Err(err.into())
            }
        }
    }

    /// Puts a freshly created record at the top of the list.
    pub fn prepend(&self, record: R) {
        let mut state = self.state.lock();
        match state.position(record.id()) {
            Some(idx) => state.records[idx] = record,
            None => state.records.insert(0, record),
        }
        state.revision += 1;
    }

    /// Swaps in the persisted version of a record already in the list.
    pub fn replace(&self, record: R) -> bool {
        let mut state = self.state.lock();
        match state.position(record.id()) {
            Some(idx) => {
                state.records[idx] = record;
                state.revision += 1;
                true
            }
            None => false,
        }
    }

    /// True while a mutation on `id` is awaiting the remote store.
    pub fn is_pending(&self, id: &str) -> bool {
        self.state.lock().pending.contains(id)
    }

    /// Abandons in-flight fetches; their results will be discarded.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.session += 1;
        state.phase = LoadPhase::Idle;
    }

    pub fn view(&self) -> ListView<R> {
        let state = self.state.lock();
        ListView {
            records: state.records.clone(),
            search_term: state.search_term.clone(),
            has_more: state.has_more,
            phase: state.phase,
            error: state.error.clone(),
            status: state.status(),
            can_load_more: state.can_load_more(),
        }
    }

    pub fn records(&self) -> Vec<R> {
        self.state.lock().records.clone()
    }

    pub fn find(&self, id: &str) -> Option<R> {
        let state = self.state.lock();
        state.position(id).map(|idx| state.records[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    pub fn search_term(&self) -> String {
        self.state.lock().search_term.clone()
    }

    pub fn session(&self) -> u64 {
        self.state.lock().session
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn can_load_more(&self) -> bool {
        self.state.lock().can_load_more()
    }

    pub fn error(&self) -> Option<GatewayError> {
        self.state.lock().error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use storefront_sdk::memory::{GatewayOp, InMemoryCollection};
    use storefront_sdk::records::ProductDraft;
    use storefront_sdk::{CollectionGateway, Product};

    use crate::error::ControllerError;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.into(),
            name: name.into(),
            price: 100,
            ..Product::default()
        }
    }

    fn ids(list: &PagedList<Product>) -> Vec<String> {
        list.records().into_iter().map(|p| p.id).collect()
    }

    /// Gateway returning fixed pages keyed by cursor.
    struct ScriptedGateway {
        pages: HashMap<Option<String>, Page<Product>>,
    }

    #[async_trait]
    impl CollectionGateway<Product> for ScriptedGateway {
        async fn fetch_page(
            &self,
            cursor: Option<&Cursor>,
            _search_term: &str,
        ) -> Result<Page<Product>, GatewayError> {
            self.pages
                .get(&cursor.map(|c| c.as_str().to_string()))
                .cloned()
                .ok_or_else(|| GatewayError::server("unknown cursor"))
        }

        async fn fetch_record(&self, id: &str) -> Result<Product, GatewayError> {
            Err(GatewayError::NotFound(id.to_string()))
        }

        async fn create_record(&self, _data: &ProductDraft) -> Result<Product, GatewayError> {
            Err(GatewayError::server("read only"))
        }

        async fn update_record(
            &self,
            _id: &str,
            _data: &ProductDraft,
        ) -> Result<Option<Product>, GatewayError> {
            Err(GatewayError::server("read only"))
        }

        async fn delete_record(&self, _id: &str) -> Result<(), GatewayError> {
            Err(GatewayError::server("read only"))
        }
    }

    #[tokio::test]
    async fn two_fetches_concatenate_pages_until_cursor_ends() {
        let gateway = ScriptedGateway {
            pages: [
                (
                    None,
                    Page::new(
                        vec![product("A", "a"), product("B", "b")],
                        Some(Cursor::new("c1")),
                    ),
                ),
                (Some("c1".to_string()), Page::last(vec![product("C", "c")])),
            ]
            .into_iter()
            .collect(),
        };
        let list = PagedList::new(Arc::new(gateway));

        list.reset("").await.expect("first page");
        assert!(list.has_more());
        list.fetch().await.expect("second page");

        assert_eq!(ids(&list), ["A", "B", "C"]);
        assert!(!list.has_more());
        assert_eq!(list.fetch().await.unwrap(), FetchOutcome::Exhausted);
        assert!(!list.can_load_more());
        assert_eq!(list.view().status, ListStatus::Ready);
    }

    #[tokio::test]
    async fn accumulates_every_page_in_arrival_order() {
        let records: Vec<Product> = (0..7).map(|i| product(&format!("p{i}"), "Item")).collect();
        let gateway = Arc::new(InMemoryCollection::with_records(records, 3));
        let list = PagedList::new(gateway);

        list.reset("").await.unwrap();
        let mut fetches = 1;
        while list.has_more() {
            list.fetch().await.unwrap();
            fetches += 1;
        }
        assert_eq!(fetches, 3);
        assert_eq!(
            ids(&list),
            (0..7).map(|i| format!("p{i}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn empty_first_page_is_an_explicit_empty_state() {
        let gateway = Arc::new(InMemoryCollection::with_records(vec![product("a", "Apple")], 5));
        let list = PagedList::new(gateway);
        assert_eq!(list.view().status, ListStatus::Loading);

        list.reset("durian").await.unwrap();
        let view = list.view();
        assert_eq!(view.status, ListStatus::Empty);
        assert!(!view.has_more);
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_records_and_sets_error() {
        let gateway = Arc::new(InMemoryCollection::with_records(
            vec![product("a", "A"), product("b", "B"), product("c", "C")],
            2,
        ));
        let list = PagedList::new(gateway.clone());
        list.reset("").await.unwrap();

        gateway.fail_next(GatewayOp::Fetch, GatewayError::Network("connection reset".into()));
        let err = list.fetch().await.unwrap_err();
        assert_eq!(
            err,
            ControllerError::Gateway(GatewayError::Network("connection reset".into()))
        );
        let view = list.view();
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.status, ListStatus::Error);
        assert_eq!(view.phase, LoadPhase::Idle);
        assert!(view.can_load_more, "a manual retry stays possible");

        list.fetch().await.unwrap();
        assert_eq!(ids(&list), ["a", "b", "c"]);
        assert!(list.error().is_none());
    }

    #[tokio::test]
    async fn reset_discards_results_from_the_previous_search() {
        let gateway = Arc::new(InMemoryCollection::with_records(
            vec![
                product("1", "Banana chips"),
                product("2", "Apple juice"),
                product("3", "Banana leaf"),
            ],
            10,
        ));
        let list = PagedList::new(gateway.clone());

        let gate = gateway.pause_fetches();
        let stale = tokio::spawn({
            let list = list.clone();
            async move { list.reset("banana").await }
        });
        while gateway.fetch_calls().is_empty() {
            tokio::task::yield_now().await;
        }
        gateway.resume_fetches();

        list.reset("apple").await.unwrap();
        gate.release_one();
        let outcome = stale.await.expect("join").expect("stale fetch");

        assert_eq!(outcome, FetchOutcome::Stale);
        assert_eq!(ids(&list), ["2"]);
        assert_eq!(list.search_term(), "apple");
        assert_eq!(list.view().phase, LoadPhase::Idle);
    }

    #[tokio::test]
    async fn concurrent_fetch_in_one_session_is_refused() {
        let gateway = Arc::new(InMemoryCollection::with_records(
            vec![product("a", "A"), product("b", "B")],
            1,
        ));
        let list = PagedList::new(gateway.clone());
        list.reset("").await.unwrap();

        let gate = gateway.pause_fetches();
        let pending = tokio::spawn({
            let list = list.clone();
            async move { list.fetch().await }
        });
        while gateway.fetch_calls().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(list.view().phase, LoadPhase::LoadingMore);
        assert!(!list.can_load_more());
        assert_eq!(list.fetch().await.unwrap(), FetchOutcome::Busy);

        gate.release_one();
        pending.await.unwrap().unwrap();
        assert_eq!(ids(&list), ["a", "b"]);
    }

    #[tokio::test]
    async fn duplicate_ids_across_pages_are_dropped() {
        let dup = ScriptedGateway {
            pages: [
                (None, Page::new(vec![product("A", "a")], Some(Cursor::new("c1")))),
                (
                    Some("c1".to_string()),
                    Page::last(vec![product("A", "a"), product("B", "b")]),
                ),
            ]
            .into_iter()
            .collect(),
        };
        let list = PagedList::new(Arc::new(dup));
        list.reset("").await.unwrap();
        let outcome = list.fetch().await.unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Appended {
                added: 1,
                has_more: false
            }
        );
        assert_eq!(ids(&list), ["A", "B"]);
    }

    #[tokio::test]
    async fn cancel_discards_the_in_flight_page() {
        let gateway = Arc::new(InMemoryCollection::with_records(vec![product("a", "A")], 5));
        let list = PagedList::new(gateway.clone());
        let gate = gateway.pause_fetches();
        let pending = tokio::spawn({
            let list = list.clone();
            async move { list.reset("").await }
        });
        while gateway.fetch_calls().is_empty() {
            tokio::task::yield_now().await;
        }
        list.cancel();
        gate.release_one();
        assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Stale);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn open_record_shows_a_single_record() {
        let gateway = Arc::new(InMemoryCollection::with_records(
            vec![product("a", "A"), product("b", "B")],
            5,
        ));
        let list = PagedList::new(gateway);
        let record = list.open_record("b").await.unwrap();
        assert_eq!(record.id, "b");
        assert_eq!(ids(&list), ["b"]);
        assert!(!list.has_more());

        let err = list.open_record("zzz").await.unwrap_err();
        assert_eq!(err, ControllerError::Gateway(GatewayError::NotFound("zzz".into())));
        assert_eq!(list.view().status, ListStatus::Error);
    }
}
