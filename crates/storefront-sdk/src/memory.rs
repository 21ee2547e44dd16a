use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::auth::TokenSource;
use crate::gateway::{CollectionGateway, Cursor, GatewayError, Page};
use crate::records::Record;

/// Gateway operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Fetch,
    FetchRecord,
    Create,
    Update,
    Delete,
}

/// A `fetch_page` call as observed by the in-memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub cursor: Option<Cursor>,
    pub search_term: String,
}

/// Holds `fetch_page` calls until released. See [`InMemoryCollection::pause_fetches`].
#[derive(Debug, Clone)]
pub struct FetchGate {
    permits: Arc<Semaphore>,
}

impl FetchGate {
    /// Lets one held (or future) fetch through.
    pub fn release_one(&self) {
        self.permits.add_permits(1);
    }
}

/// In-memory collection for tests and early wiring.
///
/// Cursors encode the next offset together with the search term they were
/// issued for; a cursor presented under a different term is rejected with a
/// server error, as a strict remote store would.
pub struct InMemoryCollection<R: Record> {
    records: Mutex<Vec<R>>,
    page_size: usize,
    tokens: Option<Arc<dyn TokenSource>>,
    failures: Mutex<HashMap<GatewayOp, VecDeque<GatewayError>>>,
    fetch_calls: Mutex<Vec<FetchCall>>,
    gate: Mutex<Option<FetchGate>>,
    next_id: AtomicU64,
}

impl<R: Record> InMemoryCollection<R> {
    pub fn new(page_size: usize) -> Self {
        Self::with_records(Vec::new(), page_size)
    }

    pub fn with_records(records: Vec<R>, page_size: usize) -> Self {
        Self {
            records: Mutex::new(records),
            page_size: page_size.max(1),
            tokens: None,
            failures: Mutex::new(HashMap::new()),
            fetch_calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Requires a token from `tokens` on every call, failing with `Unauthorized` otherwise.
    pub fn require_auth(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Queues `error` as the outcome of the next `op` call.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Holds every subsequent `fetch_page` until the returned gate releases it.
    pub fn pause_fetches(&self) -> FetchGate {
        let gate = FetchGate {
            permits: Arc::new(Semaphore::new(0)),
        };
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// New fetches stop waiting; fetches already held stay held until released.
    pub fn resume_fetches(&self) {
        *self.gate.lock() = None;
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.fetch_calls.lock().clone()
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.records.lock().clone()
    }

    /// Seeds a record at the front, bypassing scripted failures and auth.
    pub fn insert(&self, record: R) {
        self.records.lock().insert(0, record);
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.records.lock().iter().find(|r| r.id() == id).cloned()
    }

    fn authorize(&self) -> Result<(), GatewayError> {
        match &self.tokens {
            Some(tokens) if tokens.current_token().is_none() => Err(GatewayError::Unauthorized),
            _ => Ok(()),
        }
    }

    fn take_failure(&self, op: GatewayOp) -> Result<(), GatewayError> {
        match self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn begin(&self, op: GatewayOp) -> Result<(), GatewayError> {
        self.authorize()?;
        self.take_failure(op)
    }
}

fn encode_cursor(offset: usize, term: &str) -> Cursor {
    Cursor::new(format!("{offset}:{term}"))
}

fn decode_cursor(cursor: &Cursor, term: &str) -> Result<usize, GatewayError> {
    let (offset, issued_for) = cursor
        .as_str()
        .split_once(':')
        .ok_or_else(|| GatewayError::server(format!("malformed cursor {cursor}")))?;
    if issued_for != term {
        return Err(GatewayError::server(format!(
            "cursor {cursor} was issued for a different search"
        )));
    }
    offset
        .parse()
        .map_err(|_| GatewayError::server(format!("malformed cursor {cursor}")))
}

#[async_trait]
impl<R: Record> CollectionGateway<R> for InMemoryCollection<R> {
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        search_term: &str,
    ) -> Result<Page<R>, GatewayError> {
        self.fetch_calls.lock().push(FetchCall {
            cursor: cursor.cloned(),
            search_term: search_term.to_string(),
        });
        self.begin(GatewayOp::Fetch)?;
        let offset = match cursor {
            Some(cursor) => decode_cursor(cursor, search_term)?,
            None => 0,
        };

        // Results reflect the store at call time, even if the call is held.
        let matching: Vec<R> = self
            .records
            .lock()
            .iter()
            .filter(|r| search_term.is_empty() || r.matches_search(search_term))
            .cloned()
            .collect();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.permits.acquire().await {
                permit.forget();
            }
        }

        let end = (offset + self.page_size).min(matching.len());
        let records = matching.get(offset..end).map(<[R]>::to_vec).unwrap_or_default();
        let cursor = (end < matching.len()).then(|| encode_cursor(end, search_term));
        Ok(Page::new(records, cursor))
    }

    async fn fetch_record(&self, id: &str) -> Result<R, GatewayError> {
        self.begin(GatewayOp::FetchRecord)?;
        self.get(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    async fn create_record(&self, data: &R::Draft) -> Result<R, GatewayError> {
        self.begin(GatewayOp::Create)?;
        let id = format!("{}-{}", R::KIND, self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = R::from_draft(id, data);
        self.records.lock().insert(0, record.clone());
        Ok(record)
    }

    async fn update_record(&self, id: &str, data: &R::Draft) -> Result<Option<R>, GatewayError> {
        self.begin(GatewayOp::Update)?;
        let mut guard = self.records.lock();
        let existing = guard
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        *existing = existing.with_draft(data);
        Ok(Some(existing.clone()))
    }

    async fn delete_record(&self, id: &str) -> Result<(), GatewayError> {
        self.begin(GatewayOp::Delete)?;
        let mut guard = self.records.lock();
        let before = guard.len();
        guard.retain(|r| r.id() != id);
        if guard.len() == before {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
