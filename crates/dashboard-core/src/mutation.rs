use std::future::Future;
use std::sync::Arc;

use notice_bus::{Notice, NoticeSink};
use storefront_sdk::{GatewayError, Record};
use tracing::{debug, info, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::list::PagedList;

pub const SIGN_IN_REQUIRED: &str = "Your session has expired. Please sign in again.";

/// Tentative change applied to one record before the remote call completes.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R> {
    Replace(R),
    Remove,
}

impl<R> Change<R> {
    fn verb(&self) -> &'static str {
        match self {
            Change::Replace(_) => "update",
            Change::Remove => "delete",
        }
    }
}

/// Pre-change copy of the list owned by one in-flight mutation.
struct Snapshot<R> {
    records: Vec<R>,
    original: R,
    position: usize,
    session: u64,
    /// List revision right after the tentative change was applied.
    applied_revision: u64,
}

/// Owns the snapshot while the remote call is awaited. Dropping it without a
/// verdict (the caller stopped polling) reverts the tentative change.
struct InFlight<'a, R: Record> {
    mutator: &'a OptimisticMutator<R>,
    record_id: &'a str,
    snapshot: Option<Snapshot<R>>,
}

impl<R: Record> InFlight<'_, R> {
    fn confirm(mut self) {
        self.snapshot = None;
        self.mutator.list.state.lock().pending.remove(self.record_id);
    }

    fn reject(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.mutator.roll_back(self.record_id, snapshot);
        }
    }
}

impl<R: Record> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            debug!(target: "dashboard.mutation", kind = R::KIND, record_id = self.record_id, "mutation abandoned; reverting");
            self.mutator.roll_back(self.record_id, snapshot);
        }
    }
}

/// Applies single-record changes to a [`PagedList`] ahead of the remote
/// store, keeping them on success and reverting them on failure.
///
/// Every mutation that passes its preconditions publishes exactly one notice
/// under `topic`.
pub struct OptimisticMutator<R: Record> {
    list: PagedList<R>,
    notices: Arc<dyn NoticeSink>,
    topic: String,
}

impl<R: Record> Clone for OptimisticMutator<R> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            notices: Arc::clone(&self.notices),
            topic: self.topic.clone(),
        }
    }
}

impl<R: Record> OptimisticMutator<R> {
    pub fn new(list: PagedList<R>, notices: Arc<dyn NoticeSink>, topic: impl Into<String>) -> Self {
        Self {
            list,
            notices,
            topic: topic.into(),
        }
    }

    pub fn list(&self) -> &PagedList<R> {
        &self.list
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Applies `change` to `record_id`, then awaits `remote_call`.
    ///
    /// Fails with `UnknownRecord` or `MutationInFlight` before anything is
    /// applied. A failed remote call puts the original record back where it
    /// was, unless the list has since moved to another search session. If the
    /// returned future is dropped before `remote_call` resolves, the change is
    /// reverted the same way and no notice is published.
    pub async fn mutate<T, F>(
        &self,
        record_id: &str,
        change: Change<R>,
        description: impl Into<String>,
        remote_call: F,
    ) -> ControllerResult<T>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let description = description.into();
        let verb = change.verb();
        let snapshot = self.apply(record_id, &change)?;
        debug!(
            target: "dashboard.mutation",
            kind = R::KIND,
            record_id,
            action = verb,
            session = snapshot.session,
            "applied tentative change"
        );
        let guard = InFlight {
            mutator: self,
            record_id,
            snapshot: Some(snapshot),
        };

        let result = remote_call.await;

        match result {
            Ok(value) => {
                guard.confirm();
                info!(target: "dashboard.mutation", kind = R::KIND, record_id, action = verb, "change confirmed");
                self.notices
                    .publish(&self.topic, Notice::success(description).for_record(record_id));
                Ok(value)
            }
            Err(err) => {
                guard.reject();
                warn!(
                    target: "dashboard.mutation",
                    kind = R::KIND,
                    record_id,
                    action = verb,
                    error = %err,
                    "change rejected; reverted"
                );
                let notice = if err.is_unauthorized() {
                    Notice::blocking(SIGN_IN_REQUIRED)
                } else {
                    Notice::error(format!(
                        "Failed to {verb} {} {record_id}; changes reverted ({err})",
                        R::KIND
                    ))
                };
                self.notices.publish(&self.topic, notice.for_record(record_id));
                Err(err.into())
            }
        }
    }

    fn apply(&self, record_id: &str, change: &Change<R>) -> ControllerResult<Snapshot<R>> {
        let mut state = self.list.state.lock();
        let position = state
            .position(record_id)
            .ok_or_else(|| ControllerError::UnknownRecord {
                kind: R::KIND,
                id: record_id.to_string(),
            })?;
        if state.pending.contains(record_id) {
            return Err(ControllerError::MutationInFlight {
                kind: R::KIND,
                id: record_id.to_string(),
            });
        }

        let records = state.records.clone();
        let original = records[position].clone();
        match change {
            Change::Replace(next) => state.records[position] = next.clone(),
            Change::Remove => {
                state.records.remove(position);
            }
        }
        state.revision += 1;
        state.pending.insert(record_id.to_string());
        Ok(Snapshot {
            records,
            original,
            position,
            session: state.session,
            applied_revision: state.revision,
        })
    }

    fn roll_back(&self, record_id: &str, snapshot: Snapshot<R>) {
        let mut state = self.list.state.lock();
        state.pending.remove(record_id);
        if state.session != snapshot.session {
            debug!(target: "dashboard.mutation", kind = R::KIND, record_id, "list was reset; skipping rollback");
            return;
        }
        if state.revision == snapshot.applied_revision {
            state.records = snapshot.records;
        } else {
            // Other changes landed meanwhile; revert only this record.
            match state.position(record_id) {
                Some(idx) => state.records[idx] = snapshot.original,
                None => {
                    let at = snapshot.position.min(state.records.len());
                    state.records.insert(at, snapshot.original);
                }
            }
        }
        state.revision += 1;
    }
}
