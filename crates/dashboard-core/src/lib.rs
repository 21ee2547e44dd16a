//! Client-side controllers shared by every dashboard list page.
//!
//! - [`debounce`]: turns raw keystrokes into settled search terms
//! - [`list`]: cursor-paginated, searchable record list with stale-response guard
//! - [`mutation`]: optimistic single-record changes with rollback
//! - [`validation`]: pre-flight checks on form input
//! - [`context`]: typed shared UI flags (theme, sidebar)

pub mod context;
pub mod debounce;
pub mod error;
pub mod list;
pub mod mutation;
pub mod validation;

pub use error::{ControllerError, ControllerResult};
pub use list::{FetchOutcome, ListStatus, ListView, LoadPhase, PagedList};
pub use mutation::{Change, OptimisticMutator};
