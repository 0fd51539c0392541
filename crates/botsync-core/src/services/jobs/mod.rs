//! Sync Job Tracking
//!
//! Follows externally triggered sync jobs from the moment they are queued
//! (or found in flight after a reload) until the backend reports a terminal
//! outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ SyncTracker                                         │
//! │   trigger_sync() / track() / mount_resume()         │
//! │   stop() / teardown()                               │
//! │                                                     │
//! │   Mutex<TrackerState>                               │
//! │     PollRegistry    JobKey -> cancellation token    │
//! │     SyncEntityStore kind -> [SyncEntity]            │
//! │     JobViews        JobKey -> JobViewState          │
//! └─────────────────────────────────────────────────────┘
//!          │ spawns one per JobKey
//!          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ StatusPoller                                        │
//! │   loop {                                            │
//! │       gateway.query_status()                        │
//! │       reconciler::merge()  (under the lock)         │
//! │       Continue   -> sleep(poll interval)            │
//! │       Superseded -> stop, follow the newer job      │
//! │       Terminal   -> stop, notify, reload_all()      │
//! │   }                                                 │
//! └─────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ trait TriggerGateway                                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Stopping a key cancels its token; a loop that wakes up with a stale
//! ticket leaves all state untouched.

pub mod key;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod store;
pub mod tracker;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use key::{key_of, JobKey};
pub use reconciler::{merge, JobResult, Outcome, Reconciled, DEFAULT_FAILURE_MESSAGE};
pub use registry::{PollRegistry, PollTicket};
pub use store::SyncEntityStore;
pub use tracker::SyncTracker;
pub use view::{JobViewState, JobViews};
