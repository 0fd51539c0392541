//! Services module

pub mod gateway;
pub mod jobs;
pub mod notify;

pub use gateway::{HttpGateway, TriggerGateway};
pub use jobs::{
    key_of, JobKey, JobResult, JobViewState, Outcome, PollRegistry, SyncEntityStore, SyncTracker,
};
pub use notify::{LogNotifier, Notifier, TRIGGER_FAILED_MESSAGE};
