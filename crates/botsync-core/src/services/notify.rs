//! One-shot user notifications
//!
//! The tracking core reports exactly two things to the user: a trigger that
//! could not be queued, and a job that ended in failure. Front ends decide
//! how to surface them by supplying a [`Notifier`].

/// Shown when the backend refuses to queue a sync job
pub const TRIGGER_FAILED_MESSAGE: &str =
    "Failed to queue sync job. Please check the configuration and try again.";

/// Receiver of user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Any `Fn(&str)` callback can act as a notifier
impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Notifier that writes through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::warn!("{}", message);
    }
}
