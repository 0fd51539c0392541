//! Poll registry
//!
//! Table of live polling contexts keyed by [`JobKey`]. An entry exists only
//! while a loop is active for its key; absence means "not polling".
//!
//! Every entry owns a cancellation token that is a child of the registry's
//! root token, so closing the registry (or dropping the owner's guard)
//! cancels every loop at once. Loops hold a [`PollTicket`] and must re-check
//! [`PollRegistry::is_current`] before mutating shared state: a ticket from a
//! stopped or restarted entry is stale even if it has not yet observed its
//! cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::key::JobKey;

/// Handle given to one polling loop
#[derive(Debug, Clone)]
pub struct PollTicket {
    key: JobKey,
    generation: u64,
    token: CancellationToken,
}

impl PollTicket {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut` unless the ticket is cancelled first.
    ///
    /// Returns `None` when cancellation wins; `fut` is dropped at its
    /// current suspension point.
    pub async fn guard<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Wait `delay` before the next continuation. Returns `false` if the
    /// ticket was cancelled while waiting (or before).
    pub async fn sleep(&self, delay: Duration) -> bool {
        self.guard(tokio::time::sleep(delay)).await.is_some()
    }
}

#[derive(Debug)]
struct PollEntry {
    generation: u64,
    token: CancellationToken,
}

/// Registry of active polling loops
#[derive(Debug)]
pub struct PollRegistry {
    entries: HashMap<JobKey, PollEntry>,
    next_generation: u64,
    root: CancellationToken,
}

impl Default for PollRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PollRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 1,
            root: CancellationToken::new(),
        }
    }

    /// Token cancelled when the registry is closed
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Register a new loop for `key`, stopping any loop already registered.
    ///
    /// After a close the returned ticket is already cancelled.
    pub fn start(&mut self, key: &JobKey) -> PollTicket {
        self.stop(key);

        let generation = self.next_generation;
        self.next_generation += 1;

        let token = self.root.child_token();
        self.entries.insert(
            key.clone(),
            PollEntry {
                generation,
                token: token.clone(),
            },
        );

        PollTicket {
            key: key.clone(),
            generation,
            token,
        }
    }

    /// Cancel and remove the entry for `key`. No-op when absent.
    pub fn stop(&mut self, key: &JobKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop the entry only if it still belongs to `ticket`
    pub fn stop_ticket(&mut self, ticket: &PollTicket) -> bool {
        if self.is_current(ticket) {
            self.stop(&ticket.key)
        } else {
            ticket.token.cancel();
            false
        }
    }

    pub fn is_active(&self, key: &JobKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `ticket` is the live entry for its key
    pub fn is_current(&self, ticket: &PollTicket) -> bool {
        !ticket.token.is_cancelled()
            && self
                .entries
                .get(&ticket.key)
                .is_some_and(|entry| entry.generation == ticket.generation)
    }

    /// Cancel every live entry. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.token.cancel();
        }
        count
    }

    /// Stop everything and refuse further work
    pub fn close(&mut self) -> usize {
        let count = self.stop_all();
        self.root.cancel();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active keys in a stable order
    pub fn keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
