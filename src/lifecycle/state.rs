//! Server lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Unconfigured → Starting: run() entered with config, handler, middleware
//! Starting → Serving:      primary listener bound and about to accept
//! Starting|Serving → Degraded: QUIC listener failed (no retry)
//! any → Stopped:           primary listener terminated
//! ```
//!
//! A QUIC failure observed while still Starting is kept: the server goes
//! straight to Degraded instead of Serving.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unconfigured,
    Starting,
    Serving,
    /// Serving over TCP only; the QUIC listener is gone.
    Degraded,
    Stopped,
}

/// Shared, observable handle to the current [`ServerState`].
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<ServerState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Unconfigured);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ServerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    pub fn starting(&self) {
        self.transition(|s| matches!(s, ServerState::Unconfigured), ServerState::Starting);
    }

    pub fn serving(&self) {
        self.transition(|s| matches!(s, ServerState::Starting), ServerState::Serving);
    }

    pub fn degraded(&self) {
        self.transition(
            |s| matches!(s, ServerState::Starting | ServerState::Serving),
            ServerState::Degraded,
        );
    }

    pub fn stopped(&self) {
        self.transition(|s| !matches!(s, ServerState::Stopped), ServerState::Stopped);
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_for(&self, predicate: impl FnMut(&ServerState) -> bool) -> ServerState {
        let mut rx = self.subscribe();
        let reached = rx.wait_for(predicate).await.map(|state| *state);
        // The sender lives in `self`, so the channel cannot close here.
        reached.unwrap_or_else(|_| self.get())
    }

    fn transition(&self, allowed: impl Fn(&ServerState) -> bool, next: ServerState) {
        self.tx.send_if_modified(|state| {
            if !allowed(state) {
                return false;
            }
            tracing::debug!(from = ?*state, to = ?next, "Server state change");
            *state = next;
            true
        });
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}
