//! # Connection Chooser
//!
//! Collects the connections produced by racing listen and connect attempts
//! and hands out the first one. Once stopped, every queued connection and
//! every connection submitted later is disposed, so a loser that finishes
//! while the winner is being picked can never stay open.
//!
//! `submit` and `stop` decide under the same lock whether a connection is
//! queued or disposed; disposal itself happens after the lock is released.

use crate::connection::KeyAgreementConnection;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct ChooserState {
    results: VecDeque<KeyAgreementConnection>,
    stopped: bool,
}

#[derive(Default)]
pub struct ConnectionChooser {
    state: Mutex<ChooserState>,
    changed: Notify,
}

impl ConnectionChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a connection. Disposed immediately if the chooser has stopped.
    pub async fn submit(&self, connection: KeyAgreementConnection) {
        let rejected = {
            let mut state = self.state.lock();
            if state.stopped {
                Some(connection)
            } else {
                state.results.push_back(connection);
                None
            }
        };
        match rejected {
            Some(connection) => {
                debug!(
                    connection = connection.id(),
                    "Chooser stopped, closing late connection"
                );
                connection.dispose(false, false).await;
            }
            None => self.changed.notify_waiters(),
        }
    }

    /// Wait up to `timeout` for a connection.
    ///
    /// Returns `None` on timeout or once `stop` has been called.
    pub async fn poll(&self, timeout: Duration) -> Option<KeyAgreementConnection> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent notify is not lost.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.stopped {
                    return None;
                }
                if let Some(connection) = state.results.pop_front() {
                    return Some(connection);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Stop accepting results and dispose anything not yet taken. Idempotent.
    pub async fn stop(&self) {
        let unchosen: Vec<_> = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.results.drain(..).collect()
        };
        self.changed.notify_waiters();
        for connection in unchosen {
            debug!(connection = connection.id(), "Closing unchosen connection");
            connection.dispose(false, false).await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Connections queued and not yet taken.
    pub fn pending(&self) -> usize {
        self.state.lock().results.len()
    }
}
