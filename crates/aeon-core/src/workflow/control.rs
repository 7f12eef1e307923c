//! Cooperative cancel / pause / resume signals for a running execution.
//!
//! The engine keeps one `ExecutionControl` per live execution. The owning
//! task checks it at every step boundary; cancellation also interrupts
//! in-flight action calls and retry back-off sleeps.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Control handle shared between the engine API and the execution task.
#[derive(Debug)]
pub struct ExecutionControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    finished: CancellationToken,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused,
            finished: CancellationToken::new(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Ask the execution to park at its next step boundary.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Park until resumed. Returns `false` if cancelled while waiting.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            let paused = *rx.borrow_and_update();
            if !paused {
                return true;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Signal that the execution has been recorded in history.
    pub fn mark_finished(&self) {
        self.finished.cancel();
    }

    /// Completes once the execution has been recorded in history.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }
}
