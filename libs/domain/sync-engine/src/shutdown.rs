//! [libs/domain/sync-engine/src/shutdown.rs]
//! Cooperative cancellation shared by the Poller and Event Listener (spec
//! §5): on shutdown both loops are cancelled at their next suspension
//! point. An `AtomicBool` alone only gets noticed at the top of a loop
//! iteration; pairing it with a `Notify` lets a loop blocked in `select!`
//! on a sleep or a channel receive wake immediately instead of waiting out
//! whatever it was blocked on.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

pub struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already triggered; otherwise waits for
    /// `trigger()`. Safe to use as a `select!` branch alongside I/O or a
    /// timer.
    pub async fn cancelled(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
