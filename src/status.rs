//! Status events emitted by the pipeline for UI and observability.
//!
//! The bus is a `tokio::sync::broadcast` channel: emitting never blocks, and
//! each subscriber sees events in the order a given producer emitted them.
//! Subscribers that fall more than `capacity` events behind lose the oldest.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// One human-readable progress message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl StatusEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Local::now(),
        }
    }
}

/// Cloneable producer handle for status events.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
    history: Arc<Mutex<StatusHistory>>,
}

impl StatusBus {
    /// Create a bus with per-subscriber `capacity` and a display history of
    /// the last `history` events.
    pub fn new(capacity: usize, history: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            history: Arc::new(Mutex::new(StatusHistory::new(history))),
        }
    }

    /// Emit a status message. Having no subscribers is not an error.
    pub fn emit(&self, text: impl Into<String>) {
        let event = StatusEvent::new(text);
        debug!(status = %event.text, "status");
        if let Ok(mut history) = self.history.lock() {
            history.push(event.clone());
        }
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// The most recent events, oldest first.
    pub fn recent(&self) -> Vec<StatusEvent> {
        self.history
            .lock()
            .map(|h| h.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Text of the most recent event, if any.
    pub fn latest(&self) -> Option<String> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.events.back().map(|e| e.text.clone()))
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(64, 20)
    }
}

/// Bounded ring of recent events.
#[derive(Debug)]
struct StatusHistory {
    events: VecDeque<StatusEvent>,
    limit: usize,
}

impl StatusHistory {
    fn new(limit: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn push(&mut self, event: StatusEvent) {
        if self.limit == 0 {
            return;
        }
        while self.events.len() >= self.limit {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Drain everything currently queued on a receiver.
pub fn drain(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<String> {
    let mut texts = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => texts.push(event.text),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    texts
}
