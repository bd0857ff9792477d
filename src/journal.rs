//! Journal sink interface. The durable append-only implementation lives
//! outside this crate (§6, "Persisted state layout"); the interface here
//! is what the pipeline writes every admitted order, trade and book delta
//! to, so a real implementation can rebuild the book deterministically on
//! restart.

use crate::types::{BookDelta, Order, Trade};

#[derive(Debug, Clone)]
pub enum JournalEvent {
    OrderAdmitted(Order),
    TradeExecuted(Trade),
    BookDelta(BookDelta),
}

pub trait JournalSink: Send + Sync {
    fn append(&self, event: JournalEvent);
}

/// Default sink used in tests and wherever no durable journal is wired in.
#[derive(Default)]
pub struct NoopJournalSink;

impl JournalSink for NoopJournalSink {
    fn append(&self, _event: JournalEvent) {}
}

/// In-memory sink retaining events, useful for tests asserting on journal
/// contents without standing up a real durable store.
#[derive(Default)]
pub struct InMemoryJournalSink {
    events: parking_lot::Mutex<Vec<JournalEvent>>,
}

impl JournalSink for InMemoryJournalSink {
    fn append(&self, event: JournalEvent) {
        self.events.lock().push(event);
    }
}

impl InMemoryJournalSink {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
