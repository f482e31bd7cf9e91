// Broadcast event bus for draft and trade lifecycle notifications.
//
// Subscribers (notification delivery, UI refresh) attach via `subscribe()`;
// emitting with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{DraftPick, TradeStatus};

/// Events emitted by the draft coordinator and trade negotiator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    DraftStarted {
        draft_id: String,
        league_id: String,
        on_clock_team: String,
        clock_deadline: Option<DateTime<Utc>>,
    },
    /// A pick was committed and the draft moved forward (or completed).
    DraftAdvanced {
        draft_id: String,
        pick: DraftPick,
        next_team: Option<String>,
        clock_deadline: Option<DateTime<Utc>>,
        completed: bool,
    },
    DraftPaused {
        draft_id: String,
    },
    DraftResumed {
        draft_id: String,
        clock_deadline: Option<DateTime<Utc>>,
    },
    DraftCancelled {
        draft_id: String,
    },
    /// A trade reached a terminal state.
    TradeResolved {
        trade_id: String,
        league_id: String,
        status: TradeStatus,
    },
}

/// Fan-out bus wrapping a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers. Dropped silently when no
    /// one is listening.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}
