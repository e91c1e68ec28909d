use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::playback::state::PlaybackStatus;
use crate::playback::types::StepResult;

const EVENT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    StatusChanged {
        previous: PlaybackStatus,
        status: PlaybackStatus,
    },
    StepCompleted(StepResult),
}

/// Fan-out of player events to any number of observers. Slow receivers lag
/// and lose the oldest events; the player never blocks on them.
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of receivers reached; zero when nobody listens.
    pub fn publish(&self, event: PlayerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
