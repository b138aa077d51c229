use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Playback-state transition reported by the host player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    pub item_id: Uuid,
    pub is_paused: bool,
    /// Playback position in ticks; absent while the player is still seeking.
    pub position_ticks: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

/// Library entry the pipeline needs to drive frame extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: Uuid,
    pub path: PathBuf,
    pub container: String,
    pub kind: MediaKind,
}

/// Resolves an event's item id to the library entry, if any.
pub trait MediaLibrary: Send + Sync {
    fn item(&self, id: Uuid) -> Option<MediaItem>;
}

#[derive(Default)]
pub struct InMemoryLibrary {
    items: Mutex<HashMap<Uuid, MediaItem>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: MediaItem) {
        self.items.lock().unwrap().insert(item.id, item);
    }
}

impl MediaLibrary for InMemoryLibrary {
    fn item(&self, id: Uuid) -> Option<MediaItem> {
        self.items.lock().unwrap().get(&id).cloned()
    }
}

/// Channel-based replacement for the host's session-manager subscription.
/// After `detach` returns, the corresponding receiver observes no further
/// events.
pub struct EventBus {
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<PlaybackEvent>)>>,
    next_id: Mutex<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.subscribers.lock().unwrap().push((id, tx));
        (id, rx)
    }

    pub fn detach(&self, id: u64) {
        self.subscribers.lock().unwrap().retain(|(sid, _)| *sid != id);
    }

    pub fn publish(&self, event: PlaybackEvent) {
        // Drop subscribers whose receiver side is gone.
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
