//! Reply tracking.
//!
//! A handler that sends an interactive message (the menu, for instance) can
//! register the sent message here. A later non-command message in the same
//! chat that quotes it is remapped to the tracked command, with the reply
//! text as its query.
//!
//! The tracker is bounded and evicts the oldest entry first.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Default number of tracked messages.
pub const DEFAULT_TRACKER_CAPACITY: usize = 100;

type TrackKey = (String, String);

#[derive(Default)]
struct TrackerInner {
    order: VecDeque<TrackKey>,
    commands: HashMap<TrackKey, String>,
}

/// Maps `(chat id, message id)` of sent messages to a command name.
pub struct ReplyTracker {
    inner: Mutex<TrackerInner>,
    capacity: usize,
}

impl ReplyTracker {
    /// Creates a tracker holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TrackerInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Tracks `message_id` in `chat_id` for `command`.
    ///
    /// Re-tracking a message replaces its command without changing its age.
    pub fn track(&self, chat_id: &str, message_id: &str, command: &str) {
        let key = (chat_id.to_string(), message_id.to_string());
        let mut inner = self.inner.lock();

        if inner
            .commands
            .insert(key.clone(), command.to_lowercase())
            .is_none()
        {
            inner.order.push_back(key);
            if inner.order.len() > self.capacity
                && let Some(oldest) = inner.order.pop_front()
            {
                inner.commands.remove(&oldest);
            }
        }
    }

    /// Returns the command tracked for a quoted message.
    pub fn lookup(&self, chat_id: &str, message_id: &str) -> Option<String> {
        let key = (chat_id.to_string(), message_id.to_string());
        self.inner.lock().commands.get(&key).cloned()
    }

    /// Returns the number of tracked messages.
    pub fn len(&self) -> usize {
        self.inner.lock().commands.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReplyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKER_CAPACITY)
    }
}
