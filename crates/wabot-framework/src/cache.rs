//! Recent-message cache.
//!
//! Keeps the contexts of the last `capacity` inbound messages so deletions can
//! be reported with the original content. Entries are keyed by chat and
//! message id, since ids are only unique within a chat. Eviction is strict
//! FIFO on insertion order; reading an entry does not refresh it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use wabot_core::MessageContext;

/// Default number of cached messages.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// `(chat id, message id)`
type CacheKey = (String, String);

fn cache_key(chat: &str, id: &str) -> CacheKey {
    (chat.to_string(), id.to_string())
}

#[derive(Default)]
struct CacheInner {
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Arc<MessageContext>>,
}

/// Bounded FIFO map from a message key to its context.
pub struct MessageCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl MessageCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Inserts a context under its own key unless that key is already present.
    ///
    /// Returns `true` if the entry was inserted. At most one entry, the
    /// oldest, is evicted per insertion.
    pub fn put(&self, ctx: Arc<MessageContext>) -> bool {
        let key = cache_key(&ctx.key.remote_jid, &ctx.key.id);
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            return false;
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, ctx);

        if inner.entries.len() > self.capacity
            && let Some(oldest) = inner.order.pop_front()
        {
            inner.entries.remove(&oldest);
        }
        true
    }

    pub fn get(&self, chat: &str, id: &str) -> Option<Arc<MessageContext>> {
        self.inner.lock().entries.get(&cache_key(chat, id)).cloned()
    }

    /// Removes and returns an entry.
    pub fn remove(&self, chat: &str, id: &str) -> Option<Arc<MessageContext>> {
        let key = cache_key(chat, id);
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(&key)?;
        inner.order.retain(|k| *k != key);
        Some(removed)
    }

    pub fn contains(&self, chat: &str, id: &str) -> bool {
        self.inner.lock().entries.contains_key(&cache_key(chat, id))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabot_core::MessageKey;

    const CHAT: &str = "111@s.whatsapp.net";

    fn ctx_in(chat: &str, id: &str) -> Arc<MessageContext> {
        Arc::new(MessageContext::new(MessageKey::new(chat, id), chat))
    }

    fn ctx(id: &str) -> Arc<MessageContext> {
        ctx_in(CHAT, id)
    }

    #[test]
    fn test_fifo_eviction_at_capacity_plus_one() {
        let cache = MessageCache::new(3);
        for id in ["A", "B", "C"] {
            assert!(cache.put(ctx(id)));
        }
        // Reads do not refresh age.
        assert!(cache.get(CHAT, "A").is_some());

        assert!(cache.put(ctx("D")));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(CHAT, "A"));
        assert!(cache.contains(CHAT, "B"));
        assert!(cache.contains(CHAT, "D"));
    }

    #[test]
    fn test_put_is_idempotent() {
        let cache = MessageCache::new(2);
        assert!(cache.put(ctx("A")));
        assert!(!cache.put(ctx("A")));
        assert!(cache.put(ctx("B")));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(CHAT, "A"));
    }

    #[test]
    fn test_remove_frees_a_slot() {
        let cache = MessageCache::new(2);
        cache.put(ctx("A"));
        cache.put(ctx("B"));

        assert!(cache.remove(CHAT, "A").is_some());
        assert!(cache.remove(CHAT, "A").is_none());

        cache.put(ctx("C"));
        assert!(cache.contains(CHAT, "B"));
        assert!(cache.contains(CHAT, "C"));
    }

    #[test]
    fn test_same_id_in_two_chats_are_separate_entries() {
        let cache = MessageCache::new(4);
        assert!(cache.put(ctx_in("1-2@g.us", "X")));
        assert!(cache.put(ctx_in("3-4@g.us", "X")));
        assert_eq!(cache.len(), 2);

        let removed = cache.remove("3-4@g.us", "X").unwrap();
        assert_eq!(removed.chat_id, "3-4@g.us");
        assert!(cache.contains("1-2@g.us", "X"));
        assert!(cache.get("5-6@g.us", "X").is_none());
    }
}
