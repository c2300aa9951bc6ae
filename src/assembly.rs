//! Reassembly of received fragments into whole messages.
//!
//! Fragments arrive over UDP, so out-of-order delivery and duplicates are
//! normal. A [`MessageBuffer`] collects one session's fragments; a
//! [`MessageCache`] keeps a bounded number of in-flight sessions and evicts
//! the oldest once full.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::{QueryChunk, SessionId};

/// Fragment collector for a single session
#[derive(Debug, Default)]
pub struct MessageBuffer {
    parts: HashMap<u8, String>,
    /// Fixed by the last-flagged fragment; unknown until it arrives
    expected: Option<u8>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fragment, returning whether the session is now complete.
    /// Duplicate fragments are idempotent.
    pub fn insert(&mut self, chunk: QueryChunk) -> bool {
        if chunk.last {
            self.expected = Some(chunk.index + 1);
        }
        self.parts.insert(chunk.index, chunk.content);
        self.is_complete()
    }

    /// True once the last fragment and every index before it have arrived.
    pub fn is_complete(&self) -> bool {
        self.expected
            .map_or(false, |total| self.parts.len() == total as usize)
    }

    /// Concatenate the collected fragments in index order.
    ///
    /// Intended for complete sessions; a partial buffer yields whatever has
    /// arrived so far with gaps silently skipped.
    pub fn message(&self) -> String {
        let mut indices: Vec<u8> = self.parts.keys().copied().collect();
        indices.sort_unstable();

        let mut content = String::new();
        for index in indices {
            content.push_str(&self.parts[&index]);
        }
        content
    }
}

/// Bounded store of in-flight sessions keyed by session id.
///
/// Eviction is oldest-first over session arrival order, which is enough to
/// stop abandoned transfers from pinning memory on small receivers.
#[derive(Debug)]
pub struct MessageCache {
    buffers: HashMap<SessionId, MessageBuffer>,
    order: VecDeque<SessionId>,
    cache_size: usize,
}

impl MessageCache {
    pub fn new(cache_size: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            order: VecDeque::new(),
            cache_size,
        }
    }

    /// Route a fragment to its session's buffer, returning whether that
    /// session is now complete.
    pub fn insert(&mut self, chunk: QueryChunk) -> bool {
        let id = chunk.id;
        let buffer = self.buffers.entry(id).or_default();
        let complete = buffer.insert(chunk);

        if !self.order.contains(&id) {
            self.order.push_front(id);
        }
        if self.order.len() > self.cache_size {
            if let Some(evicted) = self.order.pop_back() {
                info!("evicting stale session {}", evicted);
                self.buffers.remove(&evicted);
            }
        }

        if complete {
            debug!("session {} complete", id);
        }
        complete
    }

    /// The reassembled payload text of a completed session, or `None` if
    /// the session is unknown or still missing fragments.
    pub fn message(&self, id: &SessionId) -> Option<String> {
        self.buffers
            .get(id)
            .filter(|buffer| buffer.is_complete())
            .map(|buffer| buffer.message())
    }

    /// Remove a completed session and hand back its payload text.
    pub fn take(&mut self, id: &SessionId) -> Option<String> {
        let message = self.message(id)?;
        self.buffers.remove(id);
        self.order.retain(|tracked| tracked != id);
        Some(message)
    }

    /// Number of sessions currently buffered.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryEncoder, MAX_QUERY_LEN};
    use data_encoding::BASE32_NOPAD;

    fn chunk(raw: &str) -> QueryChunk {
        QueryChunk::parse(raw, "foo.co").unwrap()
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[test]
    fn test_two_fragment_message() {
        let mut cache = MessageCache::new(3);
        assert!(!cache.insert(chunk("AADDDDDDDDDDDDDDPMRGM33PEI5.foo.co")));
        assert!(cache.insert(chunk("BBDDDDDDDDDDDDDDCEYTBOIRH2.foo.co")));

        let text = cache.message(&sid("DDDDDDDDDDDDD")).unwrap();
        assert_eq!(text, "PMRGM33PEI5CEYTBOIRH2");
        assert_eq!(
            BASE32_NOPAD.decode(text.as_bytes()).unwrap(),
            b"{\"foo\":\"bar\"}"
        );
    }

    #[test]
    fn test_out_of_order_and_duplicate_fragments() {
        // UDP gives no ordering or dedup guarantees
        let mut cache = MessageCache::new(3);
        assert!(!cache.insert(chunk("BBZ222222222222ZCEYTBOIRH2.foo.co")));
        assert!(cache.insert(chunk("AAZ222222222222ZPMRGM33PEI5.foo.co")));
        assert!(cache.insert(chunk("BBZ222222222222ZCEYTBOIRH2.foo.co")));

        let text = cache.message(&sid("Z222222222222")).unwrap();
        assert_eq!(text, "PMRGM33PEI5CEYTBOIRH2");
    }

    #[test]
    fn test_incomplete_session_yields_nothing() {
        let mut cache = MessageCache::new(3);
        cache.insert(chunk("AADDDDDDDDDDDDDDPMRGM33PEI5.foo.co"));
        assert_eq!(cache.message(&sid("DDDDDDDDDDDDD")), None);
    }

    #[test]
    fn test_oldest_session_evicted() {
        let mut cache = MessageCache::new(3);
        cache.insert(chunk("AAAAAAAAAAAAAAAAPMRGM33PEI5.foo.co"));
        cache.insert(chunk("AA22222222222222FOO.foo.co"));
        cache.insert(chunk("AA33333333333333FOO.foo.co"));
        cache.insert(chunk("AA44444444444444FOO.foo.co"));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.message(&sid("AAAAAAAAAAAAA")), None);
        assert!(cache.buffers.contains_key(&sid("2222222222222")));
    }

    #[test]
    fn test_take_removes_session() {
        let mut cache = MessageCache::new(3);
        cache.insert(chunk("AADDDDDDDDDDDDDDPMRGM33PEI5.foo.co"));
        cache.insert(chunk("BBDDDDDDDDDDDDDDCEYTBOIRH2.foo.co"));

        let text = cache.take(&sid("DDDDDDDDDDDDD")).unwrap();
        assert_eq!(text, "PMRGM33PEI5CEYTBOIRH2");
        assert!(cache.is_empty());
        assert_eq!(cache.take(&sid("DDDDDDDDDDDDD")), None);
    }

    #[test]
    fn test_end_to_end_reassembly() {
        let enc = QueryEncoder::new("tunnel.example.com");
        let id = sid("TRACKER2AB3CD");
        let raw: Vec<u8> = (0u16..300).map(|i| (i % 251) as u8).collect();

        let queries = enc.encode_message(&id, &raw, MAX_QUERY_LEN).unwrap();
        assert!(queries.len() > 1, "payload should span several queries");

        let mut cache = MessageCache::new(8);
        let mut complete = false;
        // reversed order on purpose
        for q in queries.iter().rev() {
            complete = cache.insert(QueryChunk::parse(q, "tunnel.example.com").unwrap());
        }
        assert!(complete);

        let text = cache.take(&id).unwrap();
        assert_eq!(text, QueryEncoder::encode_payload(&raw));
        assert_eq!(BASE32_NOPAD.decode(text.as_bytes()).unwrap(), raw);
    }
}
