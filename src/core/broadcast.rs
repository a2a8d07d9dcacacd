use std::collections::HashMap;

use parking_lot::Mutex;
use prost::Message;

use crate::pb::NodeRecord;

/// A pending state change awaiting dissemination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BroadcastEntry {
    record: NodeRecord,
    audience: Option<String>,
    num_send: usize,
    /// Bytes the record takes inside a gossip batch.
    size: usize,
    seq: u64,
}

impl BroadcastEntry {
    pub(crate) fn new(record: NodeRecord, audience: Option<String>) -> Self {
        let len = record.encoded_len();
        // field key + length prefix + body
        let size = 1 + prost::length_delimiter_len(len) + len;

        Self {
            record,
            audience,
            num_send: 0,
            size,
            seq: 0,
        }
    }

    pub(crate) fn record(&self) -> &NodeRecord {
        &self.record
    }

    fn is_addressed_to(&self, tags: &HashMap<String, String>) -> bool {
        match &self.audience {
            Some(audience) => tags.values().any(|v| v == audience),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    entries: Vec<BroadcastEntry>,
    next_seq: u64,
}

/// The queue of pending gossip. Each entry is handed out at most `max_send` times.
#[derive(Debug)]
pub(crate) struct BroadcastQueue {
    inner: Mutex<QueueInner>,
    max_send: usize,
}

impl BroadcastQueue {
    pub(crate) fn new(max_send: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            max_send: max_send.max(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Queues an entry. Older entries about the same member are dropped.
    pub(crate) fn enqueue(&self, mut entry: BroadcastEntry) {
        let mut inner = self.inner.lock();

        entry.seq = inner.next_seq;
        inner.next_seq += 1;

        let id = &entry.record.id;
        inner.entries.retain(|e| &e.record.id != id);
        inner.entries.push(entry);
    }

    /// Selects the entries for one recipient.
    ///
    /// Entries are taken least sent first, then oldest first, skipping those whose audience
    /// the recipient does not carry, until adding another entry would exceed `max_bytes`.
    /// Each returned entry counts as sent once; entries reaching `max_send` are removed.
    pub(crate) fn drain_for_dissemination(
        &self,
        max_bytes: usize,
        tags: &HashMap<String, String>,
    ) -> Vec<NodeRecord> {
        let mut inner = self.inner.lock();
        inner.entries.sort_by_key(|e| (e.num_send, e.seq));

        let mut current_size = 0;
        let mut records = Vec::new();

        for entry in inner.entries.iter_mut() {
            if !entry.is_addressed_to(tags) || current_size + entry.size > max_bytes {
                continue;
            }

            current_size += entry.size;
            entry.num_send += 1;
            records.push(entry.record.clone());
        }

        let max_send = self.max_send;
        inner.entries.retain(|e| e.num_send < max_send);

        records
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> Vec<BroadcastEntry> {
        self.inner.lock().entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use prost::Message;

    use crate::pb::{swim_message::Gossip, NodeRecord, NodeState};

    use super::{BroadcastEntry, BroadcastQueue};

    fn record(id: &str, incarnation: u64) -> NodeRecord {
        NodeRecord::new(id, "127.0.0.1:8080".parse().unwrap(), id, incarnation)
    }

    #[test]
    fn test_broadcast_queue_removes_after_max_send() {
        let queue = BroadcastQueue::new(2);
        queue.enqueue(BroadcastEntry::new(record("NODE_B", 1), None));

        let no_tags = HashMap::new();
        assert_eq!(queue.drain_for_dissemination(1400, &no_tags).len(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_for_dissemination(1400, &no_tags).len(), 1);
        assert!(queue.is_empty());
        assert!(queue.drain_for_dissemination(1400, &no_tags).is_empty());
    }

    #[test]
    fn test_broadcast_queue_respects_max_bytes() {
        let queue = BroadcastQueue::new(10);
        for i in 0..50 {
            queue.enqueue(BroadcastEntry::new(record(&format!("NODE_{i}"), 1), None));
        }

        let records = queue.drain_for_dissemination(200, &HashMap::new());
        assert!(!records.is_empty());
        assert!(records.len() < 50);

        let batch = Gossip { records };
        assert!(batch.encoded_len() <= 200);
    }

    #[test]
    fn test_broadcast_queue_prefers_least_sent() {
        let queue = BroadcastQueue::new(10);
        let entry = BroadcastEntry::new(record("NODE_B", 1), None);
        let size = entry.size;
        queue.enqueue(entry);

        // only room for one entry per drain
        let first = queue.drain_for_dissemination(size, &HashMap::new());
        assert_eq!(first[0].id, "NODE_B");

        queue.enqueue(BroadcastEntry::new(record("NODE_C", 1), None));
        let second = queue.drain_for_dissemination(size, &HashMap::new());
        assert_eq!(second[0].id, "NODE_C");
    }

    #[test]
    fn test_broadcast_queue_audience_filter() {
        let queue = BroadcastQueue::new(10);
        queue.enqueue(BroadcastEntry::new(
            record("NODE_B", 1),
            Some("storage".to_string()),
        ));
        queue.enqueue(BroadcastEntry::new(record("NODE_C", 1), None));

        let records = queue.drain_for_dissemination(1400, &HashMap::new());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "NODE_C");

        let tags = HashMap::from([("role".to_string(), "storage".to_string())]);
        let records = queue.drain_for_dissemination(1400, &tags);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_broadcast_queue_newer_entry_supersedes_older() {
        let queue = BroadcastQueue::new(10);
        queue.enqueue(BroadcastEntry::new(record("NODE_B", 1), None));
        queue.enqueue(BroadcastEntry::new(
            record("NODE_B", 1).with_state(NodeState::Suspect),
            None,
        ));

        let entries = queue.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record().state(), NodeState::Suspect);
    }
}
