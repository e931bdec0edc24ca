//! Received solicited messages that still await a response.

use std::collections::BTreeMap;

use syncsocket_core::Message;

/// Index → solicited message, bounded by a capacity.
///
/// When an insert would exceed the capacity the oldest entries (lowest
/// index) are evicted and returned to the caller.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: BTreeMap<u64, Message>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message`, keeping at most `capacity` entries.
    pub fn insert(&mut self, message: Message, capacity: usize) -> Vec<Message> {
        self.entries.insert(message.index, message);

        let capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            match self.entries.pop_first() {
                Some((_, oldest)) => evicted.push(oldest),
                None => break,
            }
        }
        evicted
    }

    /// Remove the entry answered by a response to `index`.
    pub fn remove(&mut self, index: u64) -> Option<Message> {
        self.entries.remove(&index)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn solicited(index: u64) -> Message {
        Message::solicited(index, "q", Value::Null)
    }

    #[test]
    fn test_insert_and_remove() {
        let mut table = PendingTable::new();
        assert!(table.insert(solicited(1), 8).is_empty());
        assert!(table.insert(solicited(2), 8).is_empty());
        assert!(table.contains(1));

        assert_eq!(table.remove(1).map(|m| m.index), Some(1));
        assert!(table.remove(1).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut table = PendingTable::new();
        table.insert(solicited(5), 2);
        table.insert(solicited(6), 2);
        let evicted = table.insert(solicited(7), 2);

        assert_eq!(evicted.iter().map(|m| m.index).collect::<Vec<_>>(), vec![5]);
        assert_eq!(
            table.messages().iter().map(|m| m.index).collect::<Vec<_>>(),
            vec![6, 7]
        );
    }

    #[test]
    fn test_shrunk_capacity_evicts_several() {
        let mut table = PendingTable::new();
        for i in 1..=4 {
            table.insert(solicited(i), 10);
        }
        let evicted = table.insert(solicited(5), 2);
        assert_eq!(evicted.len(), 3);
        assert!(table.contains(4) && table.contains(5));
    }
}
