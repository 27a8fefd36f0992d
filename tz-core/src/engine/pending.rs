//! Pending request set
//!
//! Outstanding watch requests keyed by id. Ids are allocated monotonically,
//! so iteration order is admission order. Only ever touched under the queue
//! lock.

use std::collections::BTreeMap;

use crate::data::{RequestId, WatchRequest};

#[derive(Debug, Default)]
pub struct PendingSet {
    members: BTreeMap<RequestId, WatchRequest>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: WatchRequest) {
        self.members.insert(request.id, request);
    }

    /// Remove a member. `None` means it was already retired.
    pub fn remove(&mut self, id: RequestId) -> Option<WatchRequest> {
        self.members.remove(&id)
    }

    pub fn get(&self, id: RequestId) -> Option<&WatchRequest> {
        self.members.get(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.members.contains_key(&id)
    }

    /// Stable copy of the current member ids, safe to walk while removing
    pub fn ids(&self) -> Vec<RequestId> {
        self.members.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchRequest> {
        self.members.values()
    }

    /// Take every member, leaving the set empty
    pub fn drain(&mut self) -> Vec<WatchRequest> {
        std::mem::take(&mut self.members).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::READING_SIZE;

    fn request(id: u64) -> WatchRequest {
        WatchRequest {
            id: RequestId::new(id),
            low: 10,
            high: 20,
            deadline: None,
            output_len: READING_SIZE,
        }
    }

    #[test]
    fn test_insert_remove() {
        let mut set = PendingSet::new();
        set.insert(request(1));
        set.insert(request(2));
        assert_eq!(set.len(), 2);
        assert!(set.contains(RequestId::new(1)));

        assert!(set.remove(RequestId::new(1)).is_some());
        assert!(set.remove(RequestId::new(1)).is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ids_snapshot_is_ordered_and_detached() {
        let mut set = PendingSet::new();
        for id in [3, 1, 2] {
            set.insert(request(id));
        }
        let ids = set.ids();
        assert_eq!(ids, vec![RequestId::new(1), RequestId::new(2), RequestId::new(3)]);

        for id in &ids {
            set.remove(*id);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_drain() {
        let mut set = PendingSet::new();
        set.insert(request(7));
        set.insert(request(8));
        let drained = set.drain();
        assert_eq!(drained.len(), 2);
        assert!(set.is_empty());
    }
}
