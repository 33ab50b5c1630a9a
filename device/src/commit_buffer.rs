//! Deferred commit queue.
//!
//! Committing an object only queues it. The queue is flushed before the
//! next render (or an explicit finalize), in dependency order, so every
//! object is finalized after the objects it references.

use std::collections::HashSet;

use anari_cycles_core::timestamp::TimeStamp;

use crate::object::ObjectHandle;

#[derive(Debug, Default)]
pub struct CommitBuffer {
    queue: Vec<ObjectHandle>,
    pending: HashSet<ObjectHandle>,
    last_object_finalization: TimeStamp,
}

impl CommitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an object. Returns `false` if it was already queued.
    pub fn add(&mut self, handle: ObjectHandle) -> bool {
        if !self.pending.insert(handle) {
            return false;
        }
        self.queue.push(handle);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drains the queue, ordered by flush priority.
    pub fn take_sorted(&mut self) -> Vec<ObjectHandle> {
        let mut batch = std::mem::take(&mut self.queue);
        self.pending.clear();
        batch.sort_by_key(|h| h.flush_priority());
        batch
    }

    /// Drops a queued object, e.g. one being released.
    pub fn remove(&mut self, handle: ObjectHandle) {
        if self.pending.remove(&handle) {
            self.queue.retain(|h| *h != handle);
        }
    }

    /// Stamp of the most recent object finalization.
    pub fn last_object_finalization(&self) -> TimeStamp {
        self.last_object_finalization
    }

    pub fn mark_finalization(&mut self, stamp: TimeStamp) {
        self.last_object_finalization = stamp;
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::surface::Surface;
    use anari_cycles_core::Arena;

    #[test]
    fn test_dedup_and_order() {
        let mut surfaces: Arena<Surface> = Arena::new();
        let mut geometries: Arena<Geometry> = Arena::new();
        let s = ObjectHandle::from(surfaces.insert(Surface::new()));
        let g = ObjectHandle::from(geometries.insert(Geometry::new("triangle")));

        let mut buffer = CommitBuffer::new();
        assert!(buffer.add(s));
        assert!(!buffer.add(s));
        assert!(buffer.add(g));
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.take_sorted(), vec![g, s]);
        assert!(buffer.is_empty());
        assert!(buffer.add(s));
    }

    #[test]
    fn test_remove() {
        let mut surfaces: Arena<Surface> = Arena::new();
        let s = ObjectHandle::from(surfaces.insert(Surface::new()));
        let mut buffer = CommitBuffer::new();
        buffer.add(s);
        buffer.remove(s);
        assert!(buffer.is_empty());
    }
}
