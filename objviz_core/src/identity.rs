//! Identity Registry: UUID → small stable integer handle.
//!
//! The registry is the only state carried from one frame to the next. It is
//! owned by the [`crate::FrameAssembler`], mutated only while a frame is in
//! its registering phase, and read-only while primitives are emitted.
//!
//! # Lifecycle
//!
//! - A UUID seen for the first time gets a handle: a recycled one if the
//!   free list has any (FIFO), otherwise the next fresh integer.
//! - A UUID that keeps appearing keeps its handle.
//! - Under [`EvictionPolicy::Recycle`], a UUID missing from the latest
//!   message gives its handle back to the free list.

use crate::object::PerceivedObject;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;
use uuid::Uuid;

/// Small integer standing in for an object's UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityHandle(pub u32);

impl std::fmt::Display for IdentityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happens to handles of UUIDs that stop appearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Release absent UUIDs and hand their handles to newcomers.
    #[default]
    Recycle,
    /// Keep every UUID ever seen. The registry only grows.
    Retain,
}

/// Outcome of one [`IdentityRegistry::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RefreshSummary {
    /// UUIDs of the message that already had a handle
    pub tracked: usize,
    /// UUIDs that received a handle in this refresh
    pub added: usize,
    /// Handles returned to the free list
    pub released: usize,
    /// UUIDs left without a handle because the handle space is exhausted
    pub unassigned: usize,
}

pub struct IdentityRegistry {
    handles: HashMap<Uuid, IdentityHandle>,
    free: VecDeque<IdentityHandle>,
    next_fresh: u64,
    capacity: u64,
    policy: EvictionPolicy,
}

impl IdentityRegistry {
    /// Registry able to hand out up to `capacity` distinct handles.
    pub fn new(policy: EvictionPolicy, capacity: u64) -> Self {
        Self {
            handles: HashMap::new(),
            free: VecDeque::new(),
            next_fresh: 0,
            capacity: capacity.min(u32::MAX as u64 + 1),
            policy,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EvictionPolicy::default(), u32::MAX as u64 + 1)
    }

    /// Bring the mapping in line with the objects of the latest message.
    pub fn refresh(&mut self, objects: &[PerceivedObject]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let present: HashSet<Uuid> = objects.iter().map(|o| o.object_id).collect();

        if self.policy == EvictionPolicy::Recycle {
            let mut released: Vec<IdentityHandle> = Vec::new();
            self.handles.retain(|uuid, handle| {
                if present.contains(uuid) {
                    true
                } else {
                    released.push(*handle);
                    false
                }
            });
            // HashMap order is arbitrary; sort so reuse order is reproducible.
            released.sort_unstable();
            summary.released = released.len();
            self.free.extend(released);
        }

        let mut seen_this_frame: HashSet<Uuid> = HashSet::with_capacity(objects.len());
        for object in objects {
            let uuid = object.object_id;
            if !seen_this_frame.insert(uuid) {
                continue;
            }
            if self.handles.contains_key(&uuid) {
                summary.tracked += 1;
                continue;
            }
            match self.allocate() {
                Some(handle) => {
                    self.handles.insert(uuid, handle);
                    summary.added += 1;
                }
                None => summary.unassigned += 1,
            }
        }

        if summary.unassigned > 0 {
            warn!(
                "Identity handle space exhausted: {} objects left unassigned (capacity {})",
                summary.unassigned, self.capacity
            );
        }

        summary
    }

    fn allocate(&mut self) -> Option<IdentityHandle> {
        if let Some(handle) = self.free.pop_front() {
            return Some(handle);
        }
        if self.next_fresh < self.capacity {
            let handle = IdentityHandle(self.next_fresh as u32);
            self.next_fresh += 1;
            Some(handle)
        } else {
            None
        }
    }

    /// Handle of a UUID registered by a refresh, if any.
    pub fn handle_of(&self, uuid: &Uuid) -> Option<IdentityHandle> {
        self.handles.get(uuid).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Pose, Shape};
    use proptest::prelude::*;

    fn object(id: Uuid) -> PerceivedObject {
        PerceivedObject::new(id, Shape::bounding_box(4.0, 2.0, 1.5), Pose::default())
    }

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_new_uuids_get_fresh_handles() {
        let mut registry = IdentityRegistry::with_defaults();
        let summary = registry.refresh(&[object(uuid(1)), object(uuid(2))]);

        assert_eq!(summary.added, 2);
        assert_eq!(registry.handle_of(&uuid(1)), Some(IdentityHandle(0)));
        assert_eq!(registry.handle_of(&uuid(2)), Some(IdentityHandle(1)));
        assert_eq!(registry.handle_of(&uuid(3)), None);
    }

    #[test]
    fn test_handle_persists_across_refreshes() {
        let mut registry = IdentityRegistry::with_defaults();
        registry.refresh(&[object(uuid(7)), object(uuid(8))]);
        let before = registry.handle_of(&uuid(8));

        let summary = registry.refresh(&[object(uuid(9)), object(uuid(8))]);
        assert_eq!(registry.handle_of(&uuid(8)), before);
        assert_eq!(summary.tracked, 1);
    }

    #[test]
    fn test_recycle_reuses_released_handle() {
        let mut registry = IdentityRegistry::new(EvictionPolicy::Recycle, 1024);
        registry.refresh(&[object(uuid(1)), object(uuid(2))]);
        let freed = registry.handle_of(&uuid(1)).unwrap();

        let summary = registry.refresh(&[object(uuid(2)), object(uuid(3))]);
        assert_eq!(summary.released, 1);
        assert_eq!(registry.handle_of(&uuid(1)), None);
        assert_eq!(registry.handle_of(&uuid(3)), Some(freed));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_retain_never_evicts() {
        let mut registry = IdentityRegistry::new(EvictionPolicy::Retain, 1024);
        registry.refresh(&[object(uuid(1))]);
        registry.refresh(&[object(uuid(2))]);
        registry.refresh(&[]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handle_of(&uuid(1)), Some(IdentityHandle(0)));
        assert_eq!(registry.handle_of(&uuid(2)), Some(IdentityHandle(1)));
        assert_eq!(registry.free_count(), 0);
    }

    #[test]
    fn test_capacity_exhaustion_leaves_objects_unassigned() {
        let mut registry = IdentityRegistry::new(EvictionPolicy::Recycle, 2);
        let summary = registry.refresh(&[object(uuid(1)), object(uuid(2)), object(uuid(3))]);

        assert_eq!(summary.added, 2);
        assert_eq!(summary.unassigned, 1);
        assert_eq!(registry.handle_of(&uuid(3)), None);

        // Once a slot frees up the newcomer is served.
        registry.refresh(&[object(uuid(2)), object(uuid(3))]);
        assert!(registry.handle_of(&uuid(3)).is_some());
    }

    #[test]
    fn test_duplicate_uuid_in_one_message_gets_one_handle() {
        let mut registry = IdentityRegistry::with_defaults();
        let summary = registry.refresh(&[object(uuid(5)), object(uuid(5))]);
        assert_eq!(summary.added, 1);
        assert_eq!(registry.len(), 1);
    }

    proptest! {
        /// Present UUIDs never share a handle, and a UUID present in two
        /// consecutive frames keeps the same handle.
        #[test]
        fn prop_persistence_and_exclusivity(
            frames in prop::collection::vec(prop::collection::vec(0u128..24, 0..12), 1..20),
            retain in any::<bool>(),
        ) {
            let policy = if retain { EvictionPolicy::Retain } else { EvictionPolicy::Recycle };
            let mut registry = IdentityRegistry::new(policy, 1 << 16);
            let mut previous: HashMap<Uuid, IdentityHandle> = HashMap::new();

            for frame in frames {
                let objects: Vec<PerceivedObject> = frame.iter().map(|n| object(uuid(*n))).collect();
                registry.refresh(&objects);

                let mut current: HashMap<Uuid, IdentityHandle> = HashMap::new();
                let mut used: HashSet<IdentityHandle> = HashSet::new();
                for o in &objects {
                    let handle = registry.handle_of(&o.object_id).unwrap();
                    if current.insert(o.object_id, handle).is_none() {
                        prop_assert!(used.insert(handle), "handle {} shared", handle);
                    }
                    if let Some(old) = previous.get(&o.object_id) {
                        prop_assert_eq!(*old, handle);
                    }
                }
                previous = current;
            }
        }
    }
}
