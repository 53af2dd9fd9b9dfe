use std::collections::HashMap;

use frame_protocol::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegistryEntry {
    pub(crate) ref_count: u32,
    pub(crate) lost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecrementOutcome {
    Untracked,
    Remaining(u32),
    ReachedZero,
    Underflow,
}

/// The per-connection table mapping a resource id to its reference count
/// and lost flag. Single-writer: only `ResourceCollection` mutates it.
#[derive(Debug, Default)]
pub(crate) struct ResourceRegistry {
    entries: HashMap<ResourceId, RegistryEntry>,
}

impl ResourceRegistry {
    pub(crate) fn insert_if_absent(&mut self, id: ResourceId) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            RegistryEntry {
                ref_count: 0,
                lost: false,
            },
        );
        true
    }

    pub(crate) fn increment(&mut self, id: ResourceId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.ref_count = entry
            .ref_count
            .checked_add(1)
            .expect("resource ref count overflow");
        true
    }

    /// Decrement by `count` units. Reaching zero removes the entry; the id
    /// is never reused while referenced, so a dead entry stays dead.
    pub(crate) fn decrement(&mut self, id: ResourceId, count: u32) -> DecrementOutcome {
        let Some(entry) = self.entries.get_mut(&id) else {
            return DecrementOutcome::Untracked;
        };
        if count > entry.ref_count {
            return DecrementOutcome::Underflow;
        }
        entry.ref_count -= count;
        if entry.ref_count == 0 {
            self.entries.remove(&id);
            DecrementOutcome::ReachedZero
        } else {
            DecrementOutcome::Remaining(entry.ref_count)
        }
    }

    pub(crate) fn drain_all(&mut self) -> Vec<(ResourceId, RegistryEntry)> {
        self.entries.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{DecrementOutcome, ResourceRegistry};
    use frame_protocol::ResourceId;

    #[test]
    fn insert_is_idempotent_per_id() {
        let mut registry = ResourceRegistry::default();
        assert!(registry.insert_if_absent(ResourceId(1)));
        assert!(!registry.insert_if_absent(ResourceId(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn decrement_to_zero_removes_the_entry() {
        let mut registry = ResourceRegistry::default();
        registry.insert_if_absent(ResourceId(4));
        assert!(registry.increment(ResourceId(4)));
        assert!(registry.increment(ResourceId(4)));

        assert_eq!(
            registry.decrement(ResourceId(4), 1),
            DecrementOutcome::Remaining(1)
        );
        assert_eq!(
            registry.decrement(ResourceId(4), 1),
            DecrementOutcome::ReachedZero
        );
        assert_eq!(
            registry.decrement(ResourceId(4), 1),
            DecrementOutcome::Untracked
        );
    }

    #[test]
    fn decrement_past_zero_reports_underflow_without_corruption() {
        let mut registry = ResourceRegistry::default();
        registry.insert_if_absent(ResourceId(9));
        registry.increment(ResourceId(9));

        assert_eq!(
            registry.decrement(ResourceId(9), 2),
            DecrementOutcome::Underflow
        );
        // The entry keeps its prior count untouched.
        assert_eq!(
            registry.decrement(ResourceId(9), 1),
            DecrementOutcome::ReachedZero
        );
    }
}
