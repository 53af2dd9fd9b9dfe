//! In-process reference implementation of the shared resource pool.
//!
//! The real pool belongs to the embedding compositor; this one exists so
//! the demo binary and the end-to-end tests can run the whole pipeline in
//! one process. Every appearance of a child id in a received resource list
//! counts as one import unit, and units flow back through the child's
//! return sender once the id is no longer declared used: the exact
//! `(id, count)` round-trip the submission side balances its refs against.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use drawing::{ChildId, ParentResourcePool};
use frame_protocol::{ResourceId, ReturnedResource, TransferableResource};
use resources::ResourceReturnSender;
use slotmap::SlotMap;
use tracing::debug;

struct ChildRecord {
    return_sender: ResourceReturnSender,
    child_to_parent: HashMap<ResourceId, ResourceId>,
    import_counts: HashMap<ResourceId, u32>,
}

pub struct InProcessResourcePool {
    children: SlotMap<ChildId, ChildRecord>,
    next_parent_id: u32,
}

impl InProcessResourcePool {
    pub fn new() -> Self {
        Self {
            children: SlotMap::with_key(),
            next_parent_id: 1,
        }
    }
}

impl Default for InProcessResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ParentResourcePool for InProcessResourcePool {
    fn create_child(&mut self, return_sender: ResourceReturnSender) -> ChildId {
        self.children.insert(ChildRecord {
            return_sender,
            child_to_parent: HashMap::new(),
            import_counts: HashMap::new(),
        })
    }

    fn destroy_child(&mut self, child: ChildId) {
        let mut record = self
            .children
            .remove(child)
            .expect("destroy of unknown child id");
        let returned: Vec<ReturnedResource> = record
            .import_counts
            .drain()
            .map(|(id, count)| ReturnedResource::lost(id, count))
            .collect();
        debug!(resources = returned.len(), "child destroyed, returning imports as lost");
        record.return_sender.return_resources(returned);
    }

    fn receive_from_child(&mut self, child: ChildId, resources: &[TransferableResource]) {
        let record = self
            .children
            .get_mut(child)
            .expect("receive for unknown child id");
        for resource in resources {
            *record.import_counts.entry(resource.id).or_insert(0) += 1;
            if let Entry::Vacant(vacant) = record.child_to_parent.entry(resource.id) {
                let parent_id = ResourceId(self.next_parent_id);
                self.next_parent_id = self
                    .next_parent_id
                    .checked_add(1)
                    .expect("parent resource id overflow");
                vacant.insert(parent_id);
            }
        }
    }

    fn child_to_parent_map(&self, child: ChildId) -> &HashMap<ResourceId, ResourceId> {
        &self
            .children
            .get(child)
            .expect("map lookup for unknown child id")
            .child_to_parent
    }

    fn declare_used_resources_from_child(&mut self, child: ChildId, used: &HashSet<ResourceId>) {
        let record = self
            .children
            .get_mut(child)
            .expect("declare for unknown child id");
        let returnable: Vec<ResourceId> = record
            .import_counts
            .keys()
            .filter(|id| !used.contains(id))
            .copied()
            .collect();
        if returnable.is_empty() {
            return;
        }
        let mut returned = Vec::with_capacity(returnable.len());
        for id in returnable {
            let count = record
                .import_counts
                .remove(&id)
                .expect("returnable id has an import count");
            record.child_to_parent.remove(&id);
            returned.push(ReturnedResource::returned(id, count));
        }
        debug!(resources = returned.len(), "returning resources no longer in use");
        record.return_sender.return_resources(returned);
    }
}

#[cfg(test)]
mod tests {
    use super::InProcessResourcePool;
    use drawing::ParentResourcePool;
    use frame_protocol::{ResourceId, ReturnedResource, TransferableResource};
    use resources::{ResourceCollection, resource_return_channel};
    use std::collections::HashSet;

    fn resources(ids: &[u32]) -> Vec<TransferableResource> {
        ids.iter().map(|id| TransferableResource::with_id(*id)).collect()
    }

    #[test]
    fn receive_assigns_stable_parent_ids() {
        let (sender, _receiver) = resource_return_channel();
        let mut pool = InProcessResourcePool::new();
        let child = pool.create_child(sender);

        pool.receive_from_child(child, &resources(&[10, 11]));
        let first = *pool
            .child_to_parent_map(child)
            .get(&ResourceId(10))
            .expect("mapped id");
        pool.receive_from_child(child, &resources(&[10]));
        assert_eq!(
            pool.child_to_parent_map(child).get(&ResourceId(10)),
            Some(&first)
        );
        assert_eq!(pool.child_to_parent_map(child).len(), 2);
    }

    #[test]
    fn repeated_imports_accumulate_into_one_return_count() {
        let (sender, receiver) = resource_return_channel();
        let mut pool = InProcessResourcePool::new();
        let child = pool.create_child(sender);

        pool.receive_from_child(child, &resources(&[5]));
        pool.receive_from_child(child, &resources(&[5]));
        pool.declare_used_resources_from_child(child, &HashSet::new());

        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[5]));
        collection.ref_resources(&resources(&[5]));
        collection.ref_resources(&resources(&[5]));
        assert_eq!(receiver.drain_into(&mut collection), 1);
        assert_eq!(
            collection.take_unused_for_child(),
            vec![ReturnedResource::returned(ResourceId(5), 1)]
        );
    }

    #[test]
    fn declare_retains_used_ids_and_returns_the_rest() {
        let (sender, receiver) = resource_return_channel();
        let mut pool = InProcessResourcePool::new();
        let child = pool.create_child(sender);

        pool.receive_from_child(child, &resources(&[1, 2]));
        pool.declare_used_resources_from_child(child, &HashSet::from([ResourceId(1)]));

        assert!(pool.child_to_parent_map(child).contains_key(&ResourceId(1)));
        assert!(!pool.child_to_parent_map(child).contains_key(&ResourceId(2)));

        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[2]));
        collection.ref_resources(&resources(&[2]));
        receiver.drain_into(&mut collection);
        assert_eq!(
            collection.take_unused_for_child(),
            vec![ReturnedResource::returned(ResourceId(2), 1)]
        );
    }

    #[test]
    fn destroy_child_returns_everything_as_lost() {
        let (sender, receiver) = resource_return_channel();
        let mut pool = InProcessResourcePool::new();
        let child = pool.create_child(sender);
        pool.receive_from_child(child, &resources(&[8]));

        pool.destroy_child(child);

        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[8]));
        collection.ref_resources(&resources(&[8]));
        receiver.drain_into(&mut collection);
        assert_eq!(
            collection.take_unused_for_child(),
            vec![ReturnedResource::lost(ResourceId(8), 1)]
        );
    }
}
