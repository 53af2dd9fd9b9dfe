use std::collections::{HashMap, HashSet};

use frame_protocol::{ResourceId, ReturnedResource, TransferableResource};
use tracing::{debug, warn};

use crate::registry::{DecrementOutcome, ResourceRegistry};

/// Notified when the unused set transitions from empty to non-empty. The
/// client is expected to drain via `take_unused_for_child`, not to assume
/// one notification per unref. Implementations must not call back into the
/// collection; post a task into the owning domain instead.
pub trait CollectionClient {
    fn on_unused_resources_available(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct UnusedEntry {
    count: u32,
    lost: bool,
}

/// Owns the resource registry for one child connection.
///
/// All registry mutation funnels through this API from the submission
/// domain; the draw-domain return path reaches it only via drained
/// `ReturnedResource` batches.
#[derive(Default)]
pub struct ResourceCollection {
    registry: ResourceRegistry,
    unused: HashMap<ResourceId, UnusedEntry>,
    // Ids cleared by lose_all_resources; in-flight unrefs for these are
    // absorbed as no-ops until the id is received again.
    lost_ids: HashSet<ResourceId>,
    client: Option<Box<dyn CollectionClient + Send>>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_client(&mut self, client: Box<dyn CollectionClient + Send>) {
        self.client = Some(client);
    }

    /// Track each resource not already tracked, with a zero ref count.
    /// Receiving an already-tracked id has no effect.
    pub fn receive_resources(&mut self, resources: &[TransferableResource]) {
        #[cfg(debug_assertions)]
        {
            let mut seen = HashSet::new();
            for resource in resources {
                debug_assert!(
                    seen.insert(resource.id),
                    "duplicate resource id in one resource list"
                );
            }
        }
        for resource in resources {
            self.lost_ids.remove(&resource.id);
            self.registry.insert_if_absent(resource.id);
        }
    }

    /// Increment the ref count of every listed id by one. The ids must be
    /// tracked; reffing an untracked id is a caller sequencing bug.
    pub fn ref_resources(&mut self, resources: &[TransferableResource]) {
        for resource in resources {
            if !self.registry.increment(resource.id) {
                debug_assert!(false, "ref of untracked resource id");
                warn!(id = resource.id.0, "ignoring ref of untracked resource");
            }
        }
    }

    /// Absorb `{id, count}` decrements from any retaining party. Entries
    /// reaching zero move into the unused set; the client is notified once
    /// per empty-to-non-empty transition of that set.
    pub fn unref_resources(&mut self, returned: &[ReturnedResource]) {
        let was_empty = self.unused.is_empty();
        for item in returned {
            match self.registry.decrement(item.id, item.count) {
                DecrementOutcome::Remaining(_) => {}
                DecrementOutcome::ReachedZero => {
                    let entry = self.unused.entry(item.id).or_insert(UnusedEntry {
                        count: 0,
                        lost: false,
                    });
                    entry.count += 1;
                    entry.lost |= item.lost;
                }
                DecrementOutcome::Untracked => {
                    if self.lost_ids.contains(&item.id) {
                        debug!(id = item.id.0, "absorbing unref of lost resource");
                    } else {
                        debug_assert!(false, "unref of untracked resource id");
                        warn!(id = item.id.0, "ignoring unref of untracked resource");
                    }
                }
                DecrementOutcome::Underflow => {
                    debug_assert!(false, "unref below zero for resource id");
                    warn!(
                        id = item.id.0,
                        count = item.count,
                        "ignoring unref below zero"
                    );
                }
            }
        }
        self.notify_if_became_collectible(was_empty);
    }

    /// Atomically drain the unused set. `count` is the number of
    /// zero-transitions absorbed for that id since the previous drain, the
    /// unit the child needs to balance its own GPU-object ref counts. A
    /// drained id is never returned twice.
    pub fn take_unused_for_child(&mut self) -> Vec<ReturnedResource> {
        self.unused
            .drain()
            .map(|(id, entry)| ReturnedResource {
                id,
                count: entry.count,
                lost: entry.lost,
            })
            .collect()
    }

    /// Promote every tracked resource to the unused set immediately,
    /// bypassing the wait for its ref count to reach zero. Returns whether
    /// anything was lost. Later unrefs for the cleared ids are no-ops.
    pub fn lose_all_resources(&mut self) -> bool {
        let drained = self.registry.drain_all();
        if drained.is_empty() {
            return false;
        }
        let was_empty = self.unused.is_empty();
        let lost_count = drained.len();
        for (id, _entry) in drained {
            let unused = self.unused.entry(id).or_insert(UnusedEntry {
                count: 0,
                lost: true,
            });
            unused.count += 1;
            unused.lost = true;
            self.lost_ids.insert(id);
        }
        warn!(resources = lost_count, "lost all resources for connection");
        self.notify_if_became_collectible(was_empty);
        true
    }

    pub fn tracked_resource_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether nothing is tracked and nothing waits for pickup.
    pub fn is_drained(&self) -> bool {
        self.registry.is_empty() && self.unused.is_empty()
    }

    fn notify_if_became_collectible(&mut self, was_empty: bool) {
        if was_empty && !self.unused.is_empty() {
            if let Some(client) = self.client.as_mut() {
                client.on_unused_resources_available();
            }
        }
    }
}

impl std::fmt::Debug for ResourceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCollection")
            .field("registry", &self.registry)
            .field("unused", &self.unused)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionClient, ResourceCollection};
    use frame_protocol::{ResourceId, ReturnedResource, TransferableResource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        notifications: Arc<AtomicUsize>,
    }

    impl CollectionClient for CountingClient {
        fn on_unused_resources_available(&mut self) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn resources(ids: &[u32]) -> Vec<TransferableResource> {
        ids.iter().map(|id| TransferableResource::with_id(*id)).collect()
    }

    fn unref_once(collection: &mut ResourceCollection, id: u32) {
        collection.unref_resources(&[ReturnedResource::returned(ResourceId(id), 1)]);
    }

    #[test]
    fn receive_twice_tracks_once() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[3]));
        collection.receive_resources(&resources(&[3]));
        assert_eq!(collection.tracked_resource_count(), 1);
    }

    #[test]
    fn unref_to_zero_moves_id_into_unused_set() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[1]));
        collection.ref_resources(&resources(&[1]));
        collection.ref_resources(&resources(&[1]));

        unref_once(&mut collection, 1);
        assert!(collection.take_unused_for_child().is_empty());

        unref_once(&mut collection, 1);
        let drained = collection.take_unused_for_child();
        assert_eq!(drained, vec![ReturnedResource::returned(ResourceId(1), 1)]);
    }

    #[test]
    fn take_unused_is_idempotent_without_new_unrefs() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[5]));
        collection.ref_resources(&resources(&[5]));
        unref_once(&mut collection, 5);

        assert_eq!(collection.take_unused_for_child().len(), 1);
        assert!(collection.take_unused_for_child().is_empty());
    }

    #[test]
    fn client_notified_once_per_transition_to_collectible() {
        let notifications = Arc::new(AtomicUsize::new(0));
        let mut collection = ResourceCollection::new();
        collection.set_client(Box::new(CountingClient {
            notifications: notifications.clone(),
        }));

        collection.receive_resources(&resources(&[1, 2]));
        collection.ref_resources(&resources(&[1, 2]));

        unref_once(&mut collection, 1);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        // A second id becoming unused while the set is non-empty does not
        // re-notify.
        unref_once(&mut collection, 2);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        assert_eq!(collection.take_unused_for_child().len(), 2);
        collection.receive_resources(&resources(&[3]));
        collection.ref_resources(&resources(&[3]));
        unref_once(&mut collection, 3);
        assert_eq!(notifications.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unref_units_accumulate_across_independent_return_paths() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[8]));
        collection.ref_resources(&resources(&[8]));
        collection.ref_resources(&resources(&[8]));
        collection.ref_resources(&resources(&[8]));

        collection.unref_resources(&[ReturnedResource::returned(ResourceId(8), 2)]);
        assert!(collection.take_unused_for_child().is_empty());
        collection.unref_resources(&[ReturnedResource::returned(ResourceId(8), 1)]);
        assert_eq!(collection.take_unused_for_child().len(), 1);
        assert!(collection.is_drained());
    }

    #[test]
    fn lose_all_promotes_referenced_resources_exactly_once() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[1, 2]));
        collection.ref_resources(&resources(&[1, 2]));

        assert!(collection.lose_all_resources());
        let mut drained = collection.take_unused_for_child();
        drained.sort_by_key(|item| item.id);
        assert_eq!(
            drained,
            vec![
                ReturnedResource::lost(ResourceId(1), 1),
                ReturnedResource::lost(ResourceId(2), 1),
            ]
        );

        assert!(!collection.lose_all_resources());
        assert!(collection.take_unused_for_child().is_empty());
    }

    #[test]
    fn in_flight_unrefs_after_loss_are_absorbed() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[4]));
        collection.ref_resources(&resources(&[4]));
        assert!(collection.lose_all_resources());
        collection.take_unused_for_child();

        // The draw-side return for the same generation lands late.
        unref_once(&mut collection, 4);
        assert!(collection.take_unused_for_child().is_empty());
        assert!(collection.is_drained());
    }

    #[test]
    #[should_panic(expected = "unref below zero")]
    fn unref_below_zero_is_a_programming_error() {
        let mut collection = ResourceCollection::new();
        collection.receive_resources(&resources(&[6]));
        collection.ref_resources(&resources(&[6]));
        collection.unref_resources(&[ReturnedResource::returned(ResourceId(6), 2)]);
    }

    #[test]
    #[should_panic(expected = "ref of untracked resource")]
    fn ref_of_untracked_id_is_a_programming_error() {
        let mut collection = ResourceCollection::new();
        collection.ref_resources(&resources(&[7]));
    }
}
