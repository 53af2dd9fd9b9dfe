//! The frame provider: holds exactly one current frame on behalf of one or
//! more observers, accumulates per-observer damage between pulls, and
//! forwards resource add/remove traffic to the resource collection.
//!
//! Observers are opaque slotmap handles; fan-out never stores pointers back
//! into the layers that own the handles. The provider also owns the
//! receiving end of the resource-return mailbox, so asynchronous returns
//! from the draw side are applied to the registry only when the submission
//! domain drains them.

use std::sync::{Arc, Mutex};

use frame_protocol::{DelegatedFrame, ReturnedResource};
use geometry::{Rect, Size};
use resources::{
    ResourceCollection, ResourceReturnReceiver, ResourceReturnSender, resource_return_channel,
};
use slotmap::SlotMap;
use tracing::debug;

slotmap::new_key_type! {
    pub struct ObserverId;
}

#[derive(Debug, Clone, Copy)]
struct ObserverRecord {
    accumulated_damage: Rect,
}

pub struct FrameProvider {
    collection: Arc<Mutex<ResourceCollection>>,
    current_frame: DelegatedFrame,
    frame_size: Size,
    observers: SlotMap<ObserverId, ObserverRecord>,
    return_sender: ResourceReturnSender,
    return_receiver: ResourceReturnReceiver,
}

impl FrameProvider {
    /// A provider is born holding a frame; its size fixes the size of every
    /// frame this provider will ever hold. A size change upstream requires
    /// constructing a new provider.
    pub fn new(collection: Arc<Mutex<ResourceCollection>>, initial_frame: DelegatedFrame) -> Self {
        let root = initial_frame
            .root_render_pass()
            .expect("initial frame must have a root render pass");
        assert!(
            !root.output_rect.is_empty(),
            "root render pass output rect must not be empty"
        );
        let frame_size = root.output_rect.size();
        {
            let mut collection = lock_collection(&collection);
            collection.receive_resources(&initial_frame.resource_list);
            collection.ref_resources(&initial_frame.resource_list);
        }
        let (return_sender, return_receiver) = resource_return_channel();
        Self {
            collection,
            current_frame: initial_frame,
            frame_size,
            observers: SlotMap::with_key(),
            return_sender,
            return_receiver,
        }
    }

    pub fn frame_size(&self) -> Size {
        self.frame_size
    }

    /// Register a new observer. Its first pull sees full-frame damage no
    /// matter how many frames preceded registration.
    pub fn register_observer(&mut self) -> ObserverId {
        self.observers.insert(ObserverRecord {
            accumulated_damage: Rect::from_size(self.frame_size),
        })
    }

    pub fn unregister_observer(&mut self, observer: ObserverId) {
        let removed = self.observers.remove(observer);
        debug_assert!(removed.is_some(), "unregister of unknown observer handle");
    }

    /// Replace the current frame: unref the previous frame's resources,
    /// receive and ref the new frame's, and union the new root damage into
    /// every observer record. Returns the observer handles whose owning
    /// layers must be told a new frame is available.
    pub fn set_frame_data(&mut self, new_frame: DelegatedFrame) -> Vec<ObserverId> {
        let root = new_frame
            .root_render_pass()
            .expect("frame must have a root render pass");
        assert!(
            !root.output_rect.is_empty(),
            "root render pass output rect must not be empty"
        );
        assert_eq!(
            root.output_rect.size(),
            self.frame_size,
            "all frames on one provider share one frame size"
        );
        let new_damage = root.damage_rect;

        {
            let mut collection = lock_collection(&self.collection);
            collection.unref_resources(&self.current_frame.per_resource_return_units());
            collection.receive_resources(&new_frame.resource_list);
            collection.ref_resources(&new_frame.resource_list);
        }
        self.current_frame = new_frame;

        for record in self.observers.values_mut() {
            record.accumulated_damage = record.accumulated_damage.union(new_damage);
        }
        debug!(
            observers = self.observers.len(),
            resources = self.current_frame.resource_list.len(),
            "frame replaced"
        );
        self.observers.keys().collect()
    }

    /// Hand the current frame to an observer. The observer's accumulated
    /// damage is returned and reset to empty, and every resource in the
    /// frame gains one ref the caller must eventually balance.
    pub fn get_frame_and_ref_resources(&mut self, observer: ObserverId) -> (DelegatedFrame, Rect) {
        let record = self
            .observers
            .get_mut(observer)
            .expect("get_frame_and_ref_resources for unknown observer handle");
        let damage = std::mem::replace(&mut record.accumulated_damage, Rect::zero());
        lock_collection(&self.collection).ref_resources(&self.current_frame.resource_list);
        (self.current_frame.clone(), damage)
    }

    /// Pass-through for any retaining party releasing its hold from the
    /// submission domain.
    pub fn unref_resources_on_main_thread(&self, returned: &[ReturnedResource]) {
        lock_collection(&self.collection).unref_resources(returned);
    }

    /// A clonable sender the child connection's consumer may invoke from
    /// any thread.
    pub fn resource_return_sender(&self) -> ResourceReturnSender {
        self.return_sender.clone()
    }

    /// Re-post parked return batches into the submission domain. Returns
    /// the number of batches applied.
    pub fn drain_returned_resources(&self) -> usize {
        self.return_receiver
            .drain_into(&mut lock_collection(&self.collection))
    }
}

impl Drop for FrameProvider {
    fn drop(&mut self) {
        // Release the provider's own hold on the current frame exactly
        // once, after absorbing any returns still parked in the mailbox.
        if let Ok(mut collection) = self.collection.lock() {
            self.return_receiver.drain_into(&mut collection);
            collection.unref_resources(&self.current_frame.per_resource_return_units());
        }
    }
}

fn lock_collection(
    collection: &Arc<Mutex<ResourceCollection>>,
) -> std::sync::MutexGuard<'_, ResourceCollection> {
    collection
        .lock()
        .expect("resource collection mutex should not be poisoned")
}
