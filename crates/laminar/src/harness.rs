//! The two-phase commit harness connecting the submission domain to the
//! draw domain.
//!
//! Phase 1 (commit) applies each pending payload to the pending tree's
//! drawing layer; phase 2 (activation) pushes the staged state onto the
//! active tree and fires the deferred use declaration. A commit that
//! introduced a new frame is not reported complete until the activation
//! that adopted it has run; this is a dependency flag, never a blocking
//! wait.

use std::sync::{Arc, Mutex, MutexGuard};

use drawing::{DrawingLayer, Occlusion};
use frame_protocol::{DelegatedFrame, DrawQuad, ReturnedResource};
use frame_provider::FrameProvider;
use geometry::Rect;
use presenting::PresentingLayer;
use resources::ResourceCollection;
use tracing::debug;

use crate::pool::InProcessResourcePool;

pub struct CompositorHarness {
    collection: Arc<Mutex<ResourceCollection>>,
    provider: Arc<Mutex<FrameProvider>>,
    presenting: PresentingLayer,
    pending_tree: DrawingLayer,
    active_tree: DrawingLayer,
    pool: InProcessResourcePool,
}

impl CompositorHarness {
    pub fn new(layer_id: u64, initial_frame: DelegatedFrame) -> Self {
        let collection = Arc::new(Mutex::new(ResourceCollection::new()));
        let provider = Arc::new(Mutex::new(FrameProvider::new(
            collection.clone(),
            initial_frame,
        )));
        let bounds = lock(&provider).frame_size();
        let mut presenting = PresentingLayer::new(provider.clone());
        let mut pending_tree = DrawingLayer::new(layer_id, bounds, false);
        let active_tree = DrawingLayer::new(layer_id, bounds, true);
        let mut pool = InProcessResourcePool::new();
        pending_tree.create_child_id_if_needed(&mut pool, lock(&provider).resource_return_sender());
        // The construction frame counts as the first new-frame notice.
        presenting.on_provider_has_new_frame();
        Self {
            collection,
            provider,
            presenting,
            pending_tree,
            active_tree,
            pool,
        }
    }

    /// Submission-domain entry: replace the provider's frame and deliver
    /// the new-frame notice to the observing layer.
    pub fn submit_frame(&mut self, frame: DelegatedFrame) {
        let notified = lock(&self.provider).set_frame_data(frame);
        if notified.contains(&self.presenting.observer()) {
            self.presenting.on_provider_has_new_frame();
        }
    }

    /// Phase 1: pull pending submissions and stage them on the pending
    /// tree. A commit with nothing pending is a no-op.
    pub fn commit(&mut self) {
        self.presenting.update();
        if let Some(payload) = self.presenting.take_commit_payload() {
            // The child registration may have been torn down by context
            // loss; a committed frame re-establishes it.
            self.pending_tree
                .create_child_id_if_needed(&mut self.pool, lock(&self.provider).resource_return_sender());
            debug!("committing frame to pending tree");
            self.pending_tree
                .set_frame_data(&mut self.pool, &payload.frame, payload.damage_in_frame);
        }
    }

    /// Phase 2: swap staged state onto the active tree, fire the deferred
    /// use declaration, and release the commit-completion dependency.
    pub fn activate(&mut self) {
        self.pending_tree
            .push_properties_to(&mut self.active_tree, &mut self.pool);
        self.presenting.acknowledge_activation();
    }

    /// Whether the latest commit may be reported complete.
    pub fn commit_complete(&self) -> bool {
        !self.presenting.commit_waits_for_activation()
    }

    /// Draw traversal over the active tree: culled root quads plus the
    /// layer's outstanding damage.
    pub fn draw(&mut self, occlusion: &dyn Occlusion) -> (Vec<DrawQuad>, Rect) {
        let mut quads = Vec::new();
        self.active_tree.append_quads(&mut quads, occlusion);
        let damage = self.active_tree.take_update_rect();
        (quads, damage)
    }

    /// Re-post draw-side returns into the submission domain and drain the
    /// collectible set for the child connection.
    pub fn collect_returned_resources(&mut self) -> Vec<ReturnedResource> {
        lock(&self.provider).drain_returned_resources();
        let mut collected = self
            .collection
            .lock()
            .expect("resource collection mutex should not be poisoned")
            .take_unused_for_child();
        collected.sort_by_key(|item| item.id);
        collected
    }

    /// Context loss: tear down both trees' child registration and promote
    /// every outstanding resource to collectible at once.
    pub fn handle_context_loss(&mut self) -> bool {
        self.pending_tree.release_resources(&mut self.pool);
        self.active_tree.release_resources(&mut self.pool);
        lock(&self.provider).drain_returned_resources();
        self.collection
            .lock()
            .expect("resource collection mutex should not be poisoned")
            .lose_all_resources()
    }

    pub fn resource_collection(&self) -> Arc<Mutex<ResourceCollection>> {
        self.collection.clone()
    }

    pub fn provider(&self) -> Arc<Mutex<FrameProvider>> {
        self.provider.clone()
    }

    pub fn active_tree(&self) -> &DrawingLayer {
        &self.active_tree
    }
}

fn lock(provider: &Arc<Mutex<FrameProvider>>) -> MutexGuard<'_, FrameProvider> {
    provider
        .lock()
        .expect("frame provider mutex should not be poisoned")
}
