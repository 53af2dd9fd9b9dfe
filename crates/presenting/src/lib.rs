//! The submission-side presenting layer.
//!
//! Registers itself as an observer of a shared frame provider for its own
//! lifetime, pulls the current frame plus accumulated damage once per
//! update cycle, and buffers the result until the draw side consumes it at
//! commit. The ref taken at the pull travels with the payload.

use std::sync::{Arc, Mutex, MutexGuard};

use frame_protocol::DelegatedFrame;
use frame_provider::{FrameProvider, ObserverId};
use geometry::Rect;
use tracing::debug;

/// What crosses the commit boundary: the pulled frame, its accumulated
/// damage in frame space, and (implicitly) the resource ref the pull took.
#[derive(Debug, Clone)]
pub struct CommitPayload {
    pub frame: DelegatedFrame,
    pub damage_in_frame: Rect,
}

pub struct PresentingLayer {
    provider: Arc<Mutex<FrameProvider>>,
    observer: ObserverId,
    should_collect_new_frame: bool,
    commit_waits_for_activation: bool,
    pending: Option<CommitPayload>,
}

impl PresentingLayer {
    pub fn new(provider: Arc<Mutex<FrameProvider>>) -> Self {
        let observer = lock_provider(&provider).register_observer();
        Self {
            provider,
            observer,
            should_collect_new_frame: false,
            commit_waits_for_activation: false,
            pending: None,
        }
    }

    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Invoked when the provider reports a replaced frame. Draw-side
    /// resource accounting must not race ahead of the frame it is based
    /// on, so the commit carrying this frame is held incomplete until the
    /// corresponding drawing layer has activated.
    pub fn on_provider_has_new_frame(&mut self) {
        self.should_collect_new_frame = true;
        self.commit_waits_for_activation = true;
    }

    pub fn needs_update(&self) -> bool {
        self.should_collect_new_frame
    }

    /// Pull the current frame and damage into the pending slot. Replacing
    /// a payload that was never pushed is a valid cancellation: its ref is
    /// released right here.
    pub fn update(&mut self) {
        if !self.should_collect_new_frame {
            return;
        }
        self.should_collect_new_frame = false;
        let (frame, damage_in_frame) = lock_provider(&self.provider)
            .get_frame_and_ref_resources(self.observer);
        if let Some(cancelled) = self.pending.replace(CommitPayload {
            frame,
            damage_in_frame,
        }) {
            debug!("replacing never-committed pending frame");
            lock_provider(&self.provider)
                .unref_resources_on_main_thread(&cancelled.frame.per_resource_return_units());
        }
    }

    /// Transfer the pending payload (and ownership of its ref) across the
    /// commit boundary. `None` when there is nothing to push.
    pub fn take_commit_payload(&mut self) -> Option<CommitPayload> {
        self.pending.take()
    }

    pub fn commit_waits_for_activation(&self) -> bool {
        self.commit_waits_for_activation
    }

    /// The draw-side tree adopted the committed frame; the commit that
    /// introduced it may now be reported complete.
    pub fn acknowledge_activation(&mut self) {
        self.commit_waits_for_activation = false;
    }

    pub fn provider(&self) -> Arc<Mutex<FrameProvider>> {
        self.provider.clone()
    }
}

impl Drop for PresentingLayer {
    fn drop(&mut self) {
        if let Ok(mut provider) = self.provider.lock() {
            if let Some(cancelled) = self.pending.take() {
                provider
                    .unref_resources_on_main_thread(&cancelled.frame.per_resource_return_units());
            }
            provider.unregister_observer(self.observer);
        }
    }
}

fn lock_provider(provider: &Arc<Mutex<FrameProvider>>) -> MutexGuard<'_, FrameProvider> {
    provider
        .lock()
        .expect("frame provider mutex should not be poisoned")
}
