//! The cross-domain resource-return mailbox.
//!
//! The real consumer returns resources from an unspecified thread; batches
//! park in this mailbox until the submission domain drains them, so every
//! registry mutation still happens in one domain.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use frame_protocol::ReturnedResource;
use tracing::debug;

use crate::collection::ResourceCollection;

pub fn resource_return_channel() -> (ResourceReturnSender, ResourceReturnReceiver) {
    let (sender, receiver) = unbounded();
    (
        ResourceReturnSender { sender },
        ResourceReturnReceiver { receiver },
    )
}

/// Safe to clone and invoke from any thread. Sending after the receiving
/// connection is gone is a shutdown-ordering artifact and is dropped.
#[derive(Debug, Clone)]
pub struct ResourceReturnSender {
    sender: Sender<Vec<ReturnedResource>>,
}

impl ResourceReturnSender {
    pub fn return_resources(&self, returned: Vec<ReturnedResource>) {
        if returned.is_empty() {
            return;
        }
        if self.sender.send(returned).is_err() {
            debug!("dropping resource return batch for torn-down connection");
        }
    }
}

#[derive(Debug)]
pub struct ResourceReturnReceiver {
    receiver: Receiver<Vec<ReturnedResource>>,
}

impl ResourceReturnReceiver {
    /// Apply every parked batch to the collection. Returns the number of
    /// batches applied. Must be called from the submission domain.
    pub fn drain_into(&self, collection: &mut ResourceCollection) -> usize {
        let mut batches = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(batch) => {
                    collection.unref_resources(&batch);
                    batches += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return batches,
            }
        }
    }
}
