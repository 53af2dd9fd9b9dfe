//! Per-connection resource reference counting.
//!
//! The registry tracks `{ref_count, lost}` per resource id; the collection
//! wraps it behind a single-writer API and accumulates the unused set the
//! child connection drains. The return mailbox carries draw-domain returns
//! back into the submission domain.

mod collection;
mod registry;
mod returns;

pub use collection::{CollectionClient, ResourceCollection};
pub use returns::{ResourceReturnReceiver, ResourceReturnSender, resource_return_channel};
