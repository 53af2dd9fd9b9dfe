//! Draw-side frame adoption.
//!
//! A drawing layer receives committed frames from its presenting twin,
//! validates them against the shared resource pool's child-to-parent
//! translation, rewrites resource and pass ids into the parent namespace,
//! and contributes the localized passes to the draw traversal. Invalid
//! frames are rejected whole; the last good frame keeps drawing.

mod layer;
mod occlusion;
mod pool;

pub use layer::DrawingLayer;
pub use occlusion::{NoOcclusion, Occlusion, RegionOcclusion};
pub use pool::{ChildId, ParentResourcePool};
