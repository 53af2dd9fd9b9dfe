//! Delegated-frame compositing pipeline.
//!
//! A child compositor submits frames of render passes and GPU-backed
//! resources through a `FrameProvider`; presenting layers pull them in the
//! submission domain and hand them across the commit barrier to drawing
//! layers, which validate, remap, and contribute them to the draw
//! traversal. Resources flow back through the return mailbox until every
//! ref is balanced. This crate wires the pieces together and hosts the
//! in-process pool used by the demo and the end-to-end tests.

mod harness;
mod pool;

pub use harness::CompositorHarness;
pub use pool::InProcessResourcePool;
