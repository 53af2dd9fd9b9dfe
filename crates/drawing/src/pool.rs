//! The shared resource provider collaborator, seen from the draw side.
//!
//! One pool instance serves every child connection in the draw domain. It
//! owns the child-namespace to parent-namespace translation tables and the
//! parent compositor's side of the return path: when the real consumer
//! stops using a child's resources, the pool hands them back through the
//! return sender registered at child creation.

use std::collections::{HashMap, HashSet};

use frame_protocol::{ResourceId, TransferableResource};
use resources::ResourceReturnSender;

slotmap::new_key_type! {
    pub struct ChildId;
}

pub trait ParentResourcePool {
    /// Register a child connection. The pool invokes `return_sender`
    /// (possibly from another thread) whenever resources received from
    /// this child become returnable.
    fn create_child(&mut self, return_sender: ResourceReturnSender) -> ChildId;

    /// Tear down a child connection, returning everything it still has in
    /// the pool as lost.
    fn destroy_child(&mut self, child: ChildId);

    /// Import a frame's resource list under a child id. Each appearance of
    /// an id counts as one import unit to be balanced by a future return.
    fn receive_from_child(&mut self, child: ChildId, resources: &[TransferableResource]);

    /// The current child-namespace to parent-namespace translation for one
    /// child. Ids missing here have never been received (or were already
    /// returned); drawing them would be unsound.
    fn child_to_parent_map(&self, child: ChildId) -> &HashMap<ResourceId, ResourceId>;

    /// Declare the set of child-namespace ids still referenced by adopted
    /// frames. Received ids absent from the set become returnable.
    fn declare_used_resources_from_child(&mut self, child: ChildId, used: &HashSet<ResourceId>);
}
