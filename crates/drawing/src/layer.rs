use std::collections::{HashMap, HashSet};

use frame_protocol::{
    DelegatedFrame, DrawQuad, QuadMaterial, RenderPass, RenderPassId, ResourceId,
};
use geometry::{Rect, Size};
use resources::ResourceReturnSender;
use tracing::{debug, warn};

use crate::occlusion::Occlusion;
use crate::pool::{ChildId, ParentResourcePool};

/// The draw-side half of a delegated layer pair.
///
/// Owns the child-id registration with the shared resource pool, validates
/// and remaps every committed frame from the child namespace into the
/// parent namespace, and exposes the localized render passes to the draw
/// traversal. Frame adoption is all-or-nothing: a frame referencing an id
/// the pool does not know is discarded whole and the last good frame keeps
/// drawing.
pub struct DrawingLayer {
    layer_id: u64,
    bounds: Size,
    on_active_tree: bool,
    child_id: Option<ChildId>,
    owns_child_id: bool,
    // Child-namespace ids referenced by the adopted frame's quads, kept
    // unmapped so use declarations speak the pool's child vocabulary.
    resources_in_use: HashSet<ResourceId>,
    render_passes: Vec<RenderPass>,
    inverse_device_scale_factor: f32,
    update_rect: Rect,
    needs_push: bool,
}

impl DrawingLayer {
    pub fn new(layer_id: u64, bounds: Size, on_active_tree: bool) -> Self {
        Self {
            layer_id,
            bounds,
            on_active_tree,
            child_id: None,
            owns_child_id: false,
            resources_in_use: HashSet::new(),
            render_passes: Vec::new(),
            inverse_device_scale_factor: 1.0,
            update_rect: Rect::zero(),
            needs_push: false,
        }
    }

    pub fn layer_id(&self) -> u64 {
        self.layer_id
    }

    pub fn child_id(&self) -> Option<ChildId> {
        self.child_id
    }

    pub fn resources_in_use(&self) -> &HashSet<ResourceId> {
        &self.resources_in_use
    }

    pub fn create_child_id_if_needed(
        &mut self,
        pool: &mut dyn ParentResourcePool,
        return_sender: ResourceReturnSender,
    ) {
        if self.child_id.is_some() {
            return;
        }
        let child = pool.create_child(return_sender);
        self.child_id = Some(child);
        self.owns_child_id = true;
        debug!(layer = self.layer_id, "created child id");
    }

    /// Adopt a committed frame, or keep the previous one if the new frame
    /// is invalid. Requires `create_child_id_if_needed` to have run.
    pub fn set_frame_data(
        &mut self,
        pool: &mut dyn ParentResourcePool,
        frame: &DelegatedFrame,
        damage_in_frame: Rect,
    ) {
        let child = self
            .child_id
            .expect("child id must be created before set_frame_data");

        let Some(root) = frame.root_render_pass() else {
            warn!(layer = self.layer_id, "rejecting frame without render passes");
            return;
        };
        if root.output_rect.is_empty() {
            warn!(layer = self.layer_id, "rejecting frame with empty root output rect");
            return;
        }
        if !(frame.device_scale_factor.is_finite() && frame.device_scale_factor > 0.0) {
            warn!(layer = self.layer_id, "rejecting frame with invalid device scale factor");
            return;
        }

        pool.receive_from_child(child, &frame.resource_list);

        // Resolve every referenced id up front so adoption stays
        // all-or-nothing: one unknown id rejects the whole frame and
        // re-declares the previous in-use set untouched.
        let used = frame.referenced_resource_ids();
        let mut remap = HashMap::with_capacity(used.len());
        let mut unknown_id = None;
        {
            let map = pool.child_to_parent_map(child);
            for id in &used {
                match map.get(id) {
                    Some(parent_id) => {
                        remap.insert(*id, *parent_id);
                    }
                    None => {
                        unknown_id = Some(*id);
                        break;
                    }
                }
            }
        }
        if let Some(id) = unknown_id {
            warn!(
                layer = self.layer_id,
                id = id.0,
                "rejecting frame referencing unknown resource id"
            );
            pool.declare_used_resources_from_child(child, &self.resources_in_use);
            return;
        }

        let render_passes = self.localize_render_passes(frame, &remap);

        self.resources_in_use = used;
        if self.on_active_tree {
            pool.declare_used_resources_from_child(child, &self.resources_in_use);
        }

        self.inverse_device_scale_factor = 1.0 / frame.device_scale_factor;
        let damage_in_layer = damage_in_frame.scale_enclosing(self.inverse_device_scale_factor);
        self.update_rect = self
            .update_rect
            .union(damage_in_layer)
            .intersection(Rect::from_size(self.bounds));

        self.render_passes = render_passes;
        self.needs_push = true;
        debug!(
            layer = self.layer_id,
            passes = self.render_passes.len(),
            resources = self.resources_in_use.len(),
            "frame adopted"
        );
    }

    /// Copy the frame's passes, rewriting pass ids into this layer's
    /// namespace (`(layer_id, 1 + index)`) and every quad resource slot
    /// through the child-to-parent map. Caller has verified the map covers
    /// every referenced id.
    fn localize_render_passes(
        &self,
        frame: &DelegatedFrame,
        remap: &HashMap<ResourceId, ResourceId>,
    ) -> Vec<RenderPass> {
        let mut local_pass_ids = HashMap::with_capacity(frame.render_pass_list.len());
        for (index, pass) in frame.render_pass_list.iter().enumerate() {
            local_pass_ids.insert(pass.id, RenderPassId::new(self.layer_id, 1 + index as u64));
        }

        let mut render_passes = Vec::with_capacity(frame.render_pass_list.len());
        for (index, pass) in frame.render_pass_list.iter().enumerate() {
            let mut quad_list = Vec::with_capacity(pass.quad_list.len());
            for quad in &pass.quad_list {
                let mut quad = *quad;
                for slot in quad.resource_slots_mut() {
                    let parent_id = remap[&*slot];
                    *slot = parent_id;
                }
                if let QuadMaterial::RenderPass { pass_id, .. } = &mut quad.material {
                    match local_pass_ids.get(pass_id) {
                        Some(local) => *pass_id = *local,
                        None => {
                            debug_assert!(false, "quad references pass missing from frame");
                            warn!(
                                layer = self.layer_id,
                                "dropping quad referencing pass missing from frame"
                            );
                            continue;
                        }
                    }
                }
                quad_list.push(quad);
            }
            render_passes.push(RenderPass {
                id: RenderPassId::new(self.layer_id, 1 + index as u64),
                output_rect: pass.output_rect,
                damage_rect: pass.damage_rect,
                transform_to_root: pass.transform_to_root,
                quad_list,
            });
        }
        render_passes
    }

    /// Pending-to-active hand-off: transfer child-id ownership, move the
    /// localized passes, copy the in-use set, and fire the deferred use
    /// declaration when the target draws.
    pub fn push_properties_to(
        &mut self,
        other: &mut DrawingLayer,
        pool: &mut dyn ParentResourcePool,
    ) {
        if let Some(child) = self.child_id {
            match other.child_id {
                None => other.child_id = Some(child),
                Some(existing) => assert_eq!(
                    existing, child,
                    "target layer already holds a different child id"
                ),
            }
            other.owns_child_id = true;
            self.owns_child_id = false;
        }

        if !self.needs_push {
            return;
        }
        self.needs_push = false;
        other.render_passes = std::mem::take(&mut self.render_passes);
        other.resources_in_use = self.resources_in_use.clone();
        other.inverse_device_scale_factor = self.inverse_device_scale_factor;
        let moved_damage = std::mem::replace(&mut self.update_rect, Rect::zero());
        other.update_rect = other
            .update_rect
            .union(moved_damage)
            .intersection(Rect::from_size(other.bounds));

        if other.on_active_tree {
            let child = other
                .child_id
                .expect("pushed layer state requires a child id");
            pool.declare_used_resources_from_child(child, &other.resources_in_use);
        }
    }

    /// Connection-loss teardown: drop all adopted state and the child id.
    /// No usage is re-declared until a new valid frame arrives.
    pub fn release_resources(&mut self, pool: &mut dyn ParentResourcePool) {
        self.render_passes.clear();
        self.resources_in_use.clear();
        self.update_rect = Rect::zero();
        self.needs_push = false;
        if self.owns_child_id {
            if let Some(child) = self.child_id {
                pool.destroy_child(child);
                debug!(layer = self.layer_id, "destroyed child id");
            }
        }
        self.child_id = None;
        self.owns_child_id = false;
    }

    /// Outstanding damage in layer space, cleared by the read.
    pub fn take_update_rect(&mut self) -> Rect {
        std::mem::replace(&mut self.update_rect, Rect::zero())
    }

    pub fn inverse_device_scale_factor(&self) -> f32 {
        self.inverse_device_scale_factor
    }

    /// The localized non-root passes this layer contributes to the shared
    /// pass list, in dependency order.
    pub fn contributing_render_passes(&self) -> &[RenderPass] {
        match self.render_passes.len() {
            0 => &[],
            len => &self.render_passes[..len - 1],
        }
    }

    pub fn render_passes(&self) -> &[RenderPass] {
        &self.render_passes
    }

    /// Emit the root pass's quads into `output`, clipped against the
    /// layer's visibility. Quads falling entirely outside the visible
    /// region are dropped rather than emitted.
    pub fn append_quads(&self, output: &mut Vec<DrawQuad>, occlusion: &dyn Occlusion) {
        let Some(root) = self.render_passes.last() else {
            return;
        };
        for quad in &root.quad_list {
            let visible = occlusion.unoccluded_content_rect(quad.content_rect);
            if visible.is_empty() {
                continue;
            }
            output.push(DrawQuad::new(visible, quad.material));
        }
    }
}
