//! Delegated-frame value types.
//!
//! A frame is immutable once submitted: a device scale factor, the list of
//! transferable resources it names, and its render passes in dependency
//! order with the root pass last. Everything here is plain data; validation
//! and namespace remapping live with the drawing side.

use std::collections::HashSet;

use geometry::Rect;
use smallvec::SmallVec;

pub type TransformMatrix4x4 = [f32; 16];

pub const IDENTITY_TRANSFORM: TransformMatrix4x4 = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// A resource handle, meaningful only within one namespace (child or
/// parent). Never reused while referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// Opaque GPU binding metadata carried through the pipeline untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuBinding {
    pub mailbox_name: u64,
    pub sync_token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferableResource {
    pub id: ResourceId,
    pub binding: GpuBinding,
}

impl TransferableResource {
    pub const fn with_id(id: u32) -> Self {
        Self {
            id: ResourceId(id),
            binding: GpuBinding {
                mailbox_name: 0,
                sync_token: 0,
            },
        }
    }
}

/// One unit batch of the return path. The `(id, count)` pairing must
/// round-trip exactly: every ref issued is balanced by exactly one unit in
/// a future return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnedResource {
    pub id: ResourceId,
    pub count: u32,
    pub lost: bool,
}

impl ReturnedResource {
    pub const fn returned(id: ResourceId, count: u32) -> Self {
        Self {
            id,
            count,
            lost: false,
        }
    }

    pub const fn lost(id: ResourceId, count: u32) -> Self {
        Self {
            id,
            count,
            lost: true,
        }
    }
}

/// Render pass ids are namespaced by the layer that contributed them so a
/// localized pass can never collide with passes synthesized elsewhere in
/// the drawing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassId {
    pub layer_id: u64,
    pub index: u64,
}

impl RenderPassId {
    pub const fn new(layer_id: u64, index: u64) -> Self {
        Self { layer_id, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadMaterial {
    SolidColor {
        color: [f32; 4],
    },
    Texture {
        resource_id: ResourceId,
    },
    TiledContent {
        resource_id: ResourceId,
    },
    RenderPass {
        pass_id: RenderPassId,
        mask_resource_id: Option<ResourceId>,
    },
}

/// One draw command. Texture-backed materials carry resource-id slots that
/// are rewritten in place when the frame crosses the namespace boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawQuad {
    pub content_rect: Rect,
    pub material: QuadMaterial,
}

impl DrawQuad {
    pub const fn new(content_rect: Rect, material: QuadMaterial) -> Self {
        Self {
            content_rect,
            material,
        }
    }

    pub fn referenced_resources(&self) -> SmallVec<[ResourceId; 2]> {
        let mut ids = SmallVec::new();
        match self.material {
            QuadMaterial::SolidColor { .. } => {}
            QuadMaterial::Texture { resource_id } | QuadMaterial::TiledContent { resource_id } => {
                ids.push(resource_id);
            }
            QuadMaterial::RenderPass {
                mask_resource_id, ..
            } => {
                if let Some(mask) = mask_resource_id {
                    ids.push(mask);
                }
            }
        }
        ids
    }

    pub fn resource_slots_mut(&mut self) -> SmallVec<[&mut ResourceId; 2]> {
        let mut slots = SmallVec::new();
        match &mut self.material {
            QuadMaterial::SolidColor { .. } => {}
            QuadMaterial::Texture { resource_id } | QuadMaterial::TiledContent { resource_id } => {
                slots.push(resource_id);
            }
            QuadMaterial::RenderPass {
                mask_resource_id, ..
            } => {
                if let Some(mask) = mask_resource_id {
                    slots.push(mask);
                }
            }
        }
        slots
    }

    pub fn referenced_pass(&self) -> Option<RenderPassId> {
        match self.material {
            QuadMaterial::RenderPass { pass_id, .. } => Some(pass_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub id: RenderPassId,
    pub output_rect: Rect,
    pub damage_rect: Rect,
    pub transform_to_root: TransformMatrix4x4,
    pub quad_list: Vec<DrawQuad>,
}

impl RenderPass {
    pub fn new(id: RenderPassId, output_rect: Rect) -> Self {
        Self {
            id,
            output_rect,
            damage_rect: output_rect,
            transform_to_root: IDENTITY_TRANSFORM,
            quad_list: Vec::new(),
        }
    }
}

/// One complete, internally-consistent unit of render passes plus the
/// resources they reference. The root pass is last in `render_pass_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatedFrame {
    pub device_scale_factor: f32,
    pub resource_list: Vec<TransferableResource>,
    pub render_pass_list: Vec<RenderPass>,
}

impl DelegatedFrame {
    pub fn root_render_pass(&self) -> Option<&RenderPass> {
        self.render_pass_list.last()
    }

    /// Every resource id referenced transitively by any quad in any pass.
    pub fn referenced_resource_ids(&self) -> HashSet<ResourceId> {
        let mut referenced = HashSet::new();
        for pass in &self.render_pass_list {
            for quad in &pass.quad_list {
                referenced.extend(quad.referenced_resources());
            }
        }
        referenced
    }

    /// One `{id, count: 1}` unit per listed resource: the shape a single
    /// retaining party hands back when releasing its hold on this frame.
    pub fn per_resource_return_units(&self) -> Vec<ReturnedResource> {
        self.resource_list
            .iter()
            .map(|resource| ReturnedResource::returned(resource.id, 1))
            .collect()
    }

    /// Whether every id referenced by a quad appears in `resource_list`.
    /// A frame violating this must never be adopted.
    pub fn is_internally_consistent(&self) -> bool {
        let listed: HashSet<ResourceId> =
            self.resource_list.iter().map(|resource| resource.id).collect();
        self.referenced_resource_ids()
            .iter()
            .all(|id| listed.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DelegatedFrame, DrawQuad, QuadMaterial, RenderPass, RenderPassId, ResourceId,
        TransferableResource,
    };
    use geometry::Rect;

    fn frame_with_quads(resources: &[u32], quads: Vec<DrawQuad>) -> DelegatedFrame {
        let mut root = RenderPass::new(RenderPassId::new(1, 1), Rect::new(0, 0, 100, 100));
        root.quad_list = quads;
        DelegatedFrame {
            device_scale_factor: 1.0,
            resource_list: resources
                .iter()
                .map(|id| TransferableResource::with_id(*id))
                .collect(),
            render_pass_list: vec![root],
        }
    }

    #[test]
    fn referenced_ids_walk_every_material_slot() {
        let quads = vec![
            DrawQuad::new(
                Rect::new(0, 0, 10, 10),
                QuadMaterial::Texture {
                    resource_id: ResourceId(7),
                },
            ),
            DrawQuad::new(
                Rect::new(10, 0, 10, 10),
                QuadMaterial::RenderPass {
                    pass_id: RenderPassId::new(1, 2),
                    mask_resource_id: Some(ResourceId(9)),
                },
            ),
            DrawQuad::new(
                Rect::new(20, 0, 10, 10),
                QuadMaterial::SolidColor {
                    color: [0.0, 0.0, 0.0, 1.0],
                },
            ),
        ];
        let frame = frame_with_quads(&[7, 9], quads);

        let referenced = frame.referenced_resource_ids();
        assert_eq!(referenced.len(), 2);
        assert!(referenced.contains(&ResourceId(7)));
        assert!(referenced.contains(&ResourceId(9)));
        assert!(frame.is_internally_consistent());
    }

    #[test]
    fn unlisted_reference_makes_frame_inconsistent() {
        let quads = vec![DrawQuad::new(
            Rect::new(0, 0, 10, 10),
            QuadMaterial::TiledContent {
                resource_id: ResourceId(5),
            },
        )];
        let frame = frame_with_quads(&[], quads);
        assert!(!frame.is_internally_consistent());
    }

    #[test]
    fn resource_slots_allow_in_place_rewrite() {
        let mut quad = DrawQuad::new(
            Rect::new(0, 0, 10, 10),
            QuadMaterial::Texture {
                resource_id: ResourceId(3),
            },
        );
        for slot in quad.resource_slots_mut() {
            *slot = ResourceId(30);
        }
        assert_eq!(quad.referenced_resources().as_slice(), &[ResourceId(30)]);
    }

    #[test]
    fn root_render_pass_is_last_in_list() {
        let mut frame = frame_with_quads(&[], Vec::new());
        frame.render_pass_list.insert(
            0,
            RenderPass::new(RenderPassId::new(1, 2), Rect::new(0, 0, 50, 50)),
        );
        let root = frame.root_render_pass().expect("frame should have a root");
        assert_eq!(root.id, RenderPassId::new(1, 1));
    }
}
