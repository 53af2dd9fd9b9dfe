//! Demo: drive a few delegated frames through the full pipeline and print
//! what the child connection gets back.

use drawing::NoOcclusion;
use frame_protocol::{
    DelegatedFrame, DrawQuad, QuadMaterial, RenderPass, RenderPassId, ResourceId,
    TransferableResource,
};
use geometry::Rect;
use laminar::CompositorHarness;

const FRAME_SIZE: i32 = 256;

fn demo_frame(generation: u32) -> DelegatedFrame {
    // Each generation carries one resource shared with the previous frame
    // and one fresh resource, so both retention and collection are
    // exercised.
    let shared = generation;
    let fresh = generation + 1;
    let mut root = RenderPass::new(
        RenderPassId::new(1, 1),
        Rect::new(0, 0, FRAME_SIZE, FRAME_SIZE),
    );
    root.damage_rect = Rect::new(0, 0, FRAME_SIZE / (generation as i32 + 1), FRAME_SIZE);
    root.quad_list = vec![
        DrawQuad::new(
            Rect::new(0, 0, FRAME_SIZE, FRAME_SIZE),
            QuadMaterial::SolidColor {
                color: [0.1, 0.1, 0.1, 1.0],
            },
        ),
        DrawQuad::new(
            Rect::new(8, 8, 64, 64),
            QuadMaterial::Texture {
                resource_id: ResourceId(shared),
            },
        ),
        DrawQuad::new(
            Rect::new(96, 8, 64, 64),
            QuadMaterial::TiledContent {
                resource_id: ResourceId(fresh),
            },
        ),
    ];
    DelegatedFrame {
        device_scale_factor: 1.0,
        resource_list: vec![
            TransferableResource::with_id(shared),
            TransferableResource::with_id(fresh),
        ],
        render_pass_list: vec![root],
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut harness = CompositorHarness::new(1, demo_frame(1));
    for generation in 1..=4u32 {
        harness.commit();
        harness.activate();
        let (quads, damage) = harness.draw(&NoOcclusion);
        let returned = harness.collect_returned_resources();
        println!(
            "generation {generation}: drew {} quads, damage {:?}, child got back {:?}",
            quads.len(),
            damage,
            returned
        );
        harness.submit_frame(demo_frame(generation + 1));
    }

    let lost = harness.handle_context_loss();
    let returned = harness.collect_returned_resources();
    println!("context loss (lost anything: {lost}): child got back {returned:?}");
}
