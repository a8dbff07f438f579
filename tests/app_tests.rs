//! Application Context Tests
//!
//! Tests for:
//! - View-mode queue FIFO order across threads
//! - Lighting shader swaps driven by the view mode
//! - Frames presented on the default framebuffer

use std::path::PathBuf;

use glam::{Vec3, Vec4};

use lumen::app::{ModeQueue, RenderContext, ViewMode};
use lumen::renderer::palette::segment_color;
use lumen::scene::{Camera, Object, PbrMaterial, Scene};
use lumen::Renderer;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn scene_with_cube() -> Scene {
    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::ONE);
    let mut cube = Object::cube();
    cube.position = Vec3::new(0.0, 0.0, -5.0);
    cube.set_segment_id(2);
    cube.material = std::sync::Arc::new(PbrMaterial::with_diffuse("blue", Vec4::new(0.0, 0.0, 1.0, 1.0)));
    scene.add_object(cube);
    scene
}

fn centre_pixel(ctx: &RenderContext) -> Vec4 {
    let (w, h, pixels) = ctx.renderer.device().read_default_framebuffer();
    let i = ((h / 2 * w + w / 2) * 4) as usize;
    Vec4::from_slice(&pixels[i..i + 4])
}

// ============================================================================
// Queue
// ============================================================================

#[test]
fn queue_preserves_fifo_across_threads() {
    let queue = ModeQueue::new();
    let sender = queue.sender();
    std::thread::spawn(move || {
        for mode in [ViewMode::Depth, ViewMode::Albedo, ViewMode::Segmentation, ViewMode::Lighting] {
            sender.send(mode);
        }
    })
    .join()
    .unwrap();

    assert_eq!(
        queue.drain(),
        vec![ViewMode::Depth, ViewMode::Albedo, ViewMode::Segmentation, ViewMode::Lighting]
    );
}

#[test]
fn send_after_queue_drop_is_logged() {
    let queue = ModeQueue::new();
    let sender = queue.sender();
    drop(queue);
    // Logged, not panicking.
    sender.send(ViewMode::Depth);
}

// ============================================================================
// Render Context
// ============================================================================

#[test]
fn context_initializes_renderer() {
    let ctx = RenderContext::new(Renderer::software(16, 16), shader_dir()).unwrap();
    assert_eq!(ctx.mode(), ViewMode::Lighting);
    assert_eq!(ctx.renderer.state(), lumen::renderer::RendererState::Ready);
}

#[test]
fn queued_modes_apply_in_order_before_the_frame() {
    let mut ctx = RenderContext::new(Renderer::software(32, 32), shader_dir()).unwrap();
    let mut scene = scene_with_cube();
    let camera = Camera::perspective();

    let ui = ctx.sender();
    ui.send(ViewMode::Depth);
    ui.send(ViewMode::Albedo);
    ctx.frame(&mut scene, &camera);
    assert_eq!(ctx.mode(), ViewMode::Albedo);
    assert!(centre_pixel(&ctx).abs_diff_eq(Vec4::new(0.0, 0.0, 1.0, 1.0), 1e-3));

    let albedo_fs = ctx.renderer.shader_paths(lumen::renderer::textures::FboSlot::Lighting).unwrap();
    assert!(albedo_fs.fragment.ends_with("deferred_albedo.frag.wgsl"));
}

#[test]
fn segmentation_mode_presents_palette_colors() {
    let mut ctx = RenderContext::new(Renderer::software(32, 32), shader_dir()).unwrap();
    let mut scene = scene_with_cube();
    ctx.sender().send(ViewMode::Segmentation);
    ctx.frame(&mut scene, &Camera::perspective());

    let center = centre_pixel(&ctx);
    assert!(center.truncate().abs_diff_eq(segment_color(2), 1e-2), "got {center}");
}

#[test]
fn depth_mode_shows_background_as_white() {
    let mut ctx = RenderContext::new(Renderer::software(32, 32), shader_dir()).unwrap();
    ctx.set_mode(ViewMode::Depth);
    let mut scene = scene_with_cube();
    ctx.frame(&mut scene, &Camera::perspective());

    let (w, _, pixels) = ctx.renderer.device().read_default_framebuffer();
    assert!((pixels[0] - 1.0).abs() < 1e-3);
    let center = centre_pixel(&ctx).x;
    assert!(center < 0.01, "got {center}");
    assert_eq!(w, 32);
}
