//! Device Tests
//!
//! Tests for the wgpu device against the software device:
//! - Uploads and readbacks keep bottom-row-first order
//! - Clears per attachment format
//! - Single-texel integer readback
//! - Screen-pass draws and blits agree with the CPU results
//! - A full frame produces the same segmentation id
//!
//! Every test returns early when the machine has no usable adapter.

use std::path::PathBuf;

use glam::{Vec3, Vec4};

use lumen::errors::LumenError;
use lumen::renderer::core::{ClearFlags, RasterState, TextureDescriptor, TextureFormat, Viewport};
use lumen::scene::{Camera, Mesh, Object, Scene};
use lumen::{GraphicsDevice, Renderer, SoftwareDevice, WgpuDevice};

fn gpu() -> Option<WgpuDevice> {
    match WgpuDevice::new_headless() {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn shader(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders").join(name);
    std::fs::read_to_string(path).unwrap()
}

/// 4×3 RGBA gradient, bottom row first.
fn gradient() -> Vec<f32> {
    (0..12)
        .flat_map(|i| {
            let (x, y) = ((i % 4) as f32, (i / 4) as f32);
            [x / 4.0, y / 4.0, 0.5, 1.0]
        })
        .collect()
}

/// Draws the copy program from a 4×3 gradient into a `width × height` target.
fn copy_pass(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Vec<f32> {
    let source = device.create_texture(&TextureDescriptor::new("source", 4, 3, TextureFormat::Rgba32Float));
    device.write_texture(source, &gradient()).unwrap();
    let target = device.create_texture(&TextureDescriptor::new("target", width, height, TextureFormat::Rgba32Float));
    let fbo = device.create_framebuffer("copy");
    device.set_color_attachments(fbo, &[target]);

    let program = device
        .compile_program("copy", &shader("composite.vert.wgsl"), &shader("composite.frag.wgsl"))
        .unwrap();
    device.bind_framebuffer(Some(fbo));
    device.set_viewport(Viewport::new(width, height));
    device.set_raster_state(RasterState::SCREEN);
    device.clear(ClearFlags::COLOR, Vec4::ZERO);
    device.use_program(Some(program));
    assert!(device.set_uniform("colortex0", source.into()));
    device.draw_mesh(&Mesh::fullscreen_quad());
    device.read_texture_f32(target).unwrap()
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn uploads_read_back_in_storage_order() {
    let Some(mut device) = gpu() else { return };
    for format in [TextureFormat::Rgba16Float, TextureFormat::Rgba32Float] {
        let id = device.create_texture(&TextureDescriptor::new("gradient", 4, 3, format));
        device.write_texture(id, &gradient()).unwrap();
        assert_eq!(device.read_texture_f32(id).unwrap(), gradient(), "{format:?}");
    }

    let ids = device.create_texture(&TextureDescriptor::new("ids", 3, 2, TextureFormat::R32Sint));
    device.write_texture(ids, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    assert_eq!(device.read_texture_i32(ids).unwrap(), [0, 1, 2, 3, 4, 5]);
}

#[test]
fn depth_uploads_are_rejected() {
    let Some(mut device) = gpu() else { return };
    let depth = device.create_texture(&TextureDescriptor::new("depth", 2, 2, TextureFormat::Depth32Float));
    let err = device.write_texture(depth, &[0.5; 4]).unwrap_err();
    assert!(matches!(err, LumenError::Unsupported { .. }), "{err}");
    let err = device.write_texture(depth, &[0.5; 3]).unwrap_err();
    assert!(matches!(err, LumenError::TextureMismatch { expected: 4, actual: 3 }), "{err}");
}

#[test]
fn clears_follow_attachment_formats() {
    let Some(mut device) = gpu() else { return };
    let color = device.create_texture(&TextureDescriptor::new("color", 5, 4, TextureFormat::Rgba16Float));
    let ids = device.create_texture(&TextureDescriptor::new("ids", 5, 4, TextureFormat::R32Sint));
    let depth = device.create_texture(&TextureDescriptor::new("depth", 5, 4, TextureFormat::Depth32Float));
    let fbo = device.create_framebuffer("clear");
    device.set_color_attachments(fbo, &[color, ids]);
    device.set_depth_attachment(fbo, Some(depth));

    device.bind_framebuffer(Some(fbo));
    device.clear(ClearFlags::COLOR | ClearFlags::DEPTH, Vec4::new(0.25, 0.5, 0.75, 1.0));

    let texels = device.read_texture_f32(color).unwrap();
    assert!(texels.chunks_exact(4).all(|t| t == [0.25, 0.5, 0.75, 1.0]));
    assert!(device.read_texture_i32(ids).unwrap().iter().all(|&v| v == 0));
    assert!(device.read_texture_f32(depth).unwrap().iter().all(|&d| d == 1.0));
}

#[test]
fn pixel_reads_count_rows_from_the_bottom() {
    let Some(mut device) = gpu() else { return };
    let ids = device.create_texture(&TextureDescriptor::new("ids", 3, 2, TextureFormat::R32Sint));
    device.write_texture(ids, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let fbo = device.create_framebuffer("pick");
    device.set_color_attachments(fbo, &[ids]);

    assert_eq!(device.read_pixel_i32(fbo, 0, 0, 0), Some(0));
    assert_eq!(device.read_pixel_i32(fbo, 0, 2, 0), Some(2));
    assert_eq!(device.read_pixel_i32(fbo, 0, 1, 1), Some(4));
    assert_eq!(device.read_pixel_i32(fbo, 0, 3, 0), None);
    assert_eq!(device.read_pixel_i32(fbo, 0, 0, 2), None);
    assert_eq!(device.read_pixel_i32(fbo, 1, 0, 0), None);
}

// ============================================================================
// Drawing
// ============================================================================

#[test]
fn copy_pass_matches_the_software_device() {
    let Some(mut device) = gpu() else { return };
    let gpu_texels = copy_pass(&mut device, 4, 3);
    let cpu_texels = copy_pass(&mut SoftwareDevice::new(), 4, 3);
    assert_eq!(gpu_texels, gradient());
    assert_eq!(gpu_texels, cpu_texels);
}

#[test]
fn blit_scales_like_the_software_device() {
    fn blit_into_default(device: &mut dyn GraphicsDevice) -> (u32, u32, Vec<f32>) {
        let source = device.create_texture(&TextureDescriptor::new("source", 4, 3, TextureFormat::Rgba32Float));
        device.write_texture(source, &gradient()).unwrap();
        let fbo = device.create_framebuffer("copy");
        device.set_color_attachments(fbo, &[source]);
        device.blit(fbo, None, 8, 6);
        device.read_default_framebuffer()
    }

    let Some(mut device) = gpu() else { return };
    let (w, h, texels) = blit_into_default(&mut device);
    assert_eq!((w, h), (8, 6));
    assert_eq!(texels, blit_into_default(&mut SoftwareDevice::new()).2);
}

#[test]
fn frame_segmentation_matches_the_software_device() {
    fn centre_segment(mut renderer: Renderer) -> i32 {
        renderer
            .load_shaders(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders"))
            .unwrap();
        renderer.init().unwrap();
        let mut scene = Scene::new();
        let mut cube = Object::cube();
        cube.position = Vec3::new(0.0, 0.0, -5.0);
        cube.set_segment_id(7);
        scene.add_object(cube);
        renderer.render_scene(&mut scene, &Camera::perspective());
        let (w, h) = (renderer.pixel_width(), renderer.pixel_height());
        renderer.get_segmentation().unwrap()[(h / 2 * w + w / 2) as usize]
    }

    let Some(device) = gpu() else { return };
    let renderer = Renderer::new(Box::new(device), 32, 32);
    assert_eq!(centre_segment(renderer), 7);
    assert_eq!(centre_segment(Renderer::software(32, 32)), 7);
}

#[test]
fn deleting_a_program_releases_it() {
    let Some(mut device) = gpu() else { return };
    let _ = copy_pass(&mut device, 2, 2);
    let before = device.stats().programs;
    let program = device
        .compile_program("copy", &shader("composite.vert.wgsl"), &shader("composite.frag.wgsl"))
        .unwrap();
    assert_eq!(device.stats().programs, before + 1);
    device.delete_program(program);
    device.use_program(Some(program));
    assert!(!device.set_uniform("colortex0", 0_i32.into()));
    assert_eq!(device.stats().programs, before);
}
