//! Pipeline Tests
//!
//! End-to-end frames on the software device with the repository shaders:
//! - GBuffer segmentation silhouette and depth ordering
//! - Lighting, transparency, axis gizmo and shadow outputs
//! - Render preconditions (before init, missing programs)
//! - Resize and pass toggles: texture inventory and device leak checks
//! - Picking

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};

use lumen::renderer::palette::segment_color;
use lumen::renderer::textures::FboSlot;
use lumen::renderer::RendererState;
use lumen::scene::{Camera, CameraSpec, DirectionalLight, Mesh, Object, PbrMaterial, Scene};
use lumen::{GraphicsDevice as _, Renderer, RendererSettings, SoftwareDevice};

const EPSILON: f32 = 1e-3;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn ready(width: u32, height: u32) -> Renderer {
    let mut renderer = Renderer::software(width, height);
    renderer.load_shaders(shader_dir()).expect("standard shaders compile");
    renderer.init().expect("init");
    renderer
}

fn cube_at(position: Vec3, segment: u32, object: u32) -> Object {
    let mut cube = Object::cube();
    cube.position = position;
    cube.set_segment_id(segment);
    cube.set_obj_id(object);
    cube
}

/// Row-major, top row first.
fn at<T: Copy>(data: &[T], width: u32, col: u32, row: u32) -> T {
    data[(row * width + col) as usize]
}

fn rgba_at(data: &[f32], width: u32, col: u32, row: u32) -> Vec4 {
    let i = ((row * width + col) * 4) as usize;
    Vec4::from_slice(&data[i..i + 4])
}

/// Top-left pixel of a world point.
fn project(camera: &dyn CameraSpec, p: Vec3, width: u32, height: u32) -> (u32, u32) {
    let clip = camera.projection_matrix() * camera.view_matrix() * p.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    let col = (ndc.x * 0.5 + 0.5) * width as f32;
    let row = (0.5 - ndc.y * 0.5) * height as f32;
    (col as u32, row as u32)
}

// ============================================================================
// GBuffer
// ============================================================================

#[test]
fn cube_segmentation_silhouette() {
    let (w, h) = (512, 512);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 5, 7));

    renderer.render_scene(&mut scene, &Camera::perspective());
    let seg = renderer.get_segmentation().unwrap();
    let obj = renderer.get_segmentation2().unwrap();
    assert_eq!(seg.len(), (w * h) as usize);

    assert_eq!(at(&seg, w, 256, 256), 5);
    assert_eq!(at(&obj, w, 256, 256), 7);
    for (col, row) in [(0, 0), (511, 0), (0, 511), (511, 511), (20, 256), (256, 490)] {
        assert_eq!(at(&seg, w, col, row), 0, "background at ({col}, {row})");
    }

    // The front face at z = -4 spans ndc ±1/(4·tan 17.5°) ≈ ±0.793, so
    // pixels [53, 459).
    let covered = seg.iter().filter(|&&s| s == 5).count();
    let side = 406.0_f32;
    let ratio = covered as f32 / (side * side);
    assert!((ratio - 1.0).abs() < 0.02, "covered {covered} pixels");
    assert!(seg.iter().all(|&s| s == 0 || s == 5));
}

#[test]
fn depth_matches_projection_and_orders_surfaces() {
    let (w, h) = (256, 256);
    let mut renderer = ready(w, h);
    let camera = Camera::perspective();
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1));
    let mut back = cube_at(Vec3::new(0.0, 0.0, -10.0), 2, 2);
    back.scale = Vec3::splat(3.0);
    scene.add_object(back);

    renderer.render_scene(&mut scene, &camera);
    let depth = renderer.get_depth().unwrap();
    let seg = renderer.get_segmentation().unwrap();

    // Front cube hides the back one at the center.
    assert_eq!(at(&seg, w, 128, 128), 1);
    assert_eq!(at(&seg, w, 4, 128), 2);

    let clip = camera.projection_matrix() * Vec4::new(0.0, 0.0, -4.0, 1.0);
    let expected = clip.z / clip.w * 0.5 + 0.5;
    let center = at(&depth, w, 128, 128);
    assert!((center - expected).abs() < EPSILON, "center depth {center}, expected {expected}");

    let behind = at(&depth, w, 4, 128);
    assert!(center < behind && behind < 1.0);
}

#[test]
fn receding_cube_depth_increases_monotonically() {
    let (w, h) = (64, 64);
    let mut renderer = ready(w, h);
    let mut camera = Camera::perspective();
    camera.position = Vec3::new(1.0, 0.5, 2.0);
    let forward = Vec3::new(0.3, -0.2, -1.0).normalize();
    camera.look_at(forward, Vec3::Y);

    let mut scene = Scene::new();
    let key = scene.add_object(cube_at(camera.position + forward * 3.0, 1, 1));
    let mut previous = 0.0;
    for distance in [3.0, 4.0, 6.0, 9.0, 15.0, 30.0] {
        scene.object_mut(key).unwrap().position = camera.position + forward * distance;
        renderer.render_scene(&mut scene, &camera);

        assert_eq!(at(&renderer.get_segmentation().unwrap(), w, 32, 32), 1, "cube missing at {distance}");
        let depth = at(&renderer.get_depth().unwrap(), w, 32, 32);
        assert!(depth > previous && depth < 1.0, "depth {depth} at {distance} after {previous}");
        previous = depth;
    }
}

#[test]
fn background_depth_is_one() {
    let mut renderer = ready(32, 32);
    let mut scene = Scene::new();
    renderer.render_scene(&mut scene, &Camera::perspective());
    let depth = renderer.get_depth().unwrap();
    assert!(depth.iter().all(|&d| (d - 1.0).abs() < f32::EPSILON));
    assert!(renderer.get_segmentation().unwrap().iter().all(|&s| s == 0));
}

#[test]
fn segmentation_display_uses_palette() {
    let (w, h) = (64, 64);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 65, 1));

    renderer.render_scene(&mut scene, &Camera::perspective());
    renderer.display_segmentation(None);
    let (dw, dh, pixels) = renderer.device().read_default_framebuffer();
    assert_eq!((dw, dh), (w, h));

    // Row order is irrelevant at the center. Id 65 wraps to palette entry 5.
    let center = rgba_at(&pixels, w, 32, 32);
    let expected = segment_color(5);
    assert!(center.truncate().abs_diff_eq(expected, 1e-2), "got {center}");
}

#[test]
fn palette_wraps_every_sixty_ids() {
    for id in [0, 5, 59, 60, 123, u32::MAX - 60] {
        assert_eq!(segment_color(id), segment_color(id + 60), "id {id}");
    }

    // The rendered color texture agrees with the palette on both sides of the wrap.
    let (w, h) = (64, 32);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(-1.2, 0.0, -5.0), 5, 1));
    scene.add_object(cube_at(Vec3::new(1.2, 0.0, -5.0), 65, 2));
    let mut camera = Camera::perspective();
    camera.aspect = 2.0;
    renderer.render_scene(&mut scene, &camera);

    let set = renderer.texture_set().unwrap();
    let seg = renderer.get_segmentation().unwrap();
    let colors = renderer.device().read_texture_f32(set.segtex[2]).unwrap();
    let left = (0..w).find(|&c| at(&seg, w, c, 16) == 5).unwrap();
    let right = (0..w).find(|&c| at(&seg, w, c, 16) == 65).unwrap();
    // Readback rows are bottom-up, the center row is the same either way.
    let (a, b) = (rgba_at(&colors, w, left, 16), rgba_at(&colors, w, right, 16));
    assert!(a.abs_diff_eq(b, 1e-3), "{a} vs {b}");
    assert!(a.truncate().abs_diff_eq(segment_color(5), 1e-2));
}

#[test]
fn user_data_lands_in_user_texture() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    let mut cube = cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1);
    let mut data = [0.0; 16];
    data[..4].copy_from_slice(&[0.25, 0.5, 0.75, 1.0]);
    cube.set_user_data(data);
    scene.add_object(cube);

    renderer.render_scene(&mut scene, &Camera::perspective());
    let user = renderer.get_user_texture().unwrap();
    let center = rgba_at(&user, w, 16, 16);
    assert!(center.abs_diff_eq(Vec4::new(0.25, 0.5, 0.75, 1.0), EPSILON), "got {center}");
}

#[test]
fn segmentation_disabled_writes_zero_ids() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    renderer.enable_segmentation(false);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 5, 7));

    renderer.render_scene(&mut scene, &Camera::perspective());
    assert!(renderer.get_segmentation().unwrap().iter().all(|&s| s == 0));
    // Geometry is still drawn.
    assert!(at(&renderer.get_depth().unwrap(), w, 16, 16) < 1.0);
}

#[test]
fn disabling_segmentation_after_a_frame_zeroes_ids() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 5, 7));
    let mut glass = cube_at(Vec3::new(0.0, 0.0, -3.0), 5, 7);
    glass.visibility = 0.5;
    scene.add_object(glass);

    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(at(&renderer.get_segmentation().unwrap(), w, 16, 16), 5);
    assert_eq!(at(&renderer.get_segmentation2().unwrap(), w, 16, 16), 7);

    renderer.enable_segmentation(false);
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert!(renderer.get_segmentation().unwrap().iter().all(|&s| s == 0));
    assert!(renderer.get_segmentation2().unwrap().iter().all(|&s| s == 0));
    let set = renderer.texture_set().unwrap();
    let colors = renderer.device().read_texture_f32(set.segtex[2]).unwrap();
    assert!(colors.iter().all(|&c| c == 0.0));
}

// ============================================================================
// Lighting & Transparency
// ============================================================================

#[test]
fn ambient_light_scales_albedo() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::splat(0.5));
    let mut cube = cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1);
    cube.material = Arc::new(PbrMaterial::with_diffuse("red", Vec4::new(1.0, 0.0, 0.0, 1.0)));
    scene.add_object(cube);

    renderer.render_scene(&mut scene, &Camera::perspective());
    let lighting = renderer.get_lighting().unwrap();
    let center = rgba_at(&lighting, w, 16, 16);
    assert!(center.abs_diff_eq(Vec4::new(0.5, 0.0, 0.0, 1.0), EPSILON), "got {center}");
    let corner = rgba_at(&lighting, w, 0, 0);
    assert!(corner.abs_diff_eq(Vec4::new(0.0, 0.0, 0.0, 1.0), EPSILON), "got {corner}");
}

#[test]
fn transparent_objects_write_ids_but_not_depth() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::ONE);
    let mut glass = cube_at(Vec3::new(0.0, 0.0, -5.0), 9, 3);
    glass.material = Arc::new(PbrMaterial::with_diffuse("glass", Vec4::new(0.0, 1.0, 0.0, 0.5)));
    scene.add_object(glass);

    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(scene.transparent_objects().len(), 1);
    assert_eq!(at(&renderer.get_segmentation().unwrap(), w, 16, 16), 9);
    assert_eq!(at(&renderer.get_segmentation2().unwrap(), w, 16, 16), 3);
    assert!((at(&renderer.get_depth().unwrap(), w, 16, 16) - 1.0).abs() < f32::EPSILON);

    // Front and back faces both blend at half alpha over black.
    let center = rgba_at(&renderer.get_lighting().unwrap(), w, 16, 16);
    assert!((center.y - 0.75).abs() < 1e-2, "got {center}");
}

#[test]
fn directional_shadow_darkens_occluded_floor() {
    let (w, h) = (128, 128);
    let mut renderer = ready(w, h);
    renderer.enable_shadow_pass(true, 256, 10.0);
    assert!(renderer.has_pass(FboSlot::Shadow));

    let mut scene = Scene::new();
    scene.set_shadow_light(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE));

    let mut floor = Object::new(Some(Arc::new(Mesh::plane())));
    floor.position = Vec3::new(0.0, -1.0, 0.0);
    floor.set_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
    floor.scale = Vec3::new(5.0, 5.0, 1.0);
    floor.material = Arc::new(PbrMaterial::with_diffuse("floor", Vec4::new(0.8, 0.8, 0.8, 1.0)));
    scene.add_object(floor);

    let mut blocker = cube_at(Vec3::new(0.0, 0.5, 0.0), 1, 1);
    blocker.scale = Vec3::splat(0.5);
    scene.add_object(blocker);

    let mut camera = Camera::perspective();
    camera.position = Vec3::new(0.0, 2.0, 6.0);
    camera.look_at(Vec3::new(0.0, -3.0, -6.0), Vec3::Y);

    renderer.render_scene(&mut scene, &camera);

    let set = renderer.texture_set().unwrap();
    let shadow_map = renderer.device().read_texture_f32(set.shadowtex.unwrap()).unwrap();
    assert_eq!(shadow_map.len(), 256 * 256);
    assert!(shadow_map.iter().any(|&d| d < 1.0));

    let lighting = renderer.get_lighting().unwrap();
    let (sc, sr) = project(&camera, Vec3::new(0.0, -1.0, 0.0), w, h);
    let (lc, lr) = project(&camera, Vec3::new(2.5, -1.0, 0.0), w, h);
    let shadowed = rgba_at(&lighting, w, sc, sr).x;
    let lit = rgba_at(&lighting, w, lc, lr).x;
    assert!(lit > 0.6, "lit floor {lit}");
    assert!(shadowed < 0.1, "shadowed floor {shadowed}");
}

#[test]
fn axis_gizmo_writes_axis_object_id() {
    let (w, h) = (128, 128);
    let mut renderer = ready(w, h);
    renderer.enable_axis_pass(true);
    renderer.set_object_id_for_axis(42);

    let mut scene = Scene::new();
    scene.add_axes(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(20.0));
    let mut camera = Camera::perspective();
    camera.position = Vec3::new(0.0, 0.0, 5.0);

    renderer.render_scene(&mut scene, &camera);
    let obj = renderer.get_segmentation2().unwrap();
    // The X bar runs right from the center.
    assert_eq!(at(&obj, w, 96, 64), 42);
    assert_eq!(at(&obj, w, 32, 100), 0);

    let lighting = renderer.get_lighting().unwrap();
    let red = rgba_at(&lighting, w, 96, 64);
    assert!(red.abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 1.0), EPSILON), "got {red}");
}

#[test]
fn display_pass_tonemaps_final_image() {
    let (w, h) = (32, 32);
    let mut renderer = ready(w, h);
    renderer.enable_display_pass(true);
    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::ONE);
    let mut cube = cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1);
    cube.material = Arc::new(PbrMaterial::with_diffuse("white", Vec4::ONE));
    scene.add_object(cube);

    renderer.render_scene(&mut scene, &Camera::perspective());
    renderer.display(None);
    let (_, _, pixels) = renderer.device().read_default_framebuffer();
    // 1 / (1 + 1) = 0.5, gamma 2.2.
    let expected = 0.5_f32.powf(1.0 / 2.2);
    let center = rgba_at(&pixels, w, 16, 16);
    assert!((center.x - expected).abs() < 1e-2, "got {center}");
}

#[test]
fn display_pass_without_program_shows_composite_output() {
    let (w, h) = (16, 16);
    let dir = shader_dir();
    let mut renderer = Renderer::software(w, h);
    renderer.set_gbuffer_shader(dir.join("gbuffer.vert.wgsl"), dir.join("gbuffer.frag.wgsl")).unwrap();
    renderer.set_lighting_shader(dir.join("deferred.vert.wgsl"), dir.join("deferred.frag.wgsl")).unwrap();
    renderer.set_transparency_shader(dir.join("transparency.vert.wgsl"), dir.join("transparency.frag.wgsl")).unwrap();
    renderer.set_composite_shader(dir.join("composite.vert.wgsl"), dir.join("composite.frag.wgsl")).unwrap();
    renderer.init().unwrap();
    renderer.enable_display_pass(true);
    assert!(renderer.has_pass(FboSlot::Display));

    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::splat(0.5));
    let mut cube = cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1);
    cube.material = Arc::new(PbrMaterial::with_diffuse("white", Vec4::ONE));
    scene.add_object(cube);
    renderer.render_scene(&mut scene, &Camera::perspective());

    let set = renderer.texture_set().unwrap();
    let composite = rgba_at(&renderer.device().read_texture_f32(set.lightingtex2).unwrap(), w, 8, 8);
    assert!(composite.x > 0.1, "composite {composite}");

    renderer.display(None);
    let (_, _, pixels) = renderer.device().read_default_framebuffer();
    let shown = rgba_at(&pixels, w, 8, 8);
    assert!(shown.abs_diff_eq(composite, 1e-2), "shown {shown}, composite {composite}");

    let path = std::env::temp_dir().join(format!("lumen-{}-no-display.png", std::process::id()));
    renderer.write_to_file(&path).unwrap();
    let png = image::open(&path).unwrap().into_rgba8();
    let expected = (composite.x.clamp(0.0, 1.0) * 255.0).round() as i32;
    assert!((i32::from(png.get_pixel(8, 8)[0]) - expected).abs() <= 1);
    std::fs::remove_file(&path).ok();
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn render_before_init_is_a_noop() {
    let mut renderer = Renderer::software(16, 16);
    let mut scene = Scene::new();
    scene.add_object(Object::cube());
    renderer.render_scene(&mut scene, &Camera::perspective());

    assert_eq!(renderer.state(), RendererState::Uninitialized);
    // The scene was not flattened.
    assert!(scene.opaque_objects().is_empty());
    assert!(renderer.get_segmentation().is_err());
}

#[test]
fn missing_mandatory_shader_refuses_frame() {
    let mut renderer = Renderer::software(16, 16);
    renderer.init().unwrap();
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 5, 5));

    renderer.render_scene(&mut scene, &Camera::perspective());
    assert!(scene.opaque_objects().is_empty());
    assert!(renderer.get_segmentation().unwrap().iter().all(|&s| s == 0));
}

#[test]
fn shaders_set_after_init_compile_immediately() {
    let dir = shader_dir();
    let mut renderer = Renderer::software(16, 16);
    renderer.init().unwrap();
    renderer.load_shaders(&dir).unwrap();

    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 4, 4));
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(at(&renderer.get_segmentation().unwrap(), 16, 8, 8), 4);
}

#[test]
fn per_object_program_overrides_gbuffer_shader() {
    let dir = shader_dir();
    let mut renderer = ready(16, 16);
    let program = renderer
        .compile_program(dir.join("gbuffer.vert.wgsl"), dir.join("gbuffer.frag.wgsl"))
        .unwrap();
    let mut scene = Scene::new();
    let mut cube = cube_at(Vec3::new(0.0, 0.0, -5.0), 6, 6);
    cube.shader = Some(program);
    scene.add_object(cube);

    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(at(&renderer.get_segmentation().unwrap(), 16, 8, 8), 6);
}

// ============================================================================
// Resize & Toggles
// ============================================================================

fn inventory(renderer: &Renderer) -> Vec<(&'static str, u32, u32)> {
    let mut names: Vec<_> = renderer
        .textures()
        .into_iter()
        .map(|(name, d)| (name, d.width, d.height))
        .collect();
    names.sort_unstable();
    names
}

#[test]
fn resize_round_trip_rebuilds_every_texture() {
    let mut renderer = ready(64, 48);
    let before = renderer.device().stats();
    assert!(inventory(&renderer).iter().all(|&(_, w, h)| (w, h) == (64, 48)));

    renderer.resize(32, 16);
    assert_eq!((renderer.width(), renderer.height()), (32, 16));
    assert!(inventory(&renderer).iter().all(|&(_, w, h)| (w, h) == (32, 16)));
    assert_eq!(renderer.device().stats(), before);

    renderer.resize(64, 48);
    assert!(inventory(&renderer).iter().all(|&(_, w, h)| (w, h) == (64, 48)));
    assert_eq!(renderer.device().stats(), before);

    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 3, 3));
    renderer.render_scene(&mut scene, &Camera::perspective());
    let seg = renderer.get_segmentation().unwrap();
    assert_eq!(seg.len(), 64 * 48);
    assert_eq!(at(&seg, 64, 32, 24), 3);
}

#[test]
fn ao_toggle_adds_and_drops_its_texture() {
    let mut renderer = ready(32, 32);
    let before = renderer.device().stats();
    assert!(!inventory(&renderer).iter().any(|(n, _, _)| *n == "aotex"));

    renderer.enable_ao_pass(true);
    assert!(renderer.has_pass(FboSlot::Ao));
    assert!(inventory(&renderer).iter().any(|(n, _, _)| *n == "aotex"));
    let with_ao = renderer.device().stats();
    assert_eq!(with_ao.textures, before.textures + 1);
    assert_eq!(with_ao.programs, before.programs + 1);
    assert_eq!(with_ao.framebuffers, before.framebuffers);

    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::ONE);
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1));
    renderer.render_scene(&mut scene, &Camera::perspective());
    let set = renderer.texture_set().unwrap();
    let ao = renderer.device().read_texture_f32(set.aotex.unwrap()).unwrap();
    assert!(ao.iter().all(|v| (0.0..=1.0).contains(v)));

    renderer.enable_ao_pass(false);
    assert!(!renderer.has_pass(FboSlot::Ao));
    assert_eq!(renderer.device().stats(), before);
}

#[test]
fn ao_round_trip_then_resize_matches_never_enabled() {
    let mut toggled = ready(32, 32);
    toggled.enable_ao_pass(true);
    toggled.enable_ao_pass(false);
    toggled.resize(48, 24);

    let mut plain = ready(32, 32);
    plain.resize(48, 24);

    assert_eq!(inventory(&toggled), inventory(&plain));
    assert_eq!(toggled.device().stats(), plain.device().stats());
    assert!(!toggled.has_pass(FboSlot::Ao));
    assert!(toggled.texture_set().unwrap().aotex.is_none());
}

#[test]
fn optional_pass_without_program_is_skipped() {
    let mut renderer = Renderer::software(16, 16);
    let dir = shader_dir();
    renderer.set_gbuffer_shader(dir.join("gbuffer.vert.wgsl"), dir.join("gbuffer.frag.wgsl")).unwrap();
    renderer.set_lighting_shader(dir.join("deferred.vert.wgsl"), dir.join("deferred.frag.wgsl")).unwrap();
    renderer.set_transparency_shader(dir.join("transparency.vert.wgsl"), dir.join("transparency.frag.wgsl")).unwrap();
    renderer.set_composite_shader(dir.join("composite.vert.wgsl"), dir.join("composite.frag.wgsl")).unwrap();
    renderer.init().unwrap();
    renderer.enable_ao_pass(true);

    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 2, 2));
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(at(&renderer.get_segmentation().unwrap(), 16, 8, 8), 2);
}

#[test]
fn exit_releases_every_device_object() {
    let mut renderer = ready(32, 32);
    renderer.enable_picking();
    renderer.enable_shadow_pass(true, 64, 5.0);
    renderer
        .compile_program(shader_dir().join("gbuffer.vert.wgsl"), shader_dir().join("gbuffer.frag.wgsl"))
        .unwrap();
    assert!(renderer.device().stats().textures > 0);

    renderer.exit();
    assert_eq!(renderer.state(), RendererState::Uninitialized);
    let stats = renderer.device().stats();
    assert_eq!((stats.textures, stats.framebuffers, stats.programs), (0, 0, 0));

    // Shader paths survive, so init brings the pipeline back.
    renderer.init().unwrap();
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 8, 8));
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(at(&renderer.get_segmentation().unwrap(), 32, 16, 16), 8);
}

// ============================================================================
// Picking
// ============================================================================

#[test]
fn picking_reads_ids_under_cursor() {
    let mut renderer = ready(64, 64);
    renderer.enable_picking();
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 11, 12));
    renderer.render_scene(&mut scene, &Camera::perspective());

    assert_eq!(renderer.pick_segmentation_id(32, 32), 11);
    assert_eq!(renderer.pick_object_id(32, 32), 12);
    assert_eq!(renderer.pick_object_id(2, 32), 0);
}

#[test]
fn picking_out_of_bounds_returns_zero() {
    let mut renderer = ready(64, 64);
    renderer.enable_picking();
    let mut scene = Scene::new();
    let mut wall = cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1);
    wall.scale = Vec3::splat(10.0);
    wall.position = Vec3::new(0.0, 0.0, -20.0);
    scene.add_object(wall);
    renderer.render_scene(&mut scene, &Camera::perspective());

    assert_eq!(renderer.pick_object_id(32, 32), 1);
    for (x, y) in [(-1, 10), (10, -1), (64, 10), (10, 64), (i32::MAX, i32::MIN)] {
        assert_eq!(renderer.pick_object_id(x, y), 0, "({x}, {y})");
    }
}

#[test]
fn picking_without_enable_returns_zero() {
    let mut renderer = ready(32, 32);
    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1));
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert!(!renderer.is_picking_enabled());
    assert_eq!(renderer.pick_object_id(16, 16), 0);
}

#[test]
fn picking_scales_window_coordinates() {
    let settings = RendererSettings {
        scaling: 2.0,
        picking: true,
        shader_dir: Some(shader_dir()),
        ..Default::default()
    };
    let mut renderer = Renderer::with_settings(Box::new(SoftwareDevice::new()), 32, 32, settings);
    renderer.init().unwrap();
    assert_eq!((renderer.pixel_width(), renderer.pixel_height()), (64, 64));

    let mut scene = Scene::new();
    scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 21));
    renderer.render_scene(&mut scene, &Camera::perspective());
    assert_eq!(renderer.get_segmentation2().unwrap().len(), 64 * 64);
    assert_eq!(renderer.pick_object_id(16, 16), 21);
    assert_eq!(renderer.pick_object_id(1, 16), 0);
}

#[test]
fn picking_top_window_row_reads_past_the_frame() {
    let mut renderer = ready(32, 32);
    renderer.enable_picking();
    let mut scene = Scene::new();
    let mut wall = cube_at(Vec3::new(0.0, 0.0, -20.0), 9, 9);
    wall.scale = Vec3::splat(10.0);
    scene.add_object(wall);
    renderer.render_scene(&mut scene, &Camera::perspective());

    assert_eq!(renderer.pick_segmentation_id(5, 0), 0);
    assert_eq!(renderer.pick_segmentation_id(5, 1), 9);
    assert_eq!(renderer.pick_object_id(5, 0), 0);
    assert_eq!(renderer.pick_object_id(31, 31), 9);
}

#[test]
fn model_matrix_override_is_not_public_state() {
    // Rendering must not move objects.
    let mut renderer = ready(16, 16);
    let mut scene = Scene::new();
    let key = scene.add_object(cube_at(Vec3::new(0.0, 0.0, -5.0), 1, 1));
    renderer.render_scene(&mut scene, &Camera::perspective());
    let m = scene.object(key).unwrap().global_model_matrix();
    assert!(m.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)), EPSILON));
}
