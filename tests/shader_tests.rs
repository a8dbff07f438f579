//! Shader Tests
//!
//! Tests for:
//! - Compile failures keep the previous program
//! - Missing source files surface as errors
//! - Uniforms not declared by the program are ignored
//! - Lighting shader variants selected by the view mode

use std::path::{Path, PathBuf};

use glam::Vec3;

use lumen::errors::LumenError;
use lumen::renderer::textures::FboSlot;
use lumen::scene::{Camera, Object, Scene};
use lumen::{GraphicsDevice as _, Renderer, SoftwareDevice};

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

/// Writes `source` to a per-process temp file and returns its path.
fn temp_shader(name: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("lumen-{}-{name}", std::process::id()));
    std::fs::write(&path, source).unwrap();
    path
}

fn ready(width: u32, height: u32) -> Renderer {
    let mut renderer = Renderer::software(width, height);
    renderer.load_shaders(shader_dir()).unwrap();
    renderer.init().unwrap();
    renderer
}

fn centre_segment(renderer: &mut Renderer, segment: u32) -> i32 {
    let mut scene = Scene::new();
    let mut cube = Object::cube();
    cube.position = Vec3::new(0.0, 0.0, -5.0);
    cube.set_segment_id(segment);
    scene.add_object(cube);
    renderer.render_scene(&mut scene, &Camera::perspective());
    let (w, h) = (renderer.pixel_width(), renderer.pixel_height());
    renderer.get_segmentation().unwrap()[(h / 2 * w + w / 2) as usize]
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn standard_shaders_all_compile() {
    let mut device = SoftwareDevice::new();
    let dir = shader_dir();
    for stem in ["shadow", "gbuffer", "ao", "deferred", "transparency", "axis", "composite", "display"] {
        let vs = std::fs::read_to_string(dir.join(format!("{stem}.vert.wgsl"))).unwrap();
        let fs = std::fs::read_to_string(dir.join(format!("{stem}.frag.wgsl"))).unwrap();
        assert!(device.compile_program(stem, &vs, &fs).is_ok(), "{stem} failed to compile");
    }
    let vs = std::fs::read_to_string(dir.join("deferred.vert.wgsl")).unwrap();
    for variant in ["deferred_depth", "deferred_albedo"] {
        let fs = std::fs::read_to_string(dir.join(format!("{variant}.frag.wgsl"))).unwrap();
        assert!(device.compile_program(variant, &vs, &fs).is_ok(), "{variant} failed to compile");
    }
}

#[test]
fn broken_shader_keeps_previous_program() {
    let mut renderer = ready(32, 32);
    assert_eq!(centre_segment(&mut renderer, 3), 3);

    let vs = shader_dir().join("gbuffer.vert.wgsl");
    let broken = temp_shader(
        "broken.frag.wgsl",
        "@fragment\nfn fs_gbuffer() -> @location(0) vec4<f32> {\n",
    );
    let err = renderer.set_gbuffer_shader(&vs, &broken).unwrap_err();
    assert!(matches!(err, LumenError::ShaderCompile { .. }), "{err}");

    // The frame still renders with the old program.
    assert_eq!(centre_segment(&mut renderer, 4), 4);
    let _ = std::fs::remove_file(broken);
}

#[test]
fn unknown_kernel_is_a_compile_error() {
    let mut renderer = ready(16, 16);
    let vs = shader_dir().join("deferred.vert.wgsl");
    let fs = temp_shader(
        "unknown.frag.wgsl",
        "@fragment\nfn fs_raytrace() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0);\n}\n",
    );
    assert!(matches!(
        renderer.set_lighting_shader(&vs, &fs),
        Err(LumenError::ShaderCompile { .. })
    ));
    let _ = std::fs::remove_file(fs);
}

#[test]
fn missing_source_file_is_reported() {
    let mut renderer = ready(16, 16);
    let missing = Path::new("/nonexistent/lumen/missing.frag.wgsl");
    let err = renderer
        .set_gbuffer_shader(shader_dir().join("gbuffer.vert.wgsl"), missing)
        .unwrap_err();
    assert!(matches!(err, LumenError::ShaderSource { .. }), "{err}");
    assert!(renderer.compile_program(missing, missing).is_err());
}

#[test]
fn shader_paths_are_recorded_before_init() {
    let mut renderer = Renderer::software(16, 16);
    let dir = shader_dir();
    renderer.set_ao_shader(dir.join("ao.vert.wgsl"), dir.join("ao.frag.wgsl")).unwrap();
    let paths = renderer.shader_paths(FboSlot::Ao).unwrap();
    assert_eq!(paths.fragment, dir.join("ao.frag.wgsl"));
    assert!(renderer.device().stats().programs == 0);
}

// ============================================================================
// Uniforms
// ============================================================================

#[test]
fn undeclared_uniforms_are_ignored() {
    let mut device = SoftwareDevice::new();
    let dir = shader_dir();
    let vs = std::fs::read_to_string(dir.join("axis.vert.wgsl")).unwrap();
    let fs = std::fs::read_to_string(dir.join("axis.frag.wgsl")).unwrap();
    let program = device.compile_program("axis", &vs, &fs).unwrap();
    device.use_program(Some(program));

    assert!(device.set_uniform("color", Vec3::ONE.extend(1.0).into()));
    assert!(device.set_uniform("gbufferModelMatrix", glam::Mat4::IDENTITY.into()));
    assert!(!device.set_uniform("pointLights[0].position", Vec3::ZERO.into()));
    assert!(!device.set_uniform("doesNotExist", 1.0_f32.into()));

    device.use_program(None);
    assert!(!device.set_uniform("color", Vec3::ONE.extend(1.0).into()));
}

#[test]
fn light_arrays_are_bounded_by_declaration() {
    let mut device = SoftwareDevice::new();
    let dir = shader_dir();
    let vs = std::fs::read_to_string(dir.join("deferred.vert.wgsl")).unwrap();
    let fs = std::fs::read_to_string(dir.join("deferred.frag.wgsl")).unwrap();
    let program = device.compile_program("deferred", &vs, &fs).unwrap();
    device.use_program(Some(program));

    assert!(device.set_uniform("pointLights[7].emission", Vec3::ONE.into()));
    assert!(!device.set_uniform("pointLights[8].emission", Vec3::ONE.into()));
    assert!(device.set_uniform("directionalLights[3].direction", Vec3::NEG_Y.into()));
    assert!(!device.set_uniform("directionalLights[4].direction", Vec3::NEG_Y.into()));
    assert!(device.set_uniform("ambientLight", Vec3::ONE.into()));
}

// ============================================================================
// Lighting Variants
// ============================================================================

#[test]
fn depth_variant_writes_linear_depth() {
    let mut renderer = ready(32, 32);
    let dir = shader_dir();
    renderer
        .set_lighting_shader(dir.join("deferred.vert.wgsl"), dir.join("deferred_depth.frag.wgsl"))
        .unwrap();
    let mut scene = Scene::new();
    let mut cube = Object::cube();
    cube.position = Vec3::new(0.0, 0.0, -5.0);
    scene.add_object(cube);
    let camera = Camera::perspective();
    renderer.render_scene(&mut scene, &camera);

    let lighting = renderer.get_lighting().unwrap();
    let center = lighting[(16 * 32 + 16) * 4];
    let expected = (4.0 - camera.near) / (camera.far - camera.near);
    assert!((center - expected).abs() < 2e-3, "got {center}, expected {expected}");
    assert!((lighting[0] - 1.0).abs() < 1e-3);
}
