//! Renders a small scene offscreen and writes every output buffer.
//!
//! ```text
//! cargo run --example headless -- [output_dir]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use lumen::app::{RenderContext, ViewMode, init_logging};
use lumen::renderer::settings::{AxisSettings, RendererSettings, ShadowSettings};
use lumen::scene::{Camera, DirectionalLight, Mesh, Object, PbrMaterial, PointLight, Scene};
use lumen::{GraphicsDevice, Renderer, SoftwareDevice, WgpuDevice};

fn build_scene() -> Scene {
    let mut scene = Scene::new();
    scene.set_ambient_light(Vec3::splat(0.15));
    scene.set_shadow_light(DirectionalLight::new(Vec3::new(-0.4, -1.0, -0.3).normalize(), Vec3::splat(0.9)));
    scene.add_point_light(PointLight::new(Vec3::new(2.0, 2.5, 2.0), Vec3::new(3.0, 2.6, 2.0)));

    let mut floor = Object::new(Some(Arc::new(Mesh::plane())));
    floor.name = "floor".into();
    floor.position = Vec3::new(0.0, -1.0, 0.0);
    floor.set_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
    floor.scale = Vec3::new(6.0, 6.0, 1.0);
    floor.material = Arc::new(PbrMaterial::with_diffuse("floor", Vec4::new(0.7, 0.7, 0.7, 1.0)));
    floor.set_segment_id(1);
    floor.set_obj_id(1);
    scene.add_object(floor);

    let colors = [
        Vec4::new(0.9, 0.2, 0.2, 1.0),
        Vec4::new(0.2, 0.8, 0.3, 1.0),
        Vec4::new(0.2, 0.4, 0.9, 0.5),
    ];
    for (i, color) in colors.into_iter().enumerate() {
        let mut cube = Object::cube();
        cube.name = format!("cube{i}");
        cube.position = Vec3::new(i as f32 * 1.6 - 1.6, -0.5, 0.0);
        cube.scale = Vec3::splat(0.5);
        cube.set_rotation(Quat::from_rotation_y(0.3 * i as f32));
        cube.material = Arc::new(PbrMaterial::with_diffuse(format!("cube{i}"), color));
        cube.set_segment_id(2 + i as u32);
        cube.set_obj_id(10 + i as u32);
        scene.add_object(cube);
    }

    scene.add_axes(Vec3::new(-1.6, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE);
    scene
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let out = std::env::args().nth(1).map_or_else(|| PathBuf::from("demos/output"), PathBuf::from);
    std::fs::create_dir_all(&out)?;

    let settings = RendererSettings {
        shadow: ShadowSettings {
            enabled: true,
            map_size: 1024,
            frustum_size: 8.0,
        },
        ao: true,
        axis: AxisSettings {
            enabled: true,
            global_axes: true,
            object_id: 99,
        },
        display: true,
        picking: true,
        ..Default::default()
    };
    let device: Box<dyn GraphicsDevice> = match WgpuDevice::new_headless() {
        Ok(device) => Box::new(device),
        Err(e) => {
            log::warn!("{e}; rendering on the CPU instead");
            Box::new(SoftwareDevice::new())
        }
    };
    log::info!("rendering with the {} device", device.name());
    let renderer = Renderer::with_settings(device, 480, 360, settings);
    let mut ctx = RenderContext::new(renderer, concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))?;

    let mut scene = build_scene();
    let mut camera = Camera::perspective();
    camera.aspect = 480.0 / 360.0;
    camera.position = Vec3::new(0.0, 2.0, 6.0);
    camera.look_at(Vec3::new(0.0, -2.5, -6.0), Vec3::Y);

    ctx.frame(&mut scene, &camera);
    ctx.renderer.write_to_file(out.join("final.png"))?;
    ctx.renderer.write_lighting_to_file(out.join("lighting.png"))?;
    ctx.renderer.write_segmentation_raw(out.join("segmentation.bin"))?;
    ctx.renderer.write_segmentation2_raw(out.join("objects.bin"))?;
    ctx.renderer.write_depth_raw(out.join("depth.bin"))?;
    ctx.renderer.write_normal_raw(out.join("normal.bin"))?;

    let (x, y) = (240, 250);
    log::info!(
        "pixel ({x}, {y}): segment {} object {}",
        ctx.renderer.pick_segmentation_id(x, y),
        ctx.renderer.pick_object_id(x, y)
    );

    ctx.sender().send(ViewMode::Depth);
    ctx.frame(&mut scene, &camera);
    ctx.renderer.write_lighting_to_file(out.join("depth.png"))?;

    log::info!("outputs written to {}", out.display());
    Ok(())
}
