//! Scene Tests
//!
//! Tests for:
//! - Opaque/transparent partition of the flatten pass
//! - Pre-order traversal and order stability
//! - World matrix composition through the hierarchy
//! - Deferred removal (marked objects survive until the next flatten)
//! - Shadow light replacement

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};

use lumen::scene::{DirectionalLight, Mesh, Object, PbrMaterial, Scene, Texture};

const EPSILON: f32 = 1e-5;

fn mat_approx(a: Mat4, b: Mat4) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

fn named_cube(name: &str) -> Object {
    let mut o = Object::cube();
    o.name = name.to_string();
    o
}

fn names(scene: &Scene, keys: &[lumen::ObjectKey]) -> Vec<String> {
    keys.iter()
        .map(|k| scene.object(*k).map(|o| o.name.clone()).unwrap_or_default())
        .collect()
}

// ============================================================================
// Partition
// ============================================================================

#[test]
fn flatten_partitions_by_transparency() {
    let mut scene = Scene::new();
    scene.add_object(named_cube("solid"));

    let mut glass = named_cube("glass");
    glass.material = Arc::new(PbrMaterial::with_diffuse("glass", Vec4::new(1.0, 1.0, 1.0, 0.5)));
    scene.add_object(glass);

    let mut faded = named_cube("faded");
    faded.visibility = 0.4;
    scene.add_object(faded);

    let mut forced = named_cube("forced");
    forced.material_mut().force_transparency = true;
    scene.add_object(forced);

    scene.prepare_objects();
    assert_eq!(names(&scene, scene.opaque_objects()), ["solid"]);
    assert_eq!(names(&scene, scene.transparent_objects()), ["glass", "faded", "forced"]);
}

#[test]
fn diffuse_map_overrides_alpha_for_classification() {
    let mut scene = Scene::new();
    let mut textured = named_cube("textured");
    {
        let m = textured.material_mut();
        m.kd = Vec4::new(1.0, 1.0, 1.0, 0.2);
        m.kd_map = Some(Arc::new(Texture::solid("white", Vec4::ONE)));
    }
    scene.add_object(textured);

    scene.prepare_objects();
    assert_eq!(scene.opaque_objects().len(), 1);
    assert!(scene.transparent_objects().is_empty());
}

#[test]
fn hidden_and_meshless_objects_are_skipped() {
    let mut scene = Scene::new();
    let mut hidden = named_cube("hidden");
    hidden.visibility = 0.0;
    scene.add_object(hidden);
    scene.add_object(Object::empty("group"));

    scene.prepare_objects();
    assert!(scene.opaque_objects().is_empty());
    assert!(scene.transparent_objects().is_empty());
}

#[test]
fn children_of_hidden_parent_are_still_visited() {
    let mut scene = Scene::new();
    let mut parent = named_cube("parent");
    parent.visibility = 0.0;
    let parent = parent.with_child(named_cube("child"));
    scene.add_object(parent);

    scene.prepare_objects();
    assert_eq!(names(&scene, scene.opaque_objects()), ["child"]);
}

// ============================================================================
// Order
// ============================================================================

#[test]
fn flatten_is_pre_order() {
    let mut scene = Scene::new();
    let a = named_cube("a")
        .with_child(named_cube("a1").with_child(named_cube("a1x")))
        .with_child(named_cube("a2"));
    scene.add_object(a);
    scene.add_object(named_cube("b"));

    scene.prepare_objects();
    assert_eq!(names(&scene, scene.opaque_objects()), ["a", "a1", "a1x", "a2", "b"]);
}

#[test]
fn flatten_order_is_stable_across_frames() {
    let mut scene = Scene::new();
    for i in 0..16 {
        scene.add_object(named_cube(&format!("o{i}")));
    }
    scene.prepare_objects();
    let first = scene.opaque_objects().to_vec();
    scene.prepare_objects();
    assert_eq!(scene.opaque_objects(), first.as_slice());
}

#[test]
fn add_child_after_insertion_appends() {
    let mut scene = Scene::new();
    let root = scene.add_object(named_cube("root").with_child(named_cube("first")));
    let second = scene.add_child(root, named_cube("second"));
    assert!(second.is_some());

    scene.prepare_objects();
    assert_eq!(names(&scene, scene.opaque_objects()), ["root", "first", "second"]);
}

#[test]
fn add_child_to_foreign_key_is_rejected() {
    let mut other = Scene::new();
    let foreign = other.add_object(named_cube("foreign"));
    let mut scene = Scene::new();
    assert!(scene.add_child(foreign, named_cube("child")).is_none());
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn global_matrix_composes_parent_and_local() {
    let mut scene = Scene::new();
    let mut parent = Object::empty("parent");
    parent.position = Vec3::new(1.0, 0.0, 0.0);
    parent.set_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
    let mut child = named_cube("child");
    child.position = Vec3::new(0.0, 0.0, 2.0);
    child.scale = Vec3::splat(0.5);
    let root = scene.add_object(parent.with_child(child));

    scene.prepare_objects();
    let parent = scene.object(root).unwrap();
    let child_key = parent.children()[0];
    let child = scene.object(child_key).unwrap();

    let expected = parent.model_matrix() * child.model_matrix();
    assert!(mat_approx(child.global_model_matrix(), expected));

    // (0, 0, 2) rotated 90° about Y is (2, 0, 0), plus the parent offset.
    let origin = child.global_model_matrix().transform_point3(Vec3::ZERO);
    assert!(origin.abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), EPSILON), "got {origin}");
}

#[test]
fn global_matrix_is_stale_until_flatten() {
    let mut scene = Scene::new();
    let key = scene.add_object(named_cube("cube"));
    scene.prepare_objects();
    scene.object_mut(key).unwrap().position = Vec3::new(0.0, 5.0, 0.0);

    assert!(mat_approx(scene.object(key).unwrap().global_model_matrix(), Mat4::IDENTITY));
    scene.prepare_objects();
    let moved = scene.object(key).unwrap().global_model_matrix();
    assert!(mat_approx(moved, Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0))));
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn removal_is_deferred_to_next_flatten() {
    let mut scene = Scene::new();
    let key = scene.add_object(named_cube("doomed").with_child(named_cube("child")));
    scene.add_object(named_cube("kept"));
    scene.prepare_objects();
    assert_eq!(scene.object_count(), 3);

    scene.remove_object(key);
    assert!(scene.contains(key));
    assert!(scene.object(key).unwrap().is_marked_removed());

    scene.prepare_objects();
    assert!(!scene.contains(key));
    assert_eq!(scene.object_count(), 1);
    assert_eq!(names(&scene, scene.opaque_objects()), ["kept"]);
}

#[test]
fn remove_by_name_only_matches_roots() {
    let mut scene = Scene::new();
    scene.add_object(named_cube("x").with_child(named_cube("y")));
    scene.add_object(named_cube("y"));
    scene.add_object(named_cube("x"));

    scene.remove_objects_by_name("y");
    scene.prepare_objects();
    assert_eq!(names(&scene, scene.opaque_objects()), ["x", "y", "x"]);
    assert_eq!(scene.roots().len(), 2);
}

#[test]
fn removing_a_child_detaches_it_from_its_parent() {
    let mut scene = Scene::new();
    let root = scene.add_object(named_cube("root"));
    let child = scene.add_child(root, named_cube("child")).unwrap();

    scene.remove_object(child);
    scene.prepare_objects();
    assert!(scene.object(root).unwrap().children().is_empty());
    assert_eq!(names(&scene, scene.opaque_objects()), ["root"]);
}

// ============================================================================
// Lights
// ============================================================================

#[test]
fn shadow_light_replaces_first_directional() {
    let mut scene = Scene::new();
    scene.set_shadow_light(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE));
    assert_eq!(scene.directional_lights().len(), 1);

    scene.add_directional_light(DirectionalLight::new(Vec3::X, Vec3::splat(0.5)));
    scene.set_shadow_light(DirectionalLight::new(Vec3::NEG_Z, Vec3::splat(2.0)));
    let lights = scene.directional_lights();
    assert_eq!(lights.len(), 2);
    assert!(lights[0].emission.abs_diff_eq(Vec3::splat(2.0), EPSILON));
    assert!(lights[1].emission.abs_diff_eq(Vec3::splat(0.5), EPSILON));
}

#[test]
fn custom_mesh_object_is_renderable() {
    let mut scene = Scene::new();
    scene.add_object(Object::new(Some(Arc::new(Mesh::plane()))));
    scene.prepare_objects();
    assert_eq!(scene.opaque_objects().len(), 1);
}
