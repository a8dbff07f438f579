use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Quat, Vec3};
use slotmap::SlotMap;

use super::light::{DirectionalLight, ParallelogramLight, PointLight};
use super::object::Object;
use super::texture::CubeMap;
use super::{ObjectKey, SceneId};
use crate::errors::Result;

static NEXT_SCENE_ID: AtomicU32 = AtomicU32::new(1);

/// An axis gizmo placement registered with [`Scene::add_axes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxesPlacement {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// The scene container.
///
/// Objects are stored in an arena keyed by [`ObjectKey`]; `roots` keeps the
/// insertion order of top-level objects and each object keeps the order of
/// its children. Ownership is strictly a tree: erasing an object erases its
/// whole subtree.
///
/// # Frame data
///
/// [`prepare_objects`](Self::prepare_objects) rebuilds the opaque and
/// transparent lists and every world matrix. The lists are only valid until
/// the next mutation of the tree.
#[derive(Debug)]
pub struct Scene {
    id: SceneId,
    objects: SlotMap<ObjectKey, Object>,
    roots: Vec<ObjectKey>,

    point_lights: Vec<PointLight>,
    directional_lights: Vec<DirectionalLight>,
    parallelogram_lights: Vec<ParallelogramLight>,
    ambient_light: Vec3,
    environment_map: Option<Arc<CubeMap>>,
    axes: Vec<AxesPlacement>,

    // === Frame-scoped ===
    opaque_objects: Vec<ObjectKey>,
    transparent_objects: Vec<ObjectKey>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SceneId(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed)),
            objects: SlotMap::with_key(),
            roots: Vec::new(),
            point_lights: Vec::new(),
            directional_lights: Vec::new(),
            parallelogram_lights: Vec::new(),
            ambient_light: Vec3::ZERO,
            environment_map: None,
            axes: Vec::new(),
            opaque_objects: Vec::new(),
            transparent_objects: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> SceneId {
        self.id
    }

    // ========================================================================
    // Object tree
    // ========================================================================

    /// Takes ownership of `object` (and its staged children) as a new root.
    pub fn add_object(&mut self, object: Object) -> ObjectKey {
        let key = self.insert_tree(object, None);
        self.roots.push(key);
        key
    }

    /// Appends `child` under `parent`. Returns `None` when `parent` is not
    /// part of this scene.
    pub fn add_child(&mut self, parent: ObjectKey, child: Object) -> Option<ObjectKey> {
        if !self.contains(parent) {
            log::warn!("Scene: add_child on an object outside this scene, ignored");
            return None;
        }
        let key = self.insert_tree(child, Some(parent));
        if let Some(p) = self.objects.get_mut(parent) {
            p.children.push(key);
        }
        Some(key)
    }

    fn insert_tree(&mut self, mut object: Object, parent: Option<ObjectKey>) -> ObjectKey {
        let staged = std::mem::take(&mut object.staged_children);
        object.parent = parent;
        object.scene = Some(self.id);
        object.to_remove = false;
        object.children.clear();
        let key = self.objects.insert(object);
        for child in staged {
            let child_key = self.insert_tree(child, Some(key));
            if let Some(o) = self.objects.get_mut(key) {
                o.children.push(child_key);
            }
        }
        key
    }

    /// Whether `key` names a live object of this scene.
    #[must_use]
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.objects
            .get(key)
            .is_some_and(|o| o.scene == Some(self.id))
    }

    /// Marks `key` for removal. The object stays reachable until the next
    /// [`prepare_objects`](Self::prepare_objects).
    pub fn remove_object(&mut self, key: ObjectKey) {
        let id = self.id;
        if let Some(object) = self.objects.get_mut(key)
            && object.scene == Some(id)
        {
            object.to_remove = true;
        }
    }

    /// Marks every root object called `name` for removal.
    pub fn remove_objects_by_name(&mut self, name: &str) {
        for key in &self.roots {
            if let Some(object) = self.objects.get_mut(*key)
                && object.name == name
            {
                object.to_remove = true;
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn object(&self, key: ObjectKey) -> Option<&Object> {
        self.objects.get(key)
    }

    #[inline]
    pub fn object_mut(&mut self, key: ObjectKey) -> Option<&mut Object> {
        self.objects.get_mut(key)
    }

    /// Top-level objects in insertion order.
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[ObjectKey] {
        &self.roots
    }

    #[inline]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Erases every marked object together with its subtree.
    fn force_remove(&mut self) {
        let marked: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, o)| o.to_remove)
            .map(|(k, _)| k)
            .collect();
        if marked.is_empty() {
            return;
        }

        for key in marked {
            // A marked ancestor may already have erased this one.
            let Some(parent) = self.objects.get(key).map(|o| o.parent) else {
                continue;
            };
            match parent {
                Some(p) => {
                    if let Some(po) = self.objects.get_mut(p) {
                        po.children.retain(|c| *c != key);
                    }
                }
                None => self.roots.retain(|r| *r != key),
            }
            self.erase_subtree(key);
        }
    }

    fn erase_subtree(&mut self, key: ObjectKey) {
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(object) = self.objects.remove(k) {
                stack.extend(object.children);
            }
        }
    }

    // ========================================================================
    // Frame flatten
    // ========================================================================

    /// Erases marked objects, resolves world matrices and rebuilds the
    /// opaque/transparent lists in pre-order.
    ///
    /// Transparent objects keep traversal order; they are not sorted by
    /// distance.
    pub fn prepare_objects(&mut self) {
        self.force_remove();
        self.opaque_objects.clear();
        self.transparent_objects.clear();

        // Children are pushed in reverse so they pop in insertion order.
        let mut stack: Vec<(ObjectKey, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|k| (*k, Mat4::IDENTITY))
            .collect();

        while let Some((key, parent_matrix)) = stack.pop() {
            let Some(object) = self.objects.get_mut(key) else {
                continue;
            };
            object.global_model_matrix = parent_matrix * object.model_matrix();
            if object.is_renderable() {
                if object.is_transparent() {
                    self.transparent_objects.push(key);
                } else {
                    self.opaque_objects.push(key);
                }
            }
            let global = object.global_model_matrix;
            stack.extend(object.children.iter().rev().map(|c| (*c, global)));
        }
    }

    /// Opaque objects from the last flatten.
    #[inline]
    #[must_use]
    pub fn opaque_objects(&self) -> &[ObjectKey] {
        &self.opaque_objects
    }

    /// Transparent objects from the last flatten, in traversal order.
    #[inline]
    #[must_use]
    pub fn transparent_objects(&self) -> &[ObjectKey] {
        &self.transparent_objects
    }

    // ========================================================================
    // Lights & environment
    // ========================================================================

    pub fn set_ambient_light(&mut self, light: Vec3) {
        self.ambient_light = light;
    }

    #[inline]
    #[must_use]
    pub fn ambient_light(&self) -> Vec3 {
        self.ambient_light
    }

    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    pub fn add_directional_light(&mut self, light: DirectionalLight) {
        self.directional_lights.push(light);
    }

    /// Makes `light` the shadow caster: replaces directional light 0, or
    /// adds it when there is none.
    pub fn set_shadow_light(&mut self, light: DirectionalLight) {
        match self.directional_lights.first_mut() {
            Some(first) => *first = light,
            None => self.directional_lights.push(light),
        }
    }

    pub fn add_parallelogram_light(&mut self, light: ParallelogramLight) {
        self.parallelogram_lights.push(light);
    }

    #[inline]
    #[must_use]
    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    #[inline]
    #[must_use]
    pub fn directional_lights(&self) -> &[DirectionalLight] {
        &self.directional_lights
    }

    #[inline]
    #[must_use]
    pub fn parallelogram_lights(&self) -> &[ParallelogramLight] {
        &self.parallelogram_lights
    }

    /// Loads and installs a six-face skybox.
    pub fn set_environment_map(
        &mut self,
        front: impl AsRef<Path>,
        back: impl AsRef<Path>,
        top: impl AsRef<Path>,
        bottom: impl AsRef<Path>,
        left: impl AsRef<Path>,
        right: impl AsRef<Path>,
    ) -> Result<()> {
        let cube = CubeMap::load(front, back, top, bottom, left, right)?;
        self.environment_map = Some(Arc::new(cube));
        Ok(())
    }

    /// Installs (or clears) a shared environment map.
    pub fn set_environment_cube_map(&mut self, cube: Option<Arc<CubeMap>>) {
        self.environment_map = cube;
    }

    #[inline]
    #[must_use]
    pub fn environment_map(&self) -> Option<&Arc<CubeMap>> {
        self.environment_map.as_ref()
    }

    // ========================================================================
    // Axis gizmos
    // ========================================================================

    /// Registers a small axis gizmo drawn by the axis pass.
    pub fn add_axes(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.axes.push(AxesPlacement {
            position,
            rotation,
            scale,
        });
    }

    pub fn clear_axes(&mut self) {
        self.axes.clear();
    }

    #[inline]
    #[must_use]
    pub fn axes(&self) -> &[AxesPlacement] {
        &self.axes
    }
}
