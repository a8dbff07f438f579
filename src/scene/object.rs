use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};

use super::material::PbrMaterial;
use super::mesh::Mesh;
use super::transform::local_matrix;
use super::{ObjectKey, SceneId};
use crate::renderer::core::ProgramId;

/// Number of floats in the opaque per-object user payload.
pub const USER_DATA_LEN: usize = 16;

/// A scene-graph node: transform, optional mesh, material and picking ids.
///
/// # Hierarchy
///
/// Once inserted into a [`Scene`](super::Scene) the node lives in the
/// scene's arena and refers to its children by [`ObjectKey`]. Before
/// insertion, children are staged with [`Object::add_child`] and move into
/// the arena together with their parent.
///
/// `parent` and `scene` are back-references written only by the scene when
/// it takes ownership; they are never set by user code.
///
/// # Transform
///
/// `global_model_matrix` is derived data, rewritten by every
/// [`Scene::prepare_objects`](super::Scene::prepare_objects) as
/// `parent.global × local`. Reading it between a tree mutation and the next
/// flatten yields the previous frame's value.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub position: Vec3,
    pub scale: Vec3,
    rotation: Quat,

    mesh: Option<Arc<Mesh>>,
    pub material: Arc<PbrMaterial>,
    /// Overrides the GBuffer pass's default program for this object.
    pub shader: Option<ProgramId>,

    /// Opacity in [0, 1]. Zero hides the object, values below one make it
    /// transparent.
    pub visibility: f32,
    segment_id: u32,
    obj_id: u32,
    user_data: [f32; USER_DATA_LEN],

    pub(crate) global_model_matrix: Mat4,

    // === Hierarchy ===
    pub(crate) parent: Option<ObjectKey>,
    pub(crate) children: Vec<ObjectKey>,
    pub(crate) staged_children: Vec<Object>,
    pub(crate) scene: Option<SceneId>,
    pub(crate) to_remove: bool,
}

impl Object {
    /// Creates an object, optionally drawing `mesh`.
    #[must_use]
    pub fn new(mesh: Option<Arc<Mesh>>) -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            mesh,
            material: Arc::new(PbrMaterial::new()),
            shader: None,
            visibility: 1.0,
            segment_id: 0,
            obj_id: 0,
            user_data: [0.0; USER_DATA_LEN],
            global_model_matrix: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            staged_children: Vec::new(),
            scene: None,
            to_remove: false,
        }
    }

    /// A mesh-less grouping node.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(None)
        }
    }

    /// A unit cube named `"cube"`.
    #[must_use]
    pub fn cube() -> Self {
        Self {
            name: "cube".to_string(),
            ..Self::new(Some(Arc::new(Mesh::cube())))
        }
    }

    /// Three thin red/green/blue boxes along +X/+Y/+Z under one empty parent.
    #[must_use]
    pub fn axes() -> Self {
        let cube = Arc::new(Mesh::cube());
        let mut axes = Self::empty("axes");
        for (axis, color) in [
            (Vec3::X, Vec4::new(1.0, 0.0, 0.0, 1.0)),
            (Vec3::Y, Vec4::new(0.0, 1.0, 0.0, 1.0)),
            (Vec3::Z, Vec4::new(0.0, 0.0, 1.0, 1.0)),
        ] {
            let mut bar = Self::new(Some(Arc::clone(&cube)));
            bar.scale = Vec3::splat(0.01) + axis * 0.99;
            bar.position = axis;
            bar.material = Arc::new(PbrMaterial::with_diffuse("axis", color));
            axes.add_child(bar);
        }
        axes
    }

    // ========================================================================
    // Transform
    // ========================================================================

    /// Sets the rotation; the quaternion is normalized.
    #[inline]
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// The local model matrix (rotation, per-axis scale, translation).
    #[inline]
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        local_matrix(self.position, self.rotation, self.scale)
    }

    /// World transform resolved by the last flatten.
    #[inline]
    #[must_use]
    pub fn global_model_matrix(&self) -> Mat4 {
        self.global_model_matrix
    }

    // ========================================================================
    // Components
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    pub fn set_mesh(&mut self, mesh: Option<Arc<Mesh>>) {
        self.mesh = mesh;
    }

    /// Mutable access to the material, cloning it if it is shared.
    pub fn material_mut(&mut self) -> &mut PbrMaterial {
        Arc::make_mut(&mut self.material)
    }

    #[inline]
    pub fn set_segment_id(&mut self, id: u32) {
        self.segment_id = id;
    }

    #[inline]
    #[must_use]
    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    #[inline]
    pub fn set_obj_id(&mut self, id: u32) {
        self.obj_id = id;
    }

    #[inline]
    #[must_use]
    pub fn obj_id(&self) -> u32 {
        self.obj_id
    }

    pub fn set_user_data(&mut self, data: [f32; USER_DATA_LEN]) {
        self.user_data = data;
    }

    #[inline]
    #[must_use]
    pub fn user_data(&self) -> &[f32; USER_DATA_LEN] {
        &self.user_data
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Stages `child` under this object. Only valid before the object is
    /// inserted into a scene; use [`Scene::add_child`](super::Scene::add_child)
    /// afterwards.
    pub fn add_child(&mut self, child: Object) {
        if child.scene.is_some() {
            log::warn!("Object '{}': child already belongs to a scene, ignored", child.name);
            return;
        }
        self.staged_children.push(child);
    }

    /// Builder form of [`add_child`](Self::add_child).
    #[must_use]
    pub fn with_child(mut self, child: Object) -> Self {
        self.add_child(child);
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<ObjectKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[ObjectKey] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn scene(&self) -> Option<SceneId> {
        self.scene
    }

    #[inline]
    #[must_use]
    pub fn is_marked_removed(&self) -> bool {
        self.to_remove
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Whether the flatten pass routes this object anywhere at all.
    #[inline]
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.mesh.is_some() && self.visibility > 0.0
    }

    /// Transparent iff forced, or alpha below one without a diffuse map,
    /// or partially visible.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        let m = &self.material;
        m.force_transparency || (!m.has_kd_map() && m.kd.w < 1.0) || self.visibility < 1.0
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new(None)
    }
}
