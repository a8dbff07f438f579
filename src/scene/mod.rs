//! Scene graph
//!
//! Host-side description of a frame:
//! - [`Object`]: scene node (transform, mesh, material, picking ids, children)
//! - [`Scene`]: object arena, lights, environment map and the per-frame
//!   opaque/transparent flatten
//! - [`Camera`] / [`FpsCamera`]: anything implementing [`CameraSpec`]
//! - [`PbrMaterial`], [`Mesh`], [`Texture`], [`CubeMap`]: shared resources

pub mod camera;
pub mod light;
pub mod material;
pub mod mesh;
pub mod object;
pub mod scene;
pub mod texture;
pub mod transform;

pub use camera::{Camera, CameraSpec, FpsCamera, Projection};
pub use light::{DirectionalLight, ParallelogramLight, PointLight};
pub use material::PbrMaterial;
pub use mesh::{Mesh, Vertex};
pub use object::{Object, USER_DATA_LEN};
pub use scene::{AxesPlacement, Scene};
pub use texture::{CubeMap, Texture};

use slotmap::new_key_type;

new_key_type! {
    /// Handle of an object stored in a [`Scene`].
    pub struct ObjectKey;
}

/// Identity of a [`Scene`], used for the objects' back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub(crate) u32);
