//! Immutable triangle geometry.
//!
//! Meshes are shared between objects through `Arc<Mesh>` and drawn as
//! indexed triangle lists. File import lives outside this crate; the
//! builders here cover the primitives the pipeline itself needs (the axis
//! gizmo cube and the fullscreen quad) plus a plane for test scenes.

use glam::{Vec2, Vec3};

/// A single mesh vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    /// Zero when the mesh carries no normals; the rasterizer then uses
    /// the face normal.
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    /// Creates a mesh. Trailing indices that do not form a full triangle and
    /// indices past the vertex buffer are dropped with a warning.
    #[must_use]
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, mut indices: Vec<u32>) -> Self {
        let name = name.into();
        let count = vertices.len() as u32;
        if indices.iter().any(|&i| i >= count) {
            log::warn!("Mesh '{name}': index out of range, dropping invalid triangles");
            let mut kept = Vec::with_capacity(indices.len());
            for tri in indices.chunks_exact(3) {
                if tri.iter().all(|&i| i < count) {
                    kept.extend_from_slice(tri);
                }
            }
            indices = kept;
        }
        indices.truncate(indices.len() / 3 * 3);
        Self {
            name,
            vertices,
            indices,
        }
    }

    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates triangles as vertex triples.
    pub fn triangles(&self) -> impl Iterator<Item = [&Vertex; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                &self.vertices[t[0] as usize],
                &self.vertices[t[1] as usize],
                &self.vertices[t[2] as usize],
            ]
        })
    }

    /// The [-1, 1]³ cube, counter-clockwise faces, no normals.
    #[must_use]
    pub fn cube() -> Self {
        let vertices = [
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
        ]
        .map(|p| Vertex::at(Vec3::from_array(p)))
        .to_vec();
        let indices = vec![
            0, 1, 2, 2, 3, 0, // +z
            1, 5, 6, 6, 2, 1, // +x
            7, 6, 5, 5, 4, 7, // -z
            4, 0, 3, 3, 7, 4, // -x
            4, 5, 1, 1, 0, 4, // -y
            3, 2, 6, 6, 7, 3, // +y
        ];
        Self::new("cube", vertices, indices)
    }

    /// A [-1, 1]² plane in XY facing +Z.
    #[must_use]
    pub fn plane() -> Self {
        let n = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), n, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), n, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), n, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::new(1.0, 1.0)),
        ];
        Self::new("plane", vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// The unit quad `[0, 1]²` used by screen-space passes.
    #[must_use]
    pub fn fullscreen_quad() -> Self {
        let vertices = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            .map(|[x, y]| Vertex::new(Vec3::new(x, y, 0.0), Vec3::ZERO, Vec2::new(x, y)))
            .to_vec();
        Self::new("fullscreen quad", vertices, vec![0, 1, 2, 0, 2, 3])
    }
}
