//! Triangle setup and rasterization.
//!
//! Clip space follows GL: a vertex is kept when `z >= -w`, NDC depth maps
//! to window depth as `z * 0.5 + 0.5`, and window `y` grows upwards.
//! Counter-clockwise triangles are front facing.

use glam::{IVec4, Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use smallvec::SmallVec;

use super::storage::Surface;
use crate::renderer::core::{BlendMode, RasterState, Viewport};
use crate::scene::mesh::Mesh;

/// Maximum number of color attachments a framebuffer may carry.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

// ============================================================================
// Vertex Stage
// ============================================================================

/// Interpolated per-vertex data.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Varyings {
    pub position_vs: Vec3,
    pub normal_vs: Vec3,
    pub uv: Vec2,
}

impl Varyings {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            position_vs: a.position_vs.lerp(b.position_vs, t),
            normal_vs: a.normal_vs.lerp(b.normal_vs, t),
            uv: a.uv.lerp(b.uv, t),
        }
    }

    fn weighted(v: [&Self; 3], w: [f32; 3]) -> Self {
        Self {
            position_vs: v[0].position_vs * w[0] + v[1].position_vs * w[1] + v[2].position_vs * w[2],
            normal_vs: v[0].normal_vs * w[0] + v[1].normal_vs * w[1] + v[2].normal_vs * w[2],
            uv: v[0].uv * w[0] + v[1].uv * w[1] + v[2].uv * w[2],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClipVertex {
    pub clip: Vec4,
    pub var: Varyings,
}

/// Matrices the vertex stage applies to every mesh vertex.
#[derive(Debug, Clone, Copy)]
pub(crate) enum VertexTransform {
    Object {
        clip_from_object: Mat4,
        view_from_object: Mat4,
    },
    /// `[0, 1]²` quad positions mapped straight to NDC.
    Fullscreen,
}

impl VertexTransform {
    pub fn run(&self, mesh: &Mesh) -> Vec<ClipVertex> {
        match *self {
            Self::Object {
                clip_from_object,
                view_from_object,
            } => {
                let normal_matrix = Mat3::from_mat4(view_from_object).inverse().transpose();
                mesh.vertices()
                    .iter()
                    .map(|v| ClipVertex {
                        clip: clip_from_object * v.position.extend(1.0),
                        var: Varyings {
                            position_vs: view_from_object.transform_point3(v.position),
                            normal_vs: normal_matrix * v.normal,
                            uv: v.uv,
                        },
                    })
                    .collect()
            }
            Self::Fullscreen => mesh
                .vertices()
                .iter()
                .map(|v| ClipVertex {
                    clip: Vec4::new(v.position.x * 2.0 - 1.0, v.position.y * 2.0 - 1.0, 0.0, 1.0),
                    var: Varyings {
                        uv: v.position.truncate(),
                        ..Varyings::default()
                    },
                })
                .collect(),
        }
    }
}

// ============================================================================
// Fragment Interface
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FragOutput {
    Float(Vec4),
    Int(IVec4),
}

pub(crate) type FragOutputs = [Option<FragOutput>; MAX_COLOR_ATTACHMENTS];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    /// Window coordinates of the pixel center.
    pub coord: Vec2,
    pub depth: f32,
    pub var: Varyings,
    /// View-space geometric normal of the triangle, CCW orientation.
    pub face_normal_vs: Vec3,
}

impl Fragment {
    /// The interpolated normal, or the face normal when the mesh has none.
    pub fn normal_vs(&self) -> Vec3 {
        self.var
            .normal_vs
            .try_normalize()
            .unwrap_or(self.face_normal_vs)
    }
}

/// Attachments of the bound framebuffer, detached for the draw.
pub(crate) struct DrawTarget<'s> {
    pub colors: &'s mut [Option<Surface>],
    pub depth: Option<&'s mut Surface>,
    pub viewport: Viewport,
    pub state: RasterState,
}

impl DrawTarget<'_> {
    /// Smallest extent shared by every attachment.
    fn extent(&self) -> (u32, u32) {
        let mut extent = (u32::MAX, u32::MAX);
        let sizes = self
            .colors
            .iter()
            .flatten()
            .map(|s| (s.storage.width(), s.storage.height()))
            .chain(self.depth.iter().map(|d| (d.storage.width(), d.storage.height())));
        for (w, h) in sizes {
            extent = (extent.0.min(w), extent.1.min(h));
        }
        if extent.0 == u32::MAX { (0, 0) } else { extent }
    }
}

// ============================================================================
// Rasterization
// ============================================================================

fn clip_near(tri: [ClipVertex; 3]) -> SmallVec<[ClipVertex; 4]> {
    let dist = |v: &ClipVertex| v.clip.z + v.clip.w;
    let mut out = SmallVec::new();
    for i in 0..3 {
        let a = &tri[i];
        let b = &tri[(i + 1) % 3];
        let (da, db) = (dist(a), dist(b));
        if da >= 0.0 {
            out.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(ClipVertex {
                clip: a.clip.lerp(b.clip, t),
                var: Varyings::lerp(&a.var, &b.var, t),
            });
        }
    }
    out
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    pos: Vec2,
    z: f32,
    inv_w: f32,
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left fill rule for a counter-clockwise, y-up triangle.
#[inline]
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    d.y < 0.0 || (d.y == 0.0 && d.x < 0.0)
}

#[inline]
fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

/// Rasterizes indexed triangles into `target`, calling `shade` once per
/// fragment that passes the depth test.
pub(crate) fn draw_triangles<F>(vertices: &[ClipVertex], indices: &[u32], target: &mut DrawTarget<'_>, mut shade: F)
where
    F: FnMut(&Fragment) -> FragOutputs,
{
    let (tw, th) = target.extent();
    let vp = target.viewport;
    let (min_x, min_y) = (vp.x.min(tw), vp.y.min(th));
    let (max_x, max_y) = ((vp.x + vp.width).min(tw), (vp.y + vp.height).min(th));
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    for tri in indices.chunks_exact(3) {
        let tri = [
            vertices[tri[0] as usize],
            vertices[tri[1] as usize],
            vertices[tri[2] as usize],
        ];
        let face_normal_vs = (tri[1].var.position_vs - tri[0].var.position_vs)
            .cross(tri[2].var.position_vs - tri[0].var.position_vs)
            .normalize_or_zero();

        let polygon = clip_near(tri);
        if polygon.len() < 3 {
            continue;
        }
        let screen: SmallVec<[ScreenVertex; 4]> = polygon
            .iter()
            .map(|v| {
                let inv_w = 1.0 / v.clip.w;
                let ndc = v.clip.xyz() * inv_w;
                ScreenVertex {
                    pos: Vec2::new(
                        vp.x as f32 + (ndc.x * 0.5 + 0.5) * vp.width as f32,
                        vp.y as f32 + (ndc.y * 0.5 + 0.5) * vp.height as f32,
                    ),
                    z: ndc.z,
                    inv_w,
                }
            })
            .collect();

        for k in 1..polygon.len() - 1 {
            let idx = [0, k, k + 1];
            raster_triangle(
                [&screen[idx[0]], &screen[idx[1]], &screen[idx[2]]],
                [&polygon[idx[0]].var, &polygon[idx[1]].var, &polygon[idx[2]].var],
                face_normal_vs,
                (min_x, min_y, max_x, max_y),
                target,
                &mut shade,
            );
        }
    }
}

fn raster_triangle<F>(
    mut s: [&ScreenVertex; 3],
    mut v: [&Varyings; 3],
    face_normal_vs: Vec3,
    bounds: (u32, u32, u32, u32),
    target: &mut DrawTarget<'_>,
    shade: &mut F,
) where
    F: FnMut(&Fragment) -> FragOutputs,
{
    let mut area = edge(s[0].pos, s[1].pos, s[2].pos);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        if target.state.cull_back {
            return;
        }
        s.swap(1, 2);
        v.swap(1, 2);
        area = -area;
    }

    let lo = s[0].pos.min(s[1].pos).min(s[2].pos);
    let hi = s[0].pos.max(s[1].pos).max(s[2].pos);
    let x0 = (lo.x.floor().max(bounds.0 as f32)) as u32;
    let y0 = (lo.y.floor().max(bounds.1 as f32)) as u32;
    let x1 = (hi.x.ceil().min(bounds.2 as f32)) as u32;
    let y1 = (hi.y.ceil().min(bounds.3 as f32)) as u32;

    let top_left = [
        is_top_left(s[1].pos, s[2].pos),
        is_top_left(s[2].pos, s[0].pos),
        is_top_left(s[0].pos, s[1].pos),
    ];
    let state = target.state;

    for py in y0..y1 {
        for px in x0..x1 {
            let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
            let w = [
                edge(s[1].pos, s[2].pos, p),
                edge(s[2].pos, s[0].pos, p),
                edge(s[0].pos, s[1].pos, p),
            ];
            if !(0..3).all(|i| covers(w[i], top_left[i])) {
                continue;
            }
            let l = w.map(|wi| wi / area);
            let z = l[0] * s[0].z + l[1] * s[1].z + l[2] * s[2].z;
            let depth = z * 0.5 + 0.5;

            if state.depth_test
                && let Some(d) = target.depth.as_deref_mut()
            {
                if !(depth < d.depth(px, py)) {
                    continue;
                }
                if state.depth_write {
                    d.storage.store(px, py, Vec4::splat(depth));
                }
            }

            let q = [l[0] * s[0].inv_w, l[1] * s[1].inv_w, l[2] * s[2].inv_w];
            let sum = q[0] + q[1] + q[2];
            let pw = q.map(|qi| qi / sum);
            let fragment = Fragment {
                coord: p,
                depth,
                var: Varyings::weighted(v, pw),
                face_normal_vs,
            };

            let outputs = shade(&fragment);
            write_outputs(&mut *target.colors, px, py, &outputs, state.blend);
        }
    }
}

fn write_outputs(colors: &mut [Option<Surface>], x: u32, y: u32, outputs: &FragOutputs, blend: Option<BlendMode>) {
    for (surface, out) in colors.iter_mut().zip(outputs) {
        let (Some(surface), Some(out)) = (surface, out) else {
            continue;
        };
        match (*out, surface.is_integer()) {
            (FragOutput::Int(value), true) => surface.storage.store_int(x, y, value),
            (FragOutput::Float(src), false) => {
                let value = match blend {
                    Some(BlendMode::Alpha) => {
                        let dst = surface.storage.fetch(x, y);
                        src * src.w + dst * (1.0 - src.w)
                    }
                    None => src,
                };
                surface.storage.store(x, y, value);
            }
            // Mismatched output types leave the attachment untouched.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::software::storage::TextureStorage;
    use crate::renderer::core::{TextureDescriptor, TextureFormat};

    fn surface(format: TextureFormat, size: u32) -> Surface {
        Surface {
            storage: TextureStorage::new(TextureDescriptor::new("t", size, size, format)),
        }
    }

    fn quad() -> Vec<ClipVertex> {
        VertexTransform::Fullscreen.run(&Mesh::fullscreen_quad())
    }

    #[test]
    fn fullscreen_quad_covers_every_pixel_once() {
        let mut colors = [Some(surface(TextureFormat::R32Float, 7))];
        let mut target = DrawTarget {
            colors: &mut colors,
            depth: None,
            viewport: Viewport::new(7, 7),
            state: RasterState {
                blend: Some(BlendMode::Alpha),
                ..RasterState::SCREEN
            },
        };
        let mut count = 0;
        draw_triangles(&quad(), Mesh::fullscreen_quad().indices(), &mut target, |_| {
            count += 1;
            let mut out = [None; MAX_COLOR_ATTACHMENTS];
            out[0] = Some(FragOutput::Float(Vec4::new(1.0, 0.0, 0.0, 0.5)));
            out
        });
        assert_eq!(count, 49);
        let s = colors[0].as_ref().unwrap();
        assert!((s.storage.fetch(3, 3).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clipping_behind_near_plane() {
        let v = |z: f32, w: f32| ClipVertex {
            clip: Vec4::new(0.0, 0.0, z, w),
            var: Varyings::default(),
        };
        assert!(clip_near([v(-2.0, 1.0), v(-3.0, 1.0), v(-2.5, 1.0)]).is_empty());
        assert_eq!(clip_near([v(0.0, 1.0), v(-3.0, 1.0), v(0.5, 1.0)]).len(), 4);
    }
}
