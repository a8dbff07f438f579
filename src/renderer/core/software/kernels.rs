//! Built-in fragment kernels.
//!
//! Each compiled program names one kernel. Before a draw the kernel reads
//! its uniforms once ([`Kernel::prepare`]); rasterization then calls
//! [`Kernel::shade`] per fragment without touching the uniform table.
//!
//! | kernel         | outputs                                                  |
//! |----------------|----------------------------------------------------------|
//! | `gbuffer`      | albedo, normal, material, seg id, obj id, seg color, user |
//! | `shadow`       | depth only                                               |
//! | `ao`           | occlusion factor                                         |
//! | `lighting`     | shaded color                                             |
//! | `transparency` | shaded color with alpha, seg id, obj id, seg color       |
//! | `axis`         | flat color, obj id                                       |
//! | `copy` / `tonemap` / `depth` | one sampler, visualized                    |

use std::f32::consts::TAU;

use glam::{IVec4, Mat3, Mat4, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};
use smallvec::SmallVec;

use super::program::{KernelKind, Program};
use super::raster::{FragOutput, FragOutputs, Fragment, MAX_COLOR_ATTACHMENTS};
use super::storage::{TextureStorage, TextureTable};
use crate::renderer::core::UniformValue;
use crate::scene::texture::{CubeMap, Texture};

const SHADOW_BIAS: f32 = 0.005;
const AO_RADIUS: f32 = 0.5;
const AO_BIAS: f32 = 0.025;
const AO_KERNEL: [Vec3; 8] = [
    Vec3::new(0.5381, 0.1856, 0.4319),
    Vec3::new(0.1379, 0.2486, 0.4430),
    Vec3::new(0.3371, 0.5679, 0.0057),
    Vec3::new(-0.6999, -0.0451, 0.0019),
    Vec3::new(0.0689, -0.1598, 0.8547),
    Vec3::new(0.0560, 0.0069, 0.1843),
    Vec3::new(-0.0146, 0.1402, 0.0762),
    Vec3::new(0.0100, -0.1924, 0.0344),
];

// ============================================================================
// Uniform Views
// ============================================================================

#[derive(Clone, Copy)]
pub(crate) enum SamplerRef<'a> {
    Unbound,
    Device(&'a TextureStorage),
    Image(&'a Texture),
}

impl<'a> SamplerRef<'a> {
    fn resolve(program: &'a Program, textures: &'a TextureTable, name: &str) -> Self {
        match program.value(name) {
            Some(UniformValue::Sampler(id)) => textures.get(*id).map_or(Self::Unbound, Self::Device),
            Some(UniformValue::Image(image)) => Self::Image(image.as_ref()),
            _ => Self::Unbound,
        }
    }

    fn sample(self, uv: Vec2) -> Vec4 {
        match self {
            Self::Unbound => Vec4::ZERO,
            Self::Device(t) => t.sample(uv),
            Self::Image(t) => t.sample(uv),
        }
    }

    fn is_bound(self) -> bool {
        !matches!(self, Self::Unbound)
    }
}

fn cube_map<'a>(program: &'a Program, name: &str) -> Option<&'a CubeMap> {
    match program.value(name) {
        Some(UniformValue::CubeMap(cube)) => Some(cube.as_ref()),
        _ => None,
    }
}

fn segmentation_outputs(program: &Program) -> (IVec4, IVec4, Vec4) {
    (
        IVec4::new(program.int("segmentation"), 0, 0, 0),
        IVec4::new(program.int("segmentation2"), 0, 0, 0),
        program.vec4("segmentation_color"),
    )
}

/// `material.*` uniforms.
pub(crate) struct MaterialView<'a> {
    kd: Vec4,
    ks: f32,
    roughness: f32,
    metallic: f32,
    kd_map: SamplerRef<'a>,
    ks_map: SamplerRef<'a>,
}

impl<'a> MaterialView<'a> {
    fn read(program: &'a Program, textures: &'a TextureTable) -> Self {
        let map = |name: &str| {
            if program.bool(&format!("material.has_{name}")) {
                SamplerRef::resolve(program, textures, &format!("material.{name}"))
            } else {
                SamplerRef::Unbound
            }
        };
        Self {
            kd: program.vec4("material.kd"),
            ks: program.float("material.ks"),
            roughness: program.float("material.roughness"),
            metallic: program.float("material.metallic"),
            kd_map: map("kd_map"),
            ks_map: map("ks_map"),
        }
    }

    fn albedo(&self, uv: Vec2) -> Vec4 {
        if self.kd_map.is_bound() {
            self.kd_map.sample(uv)
        } else {
            self.kd
        }
    }

    fn specular(&self, uv: Vec2) -> f32 {
        if self.ks_map.is_bound() {
            self.ks_map.sample(uv).x
        } else {
            self.ks
        }
    }
}

/// Point on a surface, in view space.
struct SurfacePoint {
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
    ks: f32,
    roughness: f32,
}

struct ShadowLookup<'a> {
    /// Camera space to shadow clip space.
    matrix: Mat4,
    map: SamplerRef<'a>,
}

impl ShadowLookup<'_> {
    fn visibility(&self, position_vs: Vec3) -> f32 {
        let clip = self.matrix * position_vs.extend(1.0);
        let coords = clip.xyz() / clip.w * 0.5 + 0.5;
        if coords.x < 0.0 || coords.x > 1.0 || coords.y < 0.0 || coords.y > 1.0 || coords.z > 1.0 {
            return 1.0;
        }
        let stored = self.map.sample(coords.xy()).x;
        if coords.z - SHADOW_BIAS > stored { 0.0 } else { 1.0 }
    }
}

/// Lights of the current shader, converted to view space.
struct LightSet<'a> {
    /// (direction the light travels, emission)
    directional: SmallVec<[(Vec3, Vec3); 4]>,
    /// (position, emission)
    point: SmallVec<[(Vec3, Vec3); 8]>,
    shadow: Option<ShadowLookup<'a>>,
}

impl<'a> LightSet<'a> {
    fn read(program: &'a Program, textures: &'a TextureTable, view: Mat4) -> Self {
        let rot = Mat3::from_mat4(view);
        let directional = (0..program.array_len("directionalLights"))
            .map(|i| {
                let d = program.vec3(&format!("directionalLights[{i}].direction"));
                let e = program.vec3(&format!("directionalLights[{i}].emission"));
                ((rot * d).normalize_or_zero(), e)
            })
            .collect();
        let point = (0..program.array_len("pointLights"))
            .map(|i| {
                let p = program.vec3(&format!("pointLights[{i}].position"));
                let e = program.vec3(&format!("pointLights[{i}].emission"));
                (view.transform_point3(p), e)
            })
            .collect();
        let shadow = program.bool("shadowLightEnabled").then(|| ShadowLookup {
            matrix: program.mat4("shadowProjectionMatrix") * program.mat4("cameraToShadowMatrix"),
            map: SamplerRef::resolve(program, textures, "shadowtex"),
        });
        Self {
            directional,
            point,
            shadow,
        }
    }

    fn shade(&self, s: &SurfacePoint) -> Vec3 {
        let v = (-s.position).normalize_or_zero();
        let mut color = Vec3::ZERO;
        for (i, (dir, emission)) in self.directional.iter().enumerate() {
            let visibility = match (&self.shadow, i) {
                (Some(lookup), 0) => lookup.visibility(s.position),
                _ => 1.0,
            };
            if visibility > 0.0 {
                color += visibility * blinn_phong(s, -*dir, v) * *emission;
            }
        }
        for (position, emission) in &self.point {
            let d = *position - s.position;
            let dist2 = d.length_squared().max(1e-4);
            color += blinn_phong(s, d / dist2.sqrt(), v) * *emission / dist2;
        }
        color
    }
}

fn blinn_phong(s: &SurfacePoint, l: Vec3, v: Vec3) -> Vec3 {
    let ndl = s.normal.dot(l);
    if ndl <= 0.0 {
        return Vec3::ZERO;
    }
    let h = (l + v).normalize_or_zero();
    let shininess = (2.0 / (s.roughness * s.roughness + 1e-4) - 2.0).clamp(1.0, 1024.0);
    s.albedo * ndl + Vec3::splat(s.ks * s.normal.dot(h).max(0.0).powf(shininess))
}

/// Camera matrices shared by the screen-space kernels.
struct ScreenCamera {
    proj: Mat4,
    proj_inv: Mat4,
}

impl ScreenCamera {
    fn read(program: &Program) -> Self {
        Self {
            proj: program.mat4("gbufferProjectionMatrix"),
            proj_inv: program.mat4("gbufferProjectionMatrixInverse"),
        }
    }

    /// View-space position of the depth sample at `uv`.
    fn reconstruct(&self, uv: Vec2, depth: f32) -> Vec3 {
        let ndc = Vec4::new(uv.x * 2.0 - 1.0, uv.y * 2.0 - 1.0, depth * 2.0 - 1.0, 1.0);
        let p = self.proj_inv * ndc;
        p.xyz() / p.w
    }
}

// ============================================================================
// Kernels
// ============================================================================

pub(crate) struct AoKernel<'a> {
    camera: ScreenCamera,
    depth: SamplerRef<'a>,
    normal: SamplerRef<'a>,
    random: SamplerRef<'a>,
    random_size: Vec2,
}

pub(crate) struct LightingKernel<'a> {
    camera: ScreenCamera,
    albedo: SamplerRef<'a>,
    normal: SamplerRef<'a>,
    material: SamplerRef<'a>,
    depth: SamplerRef<'a>,
    ao: Option<SamplerRef<'a>>,
    skybox: Option<&'a CubeMap>,
    environment_inverse: Mat3,
    ambient: Vec3,
    lights: LightSet<'a>,
}

pub(crate) struct TransparencyKernel<'a> {
    material: MaterialView<'a>,
    opacity: f32,
    ambient: Vec3,
    lights: LightSet<'a>,
    segmentation: (IVec4, IVec4, Vec4),
}

pub(crate) enum Kernel<'a> {
    GBuffer {
        material: MaterialView<'a>,
        user: Vec4,
        segmentation: (IVec4, IVec4, Vec4),
    },
    Shadow,
    Ao(AoKernel<'a>),
    Lighting(Box<LightingKernel<'a>>),
    Transparency(Box<TransparencyKernel<'a>>),
    Axis {
        color: Vec4,
        object_id: IVec4,
    },
    Copy(SamplerRef<'a>),
    Tonemap(SamplerRef<'a>),
    Depth {
        source: SamplerRef<'a>,
        near: f32,
        far: f32,
    },
}

impl<'a> Kernel<'a> {
    pub fn prepare(program: &'a Program, textures: &'a TextureTable) -> Self {
        let sampler = |name: &str| SamplerRef::resolve(program, textures, name);
        match &program.kernel {
            KernelKind::GBuffer => Self::GBuffer {
                material: MaterialView::read(program, textures),
                user: program.mat4("user_data").x_axis,
                segmentation: segmentation_outputs(program),
            },
            KernelKind::Shadow => Self::Shadow,
            KernelKind::Ao => Self::Ao(AoKernel {
                camera: ScreenCamera::read(program),
                depth: sampler("depthtex0"),
                normal: sampler("colortex1"),
                random: sampler("randomtex"),
                random_size: Vec2::new(
                    program.int("randomtexWidth").max(1) as f32,
                    program.int("randomtexHeight").max(1) as f32,
                ),
            }),
            KernelKind::Lighting => {
                let view = program.mat4("gbufferViewMatrix");
                Self::Lighting(Box::new(LightingKernel {
                    camera: ScreenCamera::read(program),
                    albedo: sampler("colortex0"),
                    normal: sampler("colortex1"),
                    material: sampler("colortex2"),
                    depth: sampler("depthtex0"),
                    ao: program.bool("aoEnabled").then(|| sampler("aotex")),
                    skybox: cube_map(program, "skybox"),
                    environment_inverse: Mat3::from_mat4(program.mat4("environmentViewMatrixInverse")),
                    ambient: program.vec3("ambientLight"),
                    lights: LightSet::read(program, textures, view),
                }))
            }
            KernelKind::Transparency => {
                let view = program.mat4("gbufferViewMatrix");
                Self::Transparency(Box::new(TransparencyKernel {
                    material: MaterialView::read(program, textures),
                    opacity: program.float("opacity"),
                    ambient: program.vec3("ambientLight"),
                    lights: LightSet::read(program, textures, view),
                    segmentation: segmentation_outputs(program),
                }))
            }
            KernelKind::Axis => Self::Axis {
                color: program.vec4("color"),
                object_id: IVec4::new(program.int("segmentation2"), 0, 0, 0),
            },
            KernelKind::Copy(name) => Self::Copy(sampler(name)),
            KernelKind::Tonemap(name) => Self::Tonemap(sampler(name)),
            KernelKind::Depth(name) => Self::Depth {
                source: sampler(name),
                near: program.float("near"),
                far: program.float("far"),
            },
        }
    }

    pub fn shade(&self, frag: &Fragment) -> FragOutputs {
        let mut out: FragOutputs = [None; MAX_COLOR_ATTACHMENTS];
        let uv = frag.var.uv;
        match self {
            Self::GBuffer {
                material,
                user,
                segmentation,
            } => {
                let n = frag.normal_vs();
                out[0] = Some(FragOutput::Float(material.albedo(uv)));
                out[1] = Some(FragOutput::Float((n * 0.5 + 0.5).extend(1.0)));
                out[2] = Some(FragOutput::Float(Vec4::new(
                    material.roughness,
                    material.metallic,
                    material.specular(uv),
                    1.0,
                )));
                out[3] = Some(FragOutput::Int(segmentation.0));
                out[4] = Some(FragOutput::Int(segmentation.1));
                out[5] = Some(FragOutput::Float(segmentation.2));
                out[6] = Some(FragOutput::Float(*user));
            }
            Self::Shadow => {}
            Self::Ao(k) => {
                let ao = k.occlusion(frag);
                out[0] = Some(FragOutput::Float(Vec4::new(ao, ao, ao, 1.0)));
            }
            Self::Lighting(k) => out[0] = Some(FragOutput::Float(k.shade(uv))),
            Self::Transparency(k) => {
                let albedo = k.material.albedo(uv);
                let mut n = frag.normal_vs();
                if n.dot(-frag.var.position_vs) < 0.0 {
                    n = -n;
                }
                let surface = SurfacePoint {
                    position: frag.var.position_vs,
                    normal: n,
                    albedo: albedo.xyz(),
                    ks: k.material.specular(uv),
                    roughness: k.material.roughness,
                };
                let color = k.ambient * surface.albedo + k.lights.shade(&surface);
                out[0] = Some(FragOutput::Float(color.extend(albedo.w * k.opacity)));
                out[1] = Some(FragOutput::Int(k.segmentation.0));
                out[2] = Some(FragOutput::Int(k.segmentation.1));
                out[3] = Some(FragOutput::Float(k.segmentation.2));
            }
            Self::Axis { color, object_id } => {
                out[0] = Some(FragOutput::Float(*color));
                out[1] = Some(FragOutput::Int(*object_id));
            }
            Self::Copy(source) => out[0] = Some(FragOutput::Float(source.sample(uv))),
            Self::Tonemap(source) => {
                let c = source.sample(uv).xyz().max(Vec3::ZERO);
                let mapped = (c / (c + 1.0)).powf(1.0 / 2.2);
                out[0] = Some(FragOutput::Float(mapped.extend(1.0)));
            }
            Self::Depth { source, near, far } => {
                let d = source.sample(uv).x;
                let v = linear_depth(d, *near, *far);
                out[0] = Some(FragOutput::Float(Vec4::new(v, v, v, 1.0)));
            }
        }
        out
    }
}

/// Window depth to a [0, 1] linear distance between the clip planes.
fn linear_depth(depth: f32, near: f32, far: f32) -> f32 {
    if depth >= 1.0 || far <= near {
        return 1.0;
    }
    let z = depth * 2.0 - 1.0;
    let linear = 2.0 * near * far / (far + near - z * (far - near));
    ((linear - near) / (far - near)).clamp(0.0, 1.0)
}

impl AoKernel<'_> {
    fn occlusion(&self, frag: &Fragment) -> f32 {
        let uv = frag.var.uv;
        let depth = self.depth.sample(uv).x;
        if depth >= 1.0 {
            return 1.0;
        }
        let p = self.camera.reconstruct(uv, depth);
        let n = (self.normal.sample(uv).xyz() * 2.0 - 1.0).normalize_or_zero();
        if n == Vec3::ZERO {
            return 1.0;
        }

        let angle = self.random.sample(frag.coord / self.random_size).x * TAU;
        let (t, b) = n.any_orthonormal_pair();
        let (sin, cos) = angle.sin_cos();
        let tangent = t * cos + b * sin;
        let bitangent = n.cross(tangent);

        let mut occlusion = 0.0;
        for k in AO_KERNEL {
            let sample = p + (tangent * k.x + bitangent * k.y + n * k.z) * AO_RADIUS;
            let clip = self.camera.proj * sample.extend(1.0);
            if clip.w <= 0.0 {
                continue;
            }
            let suv = clip.xy() / clip.w * 0.5 + 0.5;
            if suv.x < 0.0 || suv.x > 1.0 || suv.y < 0.0 || suv.y > 1.0 {
                continue;
            }
            let scene = self.camera.reconstruct(suv, self.depth.sample(suv).x);
            let range = (AO_RADIUS / (p.z - scene.z).abs().max(1e-4)).min(1.0);
            if scene.z >= sample.z + AO_BIAS {
                occlusion += range;
            }
        }
        1.0 - occlusion / AO_KERNEL.len() as f32
    }
}

impl LightingKernel<'_> {
    fn shade(&self, uv: Vec2) -> Vec4 {
        let depth = self.depth.sample(uv).x;
        if depth >= 1.0 {
            let Some(skybox) = self.skybox else {
                return Vec4::new(0.0, 0.0, 0.0, 1.0);
            };
            let dir = self.camera.reconstruct(uv, 1.0);
            return skybox.sample(self.environment_inverse * dir).xyz().extend(1.0);
        }

        let albedo = self.albedo.sample(uv).xyz();
        let material = self.material.sample(uv);
        let surface = SurfacePoint {
            position: self.camera.reconstruct(uv, depth),
            normal: (self.normal.sample(uv).xyz() * 2.0 - 1.0).normalize_or_zero(),
            albedo,
            ks: material.z,
            roughness: material.x,
        };
        let ao = self.ao.map_or(1.0, |t| t.sample(uv).x);
        (self.ambient * albedo * ao + self.lights.shade(&surface)).extend(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_depth_spans_clip_range() {
        assert!((linear_depth(0.0, 0.1, 10.0)).abs() < 1e-5);
        assert!((linear_depth(1.0, 0.1, 10.0) - 1.0).abs() < 1e-5);
        let a = linear_depth(0.9, 0.1, 10.0);
        let b = linear_depth(0.99, 0.1, 10.0);
        assert!(a < b);
    }

    #[test]
    fn blinn_phong_ignores_back_lighting() {
        let s = SurfacePoint {
            position: Vec3::new(0.0, 0.0, -2.0),
            normal: Vec3::Z,
            albedo: Vec3::ONE,
            ks: 0.0,
            roughness: 0.85,
        };
        assert_eq!(blinn_phong(&s, -Vec3::Z, Vec3::Z), Vec3::ZERO);
        assert!((blinn_phong(&s, Vec3::Z, Vec3::Z) - Vec3::ONE).length() < 1e-5);
    }
}
