//! WGSL program reflection, shared by every device.
//!
//! A program is a vertex module and a fragment module, each parsed and
//! validated by naga. Resources are then addressed by GL-style names:
//!
//! - members of every `var<uniform>` block are flattened with the block
//!   variable's own name dropped: `near`, `material.kd`,
//!   `pointLights[1].emission`
//! - textures are addressed by variable name; a `.` in a requested name
//!   reads as `_`, so `material.kd_map` finds `var material_kd_map`
//!
//! The vertex module binds at `@group(0)` and the fragment module at
//! `@group(1)`. A name declared by both stages resolves to both.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{LumenError, Result};

pub(crate) const VERTEX_GROUP: u32 = 0;
pub(crate) const FRAGMENT_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    #[inline]
    pub fn group(self) -> u32 {
        match self {
            Self::Vertex => VERTEX_GROUP,
            Self::Fragment => FRAGMENT_GROUP,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// Host-visible type of one flattened uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Int,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct UniformField {
    /// Index into [`ProgramInterface::blocks`].
    pub block: usize,
    pub offset: u32,
    pub kind: FieldKind,
}

#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    pub stage: Stage,
    pub binding: u32,
    /// Byte size, rounded up to 16.
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TextureKind {
    /// `texture_2d<f32>`
    Float,
    /// `texture_2d<i32>`
    Sint,
    /// `texture_2d<u32>`
    Uint,
    /// `texture_depth_2d`
    Depth,
    /// `texture_cube<f32>`
    Cube,
}

#[derive(Debug, Clone)]
pub(crate) struct TextureSlot {
    pub name: String,
    pub stage: Stage,
    pub binding: u32,
    pub kind: TextureKind,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplerSlot {
    pub stage: Stage,
    pub binding: u32,
}

/// Everything a device needs to know about a program's resources.
#[derive(Debug)]
pub(crate) struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub blocks: Vec<UniformBlock>,
    /// Ordered by stage, then binding.
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<SamplerSlot>,
    /// `@location`s written by the fragment entry point.
    pub outputs: SmallVec<[u32; 8]>,
    fields: FxHashMap<String, SmallVec<[UniformField; 2]>>,
    arrays: FxHashMap<String, usize>,
}

/// Texture lookup key for a uniform name.
pub(crate) fn texture_key(name: &str) -> String {
    name.replace('.', "_")
}

impl ProgramInterface {
    pub fn reflect(label: &str, vertex: &str, fragment: &str) -> Result<Self> {
        let vs = parse(label, Stage::Vertex, vertex)?;
        let fs = parse(label, Stage::Fragment, fragment)?;

        let fail = |message: String| LumenError::ShaderCompile {
            label: label.to_string(),
            message,
        };
        let vertex_entry = entry_point(&vs, naga::ShaderStage::Vertex)
            .ok_or_else(|| fail("vertex module has no @vertex entry point".to_string()))?;
        let fragment_entry = entry_point(&fs, naga::ShaderStage::Fragment)
            .ok_or_else(|| fail("fragment module has no @fragment entry point".to_string()))?;

        let mut interface = Self {
            vertex_entry: vertex_entry.name.clone(),
            fragment_entry: fragment_entry.name.clone(),
            blocks: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            outputs: fragment_outputs(&fs, fragment_entry),
            fields: FxHashMap::default(),
            arrays: FxHashMap::default(),
        };
        interface.collect(&vs, Stage::Vertex).map_err(fail)?;
        interface.collect(&fs, Stage::Fragment).map_err(fail)?;
        interface.textures.sort_by_key(|t| (t.stage.group(), t.binding));
        Ok(interface)
    }

    /// Uniform members named `name`, one per declaring stage.
    #[inline]
    pub fn fields(&self, name: &str) -> &[UniformField] {
        self.fields.get(name).map_or(&[], |f| f.as_slice())
    }

    /// Indices into [`textures`](Self::textures) addressed by `name`.
    pub fn texture_slots(&self, name: &str) -> SmallVec<[usize; 2]> {
        let key = texture_key(name);
        self.textures
            .iter()
            .enumerate()
            .filter(|(_, t)| t.name == key)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.fields.contains_key(name) || !self.texture_slots(name).is_empty()
    }

    /// Declared length of a uniform array, zero when absent.
    #[inline]
    pub fn array_len(&self, name: &str) -> usize {
        self.arrays.get(name).copied().unwrap_or(0)
    }

    /// First texture declared by the fragment module.
    pub fn first_fragment_texture(&self) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.stage == Stage::Fragment)
    }

    fn collect(&mut self, module: &naga::Module, stage: Stage) -> std::result::Result<(), String> {
        for (_, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            let name = var.name.clone().unwrap_or_default();
            if binding.group != stage.group() {
                return Err(format!(
                    "{} resource '{name}' must use @group({})",
                    stage.label(),
                    stage.group()
                ));
            }

            let inner = &module.types[var.ty].inner;
            match var.space {
                naga::AddressSpace::Uniform => {
                    let block = self.blocks.len();
                    let size = inner.size(module.to_ctx()).next_multiple_of(16);
                    self.blocks.push(UniformBlock {
                        stage,
                        binding: binding.binding,
                        size,
                    });
                    // A struct block exposes its members, anything else its own name.
                    let prefix = if matches!(inner, naga::TypeInner::Struct { .. }) {
                        ""
                    } else {
                        name.as_str()
                    };
                    self.flatten(module, var.ty, prefix, 0, block);
                }
                naga::AddressSpace::Handle => match inner {
                    naga::TypeInner::Image { dim, arrayed, class } => {
                        let kind = texture_kind(*dim, *arrayed, class)
                            .ok_or_else(|| format!("texture '{name}' has an unsupported type"))?;
                        self.textures.push(TextureSlot {
                            name,
                            stage,
                            binding: binding.binding,
                            kind,
                        });
                    }
                    naga::TypeInner::Sampler { comparison: false } => self.samplers.push(SamplerSlot {
                        stage,
                        binding: binding.binding,
                    }),
                    _ => return Err(format!("resource '{name}' has an unsupported type")),
                },
                _ => return Err(format!("resource '{name}' is not a uniform, texture or sampler")),
            }
        }
        Ok(())
    }

    fn flatten(&mut self, module: &naga::Module, ty: naga::Handle<naga::Type>, path: &str, base: u32, block: usize) {
        let join = |name: &str| {
            if path.is_empty() {
                name.to_string()
            } else {
                format!("{path}.{name}")
            }
        };
        match &module.types[ty].inner {
            naga::TypeInner::Struct { members, .. } => {
                for member in members {
                    let Some(name) = &member.name else {
                        continue;
                    };
                    self.flatten(module, member.ty, &join(name), base + member.offset, block);
                }
            }
            naga::TypeInner::Array {
                base: element,
                size: naga::ArraySize::Constant(len),
                stride,
            } => {
                let len = len.get();
                self.arrays.insert(path.to_string(), len as usize);
                for i in 0..len {
                    self.flatten(module, *element, &format!("{path}[{i}]"), base + i * stride, block);
                }
                // `name` addresses `name[0]` for arrays of plain values.
                let kind = field_kind(&module.types[*element].inner);
                if kind != FieldKind::Other {
                    self.push_field(path, block, base, kind);
                }
            }
            inner => self.push_field(path, block, base, field_kind(inner)),
        }
    }

    fn push_field(&mut self, path: &str, block: usize, offset: u32, kind: FieldKind) {
        self.fields
            .entry(path.to_string())
            .or_default()
            .push(UniformField { block, offset, kind });
    }
}

fn parse(label: &str, stage: Stage, source: &str) -> Result<naga::Module> {
    let fail = |message: String| LumenError::ShaderCompile {
        label: label.to_string(),
        message: format!("{} module: {message}", stage.label()),
    };
    let module = naga::front::wgsl::parse_str(source).map_err(|e| fail(e.emit_to_string(source)))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
        .validate(&module)
        .map_err(|e| fail(e.emit_to_string(source)))?;
    Ok(module)
}

fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|ep| ep.stage == stage)
}

fn fragment_outputs(module: &naga::Module, entry: &naga::EntryPoint) -> SmallVec<[u32; 8]> {
    let Some(result) = &entry.function.result else {
        return SmallVec::new();
    };
    if let Some(naga::Binding::Location { location, .. }) = &result.binding {
        return SmallVec::from_slice(&[*location]);
    }
    match &module.types[result.ty].inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|m| match &m.binding {
                Some(naga::Binding::Location { location, .. }) => Some(*location),
                _ => None,
            })
            .collect(),
        _ => SmallVec::new(),
    }
}

fn field_kind(inner: &naga::TypeInner) -> FieldKind {
    use naga::{ScalarKind, TypeInner, VectorSize};
    match inner {
        TypeInner::Scalar(s) => match s.kind {
            ScalarKind::Sint => FieldKind::Int,
            ScalarKind::Uint => FieldKind::Uint,
            ScalarKind::Float => FieldKind::Float,
            _ => FieldKind::Other,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => FieldKind::Vec2,
            VectorSize::Tri => FieldKind::Vec3,
            VectorSize::Quad => FieldKind::Vec4,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => FieldKind::Mat4,
        _ => FieldKind::Other,
    }
}

fn texture_kind(dim: naga::ImageDimension, arrayed: bool, class: &naga::ImageClass) -> Option<TextureKind> {
    use naga::{ImageClass, ImageDimension, ScalarKind};
    if arrayed {
        return None;
    }
    match (dim, class) {
        (ImageDimension::D2, ImageClass::Sampled { kind, multi: false }) => match kind {
            ScalarKind::Float => Some(TextureKind::Float),
            ScalarKind::Sint => Some(TextureKind::Sint),
            ScalarKind::Uint => Some(TextureKind::Uint),
            _ => None,
        },
        (ImageDimension::D2, ImageClass::Depth { multi: false }) => Some(TextureKind::Depth),
        (
            ImageDimension::Cube,
            ImageClass::Sampled {
                kind: ScalarKind::Float,
                multi: false,
            },
        ) => Some(TextureKind::Cube),
        _ => None,
    }
}
