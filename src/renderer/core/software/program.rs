//! Program compilation for the software device.
//!
//! A program is a vertex/fragment WGSL pair. The device does not execute
//! WGSL; it validates and reflects both modules (so that name lookups
//! behave like the GPU device's) and evaluates the built-in fragment kernel
//! named by the fragment entry point: `fs_gbuffer`, `fs_lighting`, ...
//! The `copy`, `tonemap` and `depth` kernels read the first texture the
//! fragment module declares.

use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};
use crate::renderer::core::UniformValue;
use crate::renderer::core::reflect::{ProgramInterface, texture_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KernelKind {
    GBuffer,
    Shadow,
    Ao,
    Lighting,
    Transparency,
    Axis,
    Copy(String),
    Tonemap(String),
    Depth(String),
}

/// Where the vertex stage puts a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VertexStage {
    /// `P · V · M`
    Camera,
    /// `lightSpaceMatrix · M`
    LightSpace,
    /// Unit quad to NDC.
    Fullscreen,
}

impl KernelKind {
    pub fn vertex_stage(&self) -> VertexStage {
        match self {
            Self::GBuffer | Self::Transparency | Self::Axis => VertexStage::Camera,
            Self::Shadow => VertexStage::LightSpace,
            Self::Ao | Self::Lighting | Self::Copy(_) | Self::Tonemap(_) | Self::Depth(_) => {
                VertexStage::Fullscreen
            }
        }
    }

    fn from_entry_point(entry: &str, interface: &ProgramInterface) -> std::result::Result<Self, String> {
        let name = entry.strip_prefix("fs_").unwrap_or(entry);
        let source = || {
            interface
                .first_fragment_texture()
                .map(|t| t.name.clone())
                .ok_or_else(|| format!("kernel '{name}' needs a fragment texture to read"))
        };
        Ok(match name {
            "gbuffer" => Self::GBuffer,
            "shadow" => Self::Shadow,
            "ao" => Self::Ao,
            "lighting" => Self::Lighting,
            "transparency" => Self::Transparency,
            "axis" => Self::Axis,
            "copy" => Self::Copy(source()?),
            "tonemap" => Self::Tonemap(source()?),
            "depth" => Self::Depth(source()?),
            other => return Err(format!("no software kernel for fragment entry point '{other}'")),
        })
    }
}

#[derive(Debug)]
pub(crate) struct Program {
    pub label: String,
    pub kernel: KernelKind,
    interface: ProgramInterface,
    values: FxHashMap<String, UniformValue>,
}

impl Program {
    pub fn compile(label: &str, vertex: &str, fragment: &str) -> Result<Self> {
        let interface = ProgramInterface::reflect(label, vertex, fragment)?;
        let kernel = KernelKind::from_entry_point(&interface.fragment_entry, &interface).map_err(|message| {
            LumenError::ShaderCompile {
                label: label.to_string(),
                message,
            }
        })?;
        Ok(Self {
            label: label.to_string(),
            kernel,
            interface,
            values: FxHashMap::default(),
        })
    }

    /// Stores `value` if `name` is declared. Textures are stored under
    /// their variable name.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        if !self.interface.fields(name).is_empty() {
            self.values.insert(name.to_string(), value);
            return true;
        }
        if self.interface.texture_slots(name).is_empty() {
            return false;
        }
        self.values.insert(texture_key(name), value);
        true
    }

    #[inline]
    pub fn value(&self, name: &str) -> Option<&UniformValue> {
        self.values
            .get(name)
            .or_else(|| self.values.get(&texture_key(name)))
    }

    #[inline]
    pub fn is_declared(&self, name: &str) -> bool {
        self.interface.is_declared(name)
    }

    /// Declared length of a uniform array, zero when absent.
    #[inline]
    pub fn array_len(&self, name: &str) -> usize {
        self.interface.array_len(name)
    }

    // === Typed accessors; unset uniforms read as zero ===

    pub fn float(&self, name: &str) -> f32 {
        match self.value(name) {
            Some(UniformValue::Float(v)) => *v,
            Some(UniformValue::Int(v)) => *v as f32,
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i32 {
        match self.value(name) {
            Some(UniformValue::Int(v)) => *v,
            Some(UniformValue::Bool(v)) => i32::from(*v),
            _ => 0,
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        match self.value(name) {
            Some(UniformValue::Bool(v)) => *v,
            Some(UniformValue::Int(v)) => *v != 0,
            _ => false,
        }
    }

    pub fn vec3(&self, name: &str) -> glam::Vec3 {
        match self.value(name) {
            Some(UniformValue::Vec3(v)) => *v,
            Some(UniformValue::Vec4(v)) => v.truncate(),
            _ => glam::Vec3::ZERO,
        }
    }

    pub fn vec4(&self, name: &str) -> glam::Vec4 {
        match self.value(name) {
            Some(UniformValue::Vec4(v)) => *v,
            Some(UniformValue::Vec3(v)) => v.extend(0.0),
            _ => glam::Vec4::ZERO,
        }
    }

    pub fn mat4(&self, name: &str) -> glam::Mat4 {
        match self.value(name) {
            Some(UniformValue::Mat4(v)) => *v,
            _ => glam::Mat4::ZERO,
        }
    }
}
