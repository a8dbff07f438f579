//! Compiled programs for the wgpu device.
//!
//! Uniform values live in one host staging buffer per `var<uniform>`
//! block, laid out at the offsets naga reports. Texture uniforms record
//! what to bind; views are resolved when a draw builds its bind groups.

use std::borrow::Cow;
use std::sync::Arc;

use crate::errors::Result;
use crate::renderer::core::reflect::{FieldKind, ProgramInterface, Stage, TextureKind, UniformField};
use crate::renderer::core::{TextureId, UniformValue};
use crate::scene::texture::{CubeMap, Texture};

/// What a texture slot is bound to.
#[derive(Debug, Clone)]
pub(crate) enum TextureBinding {
    Device(TextureId),
    Image(Arc<Texture>),
    Cube(Arc<CubeMap>),
}

pub(crate) struct GpuProgram {
    pub label: String,
    pub interface: ProgramInterface,
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
    /// Group 0 (vertex) and group 1 (fragment).
    pub layouts: [wgpu::BindGroupLayout; 2],
    pub pipeline_layout: wgpu::PipelineLayout,
    /// Staging bytes, indexed like `interface.blocks`.
    pub blocks: Vec<Vec<u8>>,
    /// Indexed like `interface.textures`.
    pub textures: Vec<Option<TextureBinding>>,
}

impl GpuProgram {
    pub fn compile(device: &wgpu::Device, label: &str, vertex: &str, fragment: &str) -> Result<Self> {
        // naga validates both modules up front, so shader module creation
        // below does not hit the uncaptured error path for bad sources.
        let interface = ProgramInterface::reflect(label, vertex, fragment)?;

        let module = |stage: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{label} ({stage})")),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
            })
        };
        let vertex = module("vertex", vertex);
        let fragment = module("fragment", fragment);

        let layouts = [Stage::Vertex, Stage::Fragment].map(|stage| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label} group {}", stage.group())),
                entries: &layout_entries(&interface, stage),
            })
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[Some(&layouts[0]), Some(&layouts[1])],
            immediate_size: 0,
        });

        let blocks = interface.blocks.iter().map(|b| vec![0; b.size as usize]).collect();
        let textures = vec![None; interface.textures.len()];
        Ok(Self {
            label: label.to_string(),
            interface,
            vertex,
            fragment,
            layouts,
            pipeline_layout,
            blocks,
            textures,
        })
    }

    /// Writes `value` to every member or texture slot named `name`.
    /// Returns `false` when neither stage declares it.
    pub fn set(&mut self, name: &str, value: &UniformValue) -> bool {
        let fields = self.interface.fields(name);
        if !fields.is_empty() {
            for field in fields {
                let Some(block) = self.blocks.get_mut(field.block) else {
                    continue;
                };
                if !write_field(block, field, value) {
                    log::warn!("{}: uniform '{name}' cannot hold {value:?}", self.label);
                }
            }
            return true;
        }

        let slots = self.interface.texture_slots(name);
        if slots.is_empty() {
            return false;
        }
        let binding = match value {
            UniformValue::Sampler(id) => TextureBinding::Device(*id),
            UniformValue::Image(image) => TextureBinding::Image(image.clone()),
            UniformValue::CubeMap(cube) => TextureBinding::Cube(cube.clone()),
            other => {
                log::warn!("{}: texture '{name}' cannot hold {other:?}", self.label);
                return true;
            }
        };
        for slot in slots {
            self.textures[slot] = Some(binding.clone());
        }
        true
    }
}

fn layout_entries(interface: &ProgramInterface, stage: Stage) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = match stage {
        Stage::Vertex => wgpu::ShaderStages::VERTEX,
        Stage::Fragment => wgpu::ShaderStages::FRAGMENT,
    };
    let entry = |binding, ty| wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty,
        count: None,
    };

    let blocks = interface.blocks.iter().filter(|b| b.stage == stage).map(|b| {
        entry(
            b.binding,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        )
    });
    let textures = interface.textures.iter().filter(|t| t.stage == stage).map(|t| {
        let (sample_type, view_dimension) = binding_type(t.kind);
        entry(
            t.binding,
            wgpu::BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled: false,
            },
        )
    });
    let samplers = interface.samplers.iter().filter(|s| s.stage == stage).map(|s| {
        entry(
            s.binding,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
        )
    });
    blocks.chain(textures).chain(samplers).collect()
}

/// Float targets are 16/32-bit without the filterable-float feature, so
/// every float binding is unfilterable and sampled with a nearest sampler.
pub(crate) fn binding_type(kind: TextureKind) -> (wgpu::TextureSampleType, wgpu::TextureViewDimension) {
    use wgpu::{TextureSampleType as S, TextureViewDimension as D};
    match kind {
        TextureKind::Float => (S::Float { filterable: false }, D::D2),
        TextureKind::Sint => (S::Sint, D::D2),
        TextureKind::Uint => (S::Uint, D::D2),
        TextureKind::Depth => (S::Depth, D::D2),
        TextureKind::Cube => (S::Float { filterable: false }, D::Cube),
    }
}

/// Encodes `value` at the member's offset. `false` on a type mismatch.
pub(crate) fn write_field(block: &mut [u8], field: &UniformField, value: &UniformValue) -> bool {
    let words: smallvec::SmallVec<[u32; 16]> = match (field.kind, value) {
        (FieldKind::Int, UniformValue::Int(v)) => smallvec::smallvec![*v as u32],
        (FieldKind::Int | FieldKind::Uint, UniformValue::Bool(v)) => smallvec::smallvec![u32::from(*v)],
        (FieldKind::Uint, UniformValue::Int(v)) => smallvec::smallvec![*v as u32],
        (FieldKind::Float, UniformValue::Float(v)) => smallvec::smallvec![v.to_bits()],
        (FieldKind::Float, UniformValue::Int(v)) => smallvec::smallvec![(*v as f32).to_bits()],
        (FieldKind::Vec3, UniformValue::Vec3(v)) => v.to_array().map(f32::to_bits).into_iter().collect(),
        (FieldKind::Vec3, UniformValue::Vec4(v)) => v.truncate().to_array().map(f32::to_bits).into_iter().collect(),
        (FieldKind::Vec4, UniformValue::Vec4(v)) => v.to_array().map(f32::to_bits).into_iter().collect(),
        (FieldKind::Vec4, UniformValue::Vec3(v)) => v.extend(0.0).to_array().map(f32::to_bits).into_iter().collect(),
        (FieldKind::Mat4, UniformValue::Mat4(m)) => m.to_cols_array().map(f32::to_bits).into_iter().collect(),
        _ => return false,
    };
    let bytes: &[u8] = bytemuck::cast_slice(words.as_slice());
    let start = field.offset as usize;
    match block.get_mut(start..start + bytes.len()) {
        Some(dst) => {
            dst.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};

    use super::*;

    fn field(offset: u32, kind: FieldKind) -> UniformField {
        UniformField { block: 0, offset, kind }
    }

    fn words(block: &[u8]) -> Vec<[u8; 4]> {
        block.chunks_exact(4).map(|w| [w[0], w[1], w[2], w[3]]).collect()
    }

    fn floats(block: &[u8]) -> Vec<f32> {
        words(block).into_iter().map(f32::from_ne_bytes).collect()
    }

    #[test]
    fn fields_land_at_their_offsets() {
        let mut block = vec![0_u8; 96];
        assert!(write_field(&mut block, &field(0, FieldKind::Mat4), &Mat4::from_scale(Vec3::splat(2.0)).into()));
        assert!(write_field(&mut block, &field(64, FieldKind::Vec3), &Vec3::new(1.0, 2.0, 3.0).into()));
        assert!(write_field(&mut block, &field(76, FieldKind::Float), &0.5_f32.into()));
        assert!(write_field(&mut block, &field(80, FieldKind::Vec4), &Vec3::ONE.into()));

        let f = floats(&block);
        assert_eq!(&f[0..4], &[2.0, 0.0, 0.0, 0.0]);
        assert_eq!(f[15], 1.0);
        assert_eq!(&f[16..20], &[1.0, 2.0, 3.0, 0.5]);
        assert_eq!(&f[20..24], &[1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn bools_and_ints_share_words() {
        let mut block = vec![0_u8; 16];
        assert!(write_field(&mut block, &field(0, FieldKind::Uint), &true.into()));
        assert!(write_field(&mut block, &field(4, FieldKind::Int), &(-7_i32).into()));
        let ints: Vec<i32> = words(&block).into_iter().map(i32::from_ne_bytes).collect();
        assert_eq!(&ints[0..2], &[1, -7]);
    }

    #[test]
    fn mismatches_and_overruns_write_nothing() {
        let mut block = vec![0_u8; 16];
        assert!(!write_field(&mut block, &field(0, FieldKind::Mat4), &Vec4::ONE.into()));
        assert!(!write_field(&mut block, &field(0, FieldKind::Mat4), &Mat4::IDENTITY.into()));
        assert!(!write_field(&mut block, &field(12, FieldKind::Vec4), &Vec4::ONE.into()));
        assert!(block.iter().all(|&b| b == 0));
    }
}
