//! wgpu implementation of [`GraphicsDevice`].
//!
//! Everything renders offscreen: device textures double as attachments and
//! shader inputs, and the default framebuffer is an `Rgba32Float` texture
//! sized by the blits into it. Work is submitted as soon as it is recorded,
//! one command encoder per call, so readback always sees every earlier draw.
//!
//! GPU textures store their top row first. Uploads and readbacks flip rows
//! so that the trait's bottom-row-first order holds, and viewports are
//! mirrored the same way.

mod pipeline;
mod program;
mod readback;

use std::sync::Arc;

use glam::Vec4;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use self::pipeline::{BlitParams, Blitter, PipelineKey, create_pipeline};
use self::program::{GpuProgram, TextureBinding};
use self::readback::{Region, decode_f32, decode_i32, encode_f32, flip_rows, read_region, texel_size};
use super::reflect::{Stage, TextureKind, TextureSlot};
use super::{
    ClearFlags, DeviceStats, FramebufferId, GraphicsDevice, ProgramId, RasterState, TextureDescriptor, TextureFormat,
    TextureId, UniformValue, Viewport,
};
use crate::errors::{LumenError, Result};
use crate::scene::mesh::Mesh;
use crate::scene::texture::{CubeMap, Texture};

pub(crate) const MAX_COLOR_ATTACHMENTS: usize = 8;

pub(crate) fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::R32Sint => wgpu::TextureFormat::R32Sint,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Whether a texture of `format` can be bound where the shader declares `kind`.
fn accepts(kind: TextureKind, format: TextureFormat) -> bool {
    match kind {
        TextureKind::Float => !format.is_integer(),
        TextureKind::Sint => format.is_integer(),
        TextureKind::Depth => format.is_depth(),
        TextureKind::Uint | TextureKind::Cube => false,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

struct GpuTexture {
    desc: TextureDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn create_gpu_texture(device: &wgpu::Device, desc: &TextureDescriptor) -> GpuTexture {
    let mut usage =
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
    // Depth32Float cannot be a copy destination.
    if !desc.format.is_depth() {
        usage |= wgpu::TextureUsages::COPY_DST;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&desc.label),
        size: wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu_format(desc.format),
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        desc: desc.clone(),
        texture,
        view,
    }
}

/// Writes one tightly packed layer.
fn write_layer(queue: &wgpu::Queue, texture: &wgpu::Texture, layer: u32, width: u32, height: u32, row: u32, bytes: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        },
        bytes,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(row),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

// ============================================================================
// Host Image Uploads
// ============================================================================

/// A material image or cube map uploaded for binding. Holding the `Arc`
/// keeps the cache key (its address) from being reused.
struct Uploaded<T> {
    host: Arc<T>,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[inline]
fn upload_key<T>(host: &Arc<T>) -> usize {
    Arc::as_ptr(host) as usize
}

fn upload_image(device: &wgpu::Device, queue: &wgpu::Queue, image: &Arc<Texture>) -> Uploaded<Texture> {
    let (width, height) = (image.width(), image.height());
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&image.name),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let row = width * 16;
    let bytes = flip_rows(bytemuck::cast_slice(image.texels()), row as usize);
    write_layer(queue, &texture, 0, width, height, row, &bytes);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Uploaded {
        host: image.clone(),
        _texture: texture,
        view,
    }
}

fn upload_cube(device: &wgpu::Device, queue: &wgpu::Queue, cube: &Arc<CubeMap>) -> Uploaded<CubeMap> {
    let (width, height) = (cube.face(0).width(), cube.face(0).height());
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("skybox"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    // Faces are stored top-down already.
    for layer in 0..6 {
        let face = cube.face(layer as usize);
        write_layer(queue, &texture, layer, width, height, width * 16, bytemuck::cast_slice(face.texels()));
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    Uploaded {
        host: cube.clone(),
        _texture: texture,
        view,
    }
}

// ============================================================================
// Fallback Bindings
// ============================================================================

/// 1×1 textures bound to slots that have nothing (compatible) bound.
struct Fallbacks {
    _textures: Vec<wgpu::Texture>,
    float: wgpu::TextureView,
    sint: wgpu::TextureView,
    uint: wgpu::TextureView,
    depth: wgpu::TextureView,
    cube: wgpu::TextureView,
}

impl Fallbacks {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let make = |label: &str, format: wgpu::TextureFormat, layers: u32| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        };
        let float = make("fallback float", wgpu::TextureFormat::Rgba32Float, 1);
        let sint = make("fallback sint", wgpu::TextureFormat::R32Sint, 1);
        let uint = make("fallback uint", wgpu::TextureFormat::R32Uint, 1);
        let depth = make("fallback depth", wgpu::TextureFormat::Depth32Float, 1);
        let cube = make("fallback cube", wgpu::TextureFormat::Rgba32Float, 6);

        let view = |t: &wgpu::Texture| t.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = view(&depth);

        // An unbound shadow map reads as "nothing occludes".
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fallback Init"),
        });
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Fallback Depth Clear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        queue.submit(Some(encoder.finish()));

        Self {
            float: view(&float),
            sint: view(&sint),
            uint: view(&uint),
            depth: depth_view,
            cube: cube.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            }),
            _textures: vec![float, sint, uint, depth, cube],
        }
    }

    fn get(&self, kind: TextureKind) -> &wgpu::TextureView {
        match kind {
            TextureKind::Float => &self.float,
            TextureKind::Sint => &self.sint,
            TextureKind::Uint => &self.uint,
            TextureKind::Depth => &self.depth,
            TextureKind::Cube => &self.cube,
        }
    }
}

// ============================================================================
// Device
// ============================================================================

#[derive(Debug, Default)]
struct Framebuffer {
    label: String,
    colors: SmallVec<[TextureId; MAX_COLOR_ATTACHMENTS]>,
    depth: Option<TextureId>,
}

/// Views of the bound render target.
struct Attachments<'a> {
    colors: SmallVec<[(&'a wgpu::TextureView, TextureFormat); MAX_COLOR_ATTACHMENTS]>,
    depth: Option<(&'a wgpu::TextureView, TextureFormat)>,
    /// Device textures in use as attachments; they cannot be sampled by
    /// the same pass.
    ids: SmallVec<[TextureId; MAX_COLOR_ATTACHMENTS]>,
    extent: (u32, u32),
}

/// Offscreen wgpu renderer.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,

    textures: SlotMap<TextureId, GpuTexture>,
    framebuffers: SlotMap<FramebufferId, Framebuffer>,
    programs: SlotMap<ProgramId, GpuProgram>,

    bound: Option<FramebufferId>,
    viewport: Viewport,
    raster: RasterState,
    current_program: Option<ProgramId>,

    /// Backing texture of the default framebuffer, created by the first blit.
    default_target: Option<GpuTexture>,

    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    blitter: Blitter,
    sampler: wgpu::Sampler,
    fallbacks: Fallbacks,
    images: FxHashMap<usize, Uploaded<Texture>>,
    cubes: FxHashMap<usize, Uploaded<CubeMap>>,
}

impl WgpuDevice {
    /// Opens the preferred adapter without a surface.
    pub fn new_headless() -> Result<Self> {
        pollster::block_on(Self::request(wgpu::PowerPreference::HighPerformance))
    }

    /// Requests an adapter by power preference, with no surface.
    pub async fn request(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| LumenError::AdapterRequestFailed(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        // The G-buffer pass writes seven attachments, more bytes per sample
        // than the default limits allow.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lumen Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        device.on_uncaptured_error(std::sync::Arc::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        Ok(Self::from_parts(device, queue, adapter_info))
    }

    fn from_parts(device: wgpu::Device, queue: wgpu::Queue, adapter_info: wgpu::AdapterInfo) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Repeat Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            ..Default::default()
        });
        let blitter = Blitter::new(&device);
        let fallbacks = Fallbacks::new(&device, &queue);
        Self {
            device,
            queue,
            adapter_info,
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            bound: None,
            viewport: Viewport::default(),
            raster: RasterState::default(),
            current_program: None,
            default_target: None,
            pipelines: FxHashMap::default(),
            blitter,
            sampler,
            fallbacks,
            images: FxHashMap::default(),
            cubes: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Size of the default framebuffer.
    #[must_use]
    pub fn default_framebuffer_size(&self) -> (u32, u32) {
        self.default_target
            .as_ref()
            .map_or((0, 0), |t| (t.desc.width, t.desc.height))
    }

    fn attachments(&self) -> Option<Attachments<'_>> {
        let Some(f) = self.bound else {
            let t = self.default_target.as_ref()?;
            return Some(Attachments {
                colors: smallvec::smallvec![(&t.view, t.desc.format)],
                depth: None,
                ids: SmallVec::new(),
                extent: (t.desc.width, t.desc.height),
            });
        };
        let fbo = self.framebuffers.get(f)?;
        let mut extent = None;
        let mut colors = SmallVec::new();
        let mut depth = None;
        let mut ids = SmallVec::new();
        let all = fbo.colors.iter().map(|id| (*id, false)).chain(fbo.depth.map(|id| (id, true)));
        for (id, is_depth) in all {
            let Some(t) = self.textures.get(id) else {
                log::warn!("WgpuDevice: '{}' has a destroyed attachment", fbo.label);
                return None;
            };
            let size = (t.desc.width, t.desc.height);
            if *extent.get_or_insert(size) != size {
                log::warn!("WgpuDevice: '{}' has attachments of different sizes", fbo.label);
                return None;
            }
            ids.push(id);
            if is_depth {
                depth = Some((&t.view, t.desc.format));
            } else {
                colors.push((&t.view, t.desc.format));
            }
        }
        let extent = extent.filter(|(w, h)| *w > 0 && *h > 0)?;
        Some(Attachments {
            colors,
            depth,
            ids,
            extent,
        })
    }

    /// Uploads host images bound to `program` and drops uploads nothing
    /// references any more.
    fn sync_uploads(&mut self, program: ProgramId) {
        self.images.retain(|_, u| Arc::strong_count(&u.host) > 1);
        self.cubes.retain(|_, u| Arc::strong_count(&u.host) > 1);
        let Some(program) = self.programs.get(program) else {
            return;
        };
        for binding in program.textures.iter().flatten() {
            match binding {
                TextureBinding::Image(image) => {
                    self.images
                        .entry(upload_key(image))
                        .or_insert_with(|| upload_image(&self.device, &self.queue, image));
                }
                TextureBinding::Cube(cube) => {
                    self.cubes
                        .entry(upload_key(cube))
                        .or_insert_with(|| upload_cube(&self.device, &self.queue, cube));
                }
                TextureBinding::Device(_) => {}
            }
        }
    }

    fn texture_view(
        &self,
        label: &str,
        binding: Option<&TextureBinding>,
        slot: &TextureSlot,
        attached: &[TextureId],
    ) -> &wgpu::TextureView {
        let view = match binding {
            None => None,
            Some(TextureBinding::Device(id)) => match self.textures.get(*id) {
                Some(_) if attached.contains(id) => {
                    log::warn!("{label}: '{}' is also a render target, binding a fallback", slot.name);
                    None
                }
                Some(t) if accepts(slot.kind, t.desc.format) => Some(&t.view),
                Some(t) => {
                    log::warn!("{label}: '{}' cannot sample {:?}", slot.name, t.desc.format);
                    None
                }
                None => None,
            },
            Some(TextureBinding::Image(image)) if slot.kind == TextureKind::Float => {
                self.images.get(&upload_key(image)).map(|u| &u.view)
            }
            Some(TextureBinding::Cube(cube)) if slot.kind == TextureKind::Cube => {
                self.cubes.get(&upload_key(cube)).map(|u| &u.view)
            }
            Some(_) => {
                log::warn!("{label}: '{}' is bound to the wrong kind of image", slot.name);
                None
            }
        };
        view.unwrap_or_else(|| self.fallbacks.get(slot.kind))
    }

    fn bind_group(
        &self,
        program: &GpuProgram,
        stage: Stage,
        buffers: &[wgpu::Buffer],
        attached: &[TextureId],
    ) -> wgpu::BindGroup {
        let interface = &program.interface;
        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = Vec::new();
        for (block, buffer) in interface.blocks.iter().zip(buffers) {
            if block.stage == stage {
                entries.push(wgpu::BindGroupEntry {
                    binding: block.binding,
                    resource: buffer.as_entire_binding(),
                });
            }
        }
        for (slot, binding) in interface.textures.iter().zip(&program.textures) {
            if slot.stage == stage {
                entries.push(wgpu::BindGroupEntry {
                    binding: slot.binding,
                    resource: wgpu::BindingResource::TextureView(self.texture_view(
                        &program.label,
                        binding.as_ref(),
                        slot,
                        attached,
                    )),
                });
            }
        }
        for sampler in interface.samplers.iter().filter(|s| s.stage == stage) {
            entries.push(wgpu::BindGroupEntry {
                binding: sampler.binding,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        let index = match stage {
            Stage::Vertex => 0,
            Stage::Fragment => 1,
        };
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.layouts[index],
            entries: &entries,
        })
    }

    fn read_all(&self, texture: &GpuTexture) -> Result<Vec<u8>> {
        read_region(
            &self.device,
            &self.queue,
            &texture.texture,
            texture.desc.format,
            Region {
                x: 0,
                y: 0,
                width: texture.desc.width,
                height: texture.desc.height,
            },
        )
    }
}

/// Mirrors a bottom-left viewport into wgpu's top-left space, clipped to
/// the target. `None` when nothing is left.
fn flipped_viewport(viewport: Viewport, (width, height): (u32, u32)) -> Option<[f32; 4]> {
    let (x0, y0) = (viewport.x.min(width), viewport.y.min(height));
    let x1 = viewport.x.saturating_add(viewport.width).min(width);
    let y1 = viewport.y.saturating_add(viewport.height).min(height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some([x0 as f32, (height - y1) as f32, (x1 - x0) as f32, (y1 - y0) as f32])
}

fn clear_color(format: TextureFormat, color: Vec4) -> wgpu::Color {
    if format.is_integer() {
        return wgpu::Color::TRANSPARENT;
    }
    wgpu::Color {
        r: f64::from(color.x),
        g: f64::from(color.y),
        b: f64::from(color.z),
        a: f64::from(color.w),
    }
}

impl GraphicsDevice for WgpuDevice {
    fn name(&self) -> &str {
        "wgpu"
    }

    // ========================================================================
    // Textures
    // ========================================================================

    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureId {
        log::trace!("create texture '{}' {}x{} {:?}", desc.label, desc.width, desc.height, desc.format);
        self.textures.insert(create_gpu_texture(&self.device, desc))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()> {
        let t = self.textures.get(texture).ok_or(LumenError::InvalidHandle("texture"))?;
        let expected = t.desc.texel_count() * t.desc.format.channels();
        if data.len() != expected {
            return Err(LumenError::TextureMismatch {
                expected,
                actual: data.len(),
            });
        }
        if t.desc.format.is_depth() {
            return Err(LumenError::Unsupported {
                device: "wgpu",
                what: format!("uploading texels to depth texture '{}'", t.desc.label),
            });
        }
        if expected == 0 {
            return Ok(());
        }
        let row = t.desc.width * texel_size(t.desc.format);
        let bytes = flip_rows(&encode_f32(data, t.desc.format), row as usize);
        write_layer(&self.queue, &t.texture, 0, t.desc.width, t.desc.height, row, &bytes);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_none() {
            log::warn!("WgpuDevice: destroy of unknown texture ignored");
        }
    }

    fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.textures.get(texture).map(|t| t.desc.clone())
    }

    // ========================================================================
    // Framebuffers
    // ========================================================================

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        self.framebuffers.insert(Framebuffer {
            label: label.to_string(),
            ..Framebuffer::default()
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
        self.framebuffers.remove(framebuffer);
    }

    fn set_color_attachments(&mut self, framebuffer: FramebufferId, textures: &[TextureId]) {
        let Some(fbo) = self.framebuffers.get_mut(framebuffer) else {
            log::warn!("WgpuDevice: color attachments on unknown framebuffer ignored");
            return;
        };
        if textures.len() > MAX_COLOR_ATTACHMENTS {
            log::warn!(
                "WgpuDevice: '{}' has {} color attachments, keeping {MAX_COLOR_ATTACHMENTS}",
                fbo.label,
                textures.len()
            );
        }
        fbo.colors = textures.iter().take(MAX_COLOR_ATTACHMENTS).copied().collect();
    }

    fn set_depth_attachment(&mut self, framebuffer: FramebufferId, texture: Option<TextureId>) {
        if let Some(fbo) = self.framebuffers.get_mut(framebuffer) {
            fbo.depth = texture;
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound = framebuffer.filter(|f| self.framebuffers.contains_key(*f));
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
    }

    fn clear(&mut self, flags: ClearFlags, color: Vec4) {
        let Some(target) = self.attachments() else {
            return;
        };
        let clear_colors = flags.contains(ClearFlags::COLOR) && !target.colors.is_empty();
        let depth = target.depth.filter(|_| flags.contains(ClearFlags::DEPTH));
        if !clear_colors && depth.is_none() {
            return;
        }

        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; MAX_COLOR_ATTACHMENTS]> =
            if clear_colors {
                target
                    .colors
                    .iter()
                    .map(|&(view, format)| {
                        Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(clear_color(format, color)),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })
                    })
                    .collect()
            } else {
                SmallVec::new()
            };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Encoder"),
        });
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth.map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    // ========================================================================
    // Programs
    // ========================================================================

    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId> {
        let program = GpuProgram::compile(&self.device, label, vertex, fragment)?;
        log::debug!(
            "compiled program '{label}' ({} / {})",
            program.interface.vertex_entry,
            program.interface.fragment_entry
        );
        Ok(self.programs.insert(program))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.pipelines.retain(|key, _| key.program != program);
        self.programs.remove(program);
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program.filter(|p| self.programs.contains_key(*p));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        self.current_program
            .and_then(|p| self.programs.get_mut(p))
            .is_some_and(|p| p.set(name, &value))
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    fn draw_mesh(&mut self, mesh: &Mesh) {
        let Some(pid) = self.current_program else {
            log::warn!("WgpuDevice: draw without a program ignored");
            return;
        };
        if mesh.indices().is_empty() {
            return;
        }
        self.sync_uploads(pid);

        let Some((viewport, key)) = self.attachments().and_then(|target| {
            let viewport = flipped_viewport(self.viewport, target.extent)?;
            let key = PipelineKey {
                program: pid,
                colors: target.colors.iter().map(|(_, format)| *format).collect(),
                depth: target.depth.map(|(_, format)| format),
                raster: self.raster,
            };
            Some((viewport, key))
        }) else {
            return;
        };

        let Some(program) = self.programs.get(pid) else {
            return;
        };
        if !self.pipelines.contains_key(&key) {
            let pipeline = create_pipeline(&self.device, program, &key);
            self.pipelines.insert(key.clone(), pipeline);
        }
        let (Some(pipeline), Some(target)) = (self.pipelines.get(&key), self.attachments()) else {
            return;
        };

        let buffers: Vec<wgpu::Buffer> = program
            .blocks
            .iter()
            .map(|bytes| {
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&program.label),
                    contents: bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();
        let groups = [Stage::Vertex, Stage::Fragment].map(|stage| self.bind_group(program, stage, &buffers, &target.ids));

        let vertices: Vec<GpuVertex> = mesh
            .vertices()
            .iter()
            .map(|v| GpuVertex {
                position: v.position.to_array(),
                normal: v.normal.to_array(),
                uv: v.uv.to_array(),
            })
            .collect();
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&mesh.name),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&mesh.name),
            contents: bytemuck::cast_slice(mesh.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; MAX_COLOR_ATTACHMENTS]> = target
            .colors
            .iter()
            .map(|&(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&program.label),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&program.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment: target.depth.map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let [x, y, w, h] = viewport;
            rpass.set_viewport(x, y, w, h, 0.0, 1.0);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &groups[0], &[]);
            rpass.set_bind_group(1, &groups[1], &[]);
            rpass.set_vertex_buffer(0, vertex_buffer.slice(..));
            rpass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..mesh.indices().len() as u32, 0, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn blit(&mut self, source: FramebufferId, target: Option<FramebufferId>, width: u32, height: u32) {
        let Some(src_id) = self.framebuffers.get(source).and_then(|f| f.colors.first().copied()) else {
            log::warn!("WgpuDevice: blit from a framebuffer without color attachment ignored");
            return;
        };
        let dst_id = match target {
            None => None,
            Some(f) => {
                let Some(id) = self.framebuffers.get(f).and_then(|fbo| fbo.colors.first().copied()) else {
                    return;
                };
                Some(id)
            }
        };
        if dst_id == Some(src_id) || width == 0 || height == 0 {
            return;
        }
        if dst_id.is_none() && self.default_framebuffer_size() != (width, height) {
            let desc = TextureDescriptor::new("default framebuffer", width, height, TextureFormat::Rgba32Float);
            self.default_target = Some(create_gpu_texture(&self.device, &desc));
        }

        let Some(src) = self.textures.get(src_id) else {
            return;
        };
        let dst = match dst_id {
            None => self.default_target.as_ref(),
            Some(id) => self.textures.get(id),
        };
        let Some(dst) = dst else {
            return;
        };
        let float = |format: TextureFormat| !format.is_integer() && !format.is_depth();
        if !float(src.desc.format) || !float(dst.desc.format) {
            log::warn!(
                "WgpuDevice: blit {:?} -> {:?} unsupported, float color formats only",
                src.desc.format,
                dst.desc.format
            );
            return;
        }
        let (sw, sh) = (src.desc.width, src.desc.height);
        let (dw, dh) = (dst.desc.width, dst.desc.height);
        if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
            return;
        }

        let params = BlitParams {
            source: [sw, sh],
            size: [width, height],
            region: [dw.min(width), dh.min(height)],
            target_height: dh,
            _pad: 0,
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blit Encoder"),
        });
        self.blitter.encode(
            &self.device,
            &mut encoder,
            &src.view,
            &dst.view,
            wgpu_format(dst.desc.format),
            params,
        );
        self.queue.submit(Some(encoder.finish()));
    }

    // ========================================================================
    // Readback
    // ========================================================================

    fn read_texture_f32(&self, texture: TextureId) -> Result<Vec<f32>> {
        let t = self.textures.get(texture).ok_or(LumenError::InvalidHandle("texture"))?;
        Ok(decode_f32(&self.read_all(t)?, t.desc.format))
    }

    fn read_texture_i32(&self, texture: TextureId) -> Result<Vec<i32>> {
        let t = self.textures.get(texture).ok_or(LumenError::InvalidHandle("texture"))?;
        Ok(decode_i32(&self.read_all(t)?, t.desc.format))
    }

    fn read_pixel_i32(&self, framebuffer: FramebufferId, attachment: usize, x: u32, y: u32) -> Option<i32> {
        let id = *self.framebuffers.get(framebuffer)?.colors.get(attachment)?;
        let t = self.textures.get(id)?;
        let (w, h) = (t.desc.width, t.desc.height);
        if x >= w || y >= h {
            return None;
        }
        let region = Region {
            x,
            y: h - 1 - y,
            width: 1,
            height: 1,
        };
        match read_region(&self.device, &self.queue, &t.texture, t.desc.format, region) {
            Ok(bytes) => decode_i32(&bytes, t.desc.format).first().copied(),
            Err(e) => {
                log::error!("WgpuDevice: pixel readback of '{}' failed: {e}", t.desc.label);
                None
            }
        }
    }

    fn read_default_framebuffer(&self) -> (u32, u32, Vec<f32>) {
        let Some(t) = &self.default_target else {
            return (0, 0, Vec::new());
        };
        let (w, h) = (t.desc.width, t.desc.height);
        match self.read_all(t) {
            Ok(bytes) => (w, h, decode_f32(&bytes, t.desc.format)),
            Err(e) => {
                log::error!("WgpuDevice: default framebuffer readback failed: {e}");
                (w, h, vec![0.0; t.desc.texel_count() * 4])
            }
        }
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            programs: self.programs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewports_mirror_into_top_left_space() {
        let full = flipped_viewport(Viewport::new(64, 32), (64, 32));
        assert_eq!(full, Some([0.0, 0.0, 64.0, 32.0]));

        let bottom_left = Viewport {
            x: 0,
            y: 0,
            width: 16,
            height: 8,
        };
        assert_eq!(flipped_viewport(bottom_left, (64, 32)), Some([0.0, 24.0, 16.0, 8.0]));

        let oversized = Viewport::new(100, 100);
        assert_eq!(flipped_viewport(oversized, (64, 32)), Some([0.0, 0.0, 64.0, 32.0]));
        assert_eq!(flipped_viewport(Viewport::default(), (64, 32)), None);
    }

    #[test]
    fn sampled_formats_match_binding_kinds() {
        assert!(accepts(TextureKind::Float, TextureFormat::Rgba16Float));
        assert!(accepts(TextureKind::Float, TextureFormat::Depth32Float));
        assert!(!accepts(TextureKind::Float, TextureFormat::R32Sint));
        assert!(accepts(TextureKind::Sint, TextureFormat::R32Sint));
        assert!(accepts(TextureKind::Depth, TextureFormat::Depth32Float));
        assert!(!accepts(TextureKind::Depth, TextureFormat::R32Float));
        assert!(!accepts(TextureKind::Cube, TextureFormat::Rgba32Float));
    }

    #[test]
    fn integer_attachments_clear_to_zero() {
        let c = clear_color(TextureFormat::R32Sint, Vec4::new(0.5, 0.5, 0.5, 1.0));
        assert_eq!(c, wgpu::Color::TRANSPARENT);
        let c = clear_color(TextureFormat::Rgba16Float, Vec4::new(0.25, 0.5, 1.0, 1.0));
        assert_eq!((c.r, c.g, c.b, c.a), (0.25, 0.5, 1.0, 1.0));
    }
}
