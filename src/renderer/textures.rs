//! Render targets shared by the pass graph.
//!
//! [`TextureSet`] holds every size-dependent texture. The whole set is
//! created and destroyed together on `resize` and on any optional-pass
//! toggle; the random noise texture lives outside it and survives both.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::errors::Result;
use crate::renderer::core::{
    FramebufferId, GraphicsDevice, TextureDescriptor, TextureFormat, TextureId, WrapMode,
};
use crate::renderer::settings::RendererSettings;

/// Side length of the tileable AO noise texture.
pub const RANDOM_TEXTURE_SIZE: u32 = 256;
const RANDOM_SEED: u64 = 0x5eed_a0a0;

// ============================================================================
// Framebuffer Slots
// ============================================================================

/// One framebuffer per pass, plus a scratch one for blits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FboSlot {
    Shadow,
    GBuffer,
    Ao,
    Lighting,
    Transparency,
    Axis,
    Composite,
    Display,
    Copy,
}

impl FboSlot {
    pub const ALL: [Self; 9] = [
        Self::Shadow,
        Self::GBuffer,
        Self::Ao,
        Self::Lighting,
        Self::Transparency,
        Self::Axis,
        Self::Composite,
        Self::Display,
        Self::Copy,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Shadow => "Shadow FBO",
            Self::GBuffer => "GBuffer FBO",
            Self::Ao => "AO FBO",
            Self::Lighting => "Lighting FBO",
            Self::Transparency => "Transparency FBO",
            Self::Axis => "Axis FBO",
            Self::Composite => "Composite FBO",
            Self::Display => "Display FBO",
            Self::Copy => "Copy FBO",
        }
    }
}

/// Framebuffers owned by the renderer, created once at init.
#[derive(Debug, Clone)]
pub struct FboTable {
    ids: [FramebufferId; 9],
}

impl FboTable {
    pub fn create(device: &mut dyn GraphicsDevice) -> Self {
        Self {
            ids: FboSlot::ALL.map(|slot| device.create_framebuffer(slot.label())),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, slot: FboSlot) -> FramebufferId {
        self.ids[slot as usize]
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        for id in self.ids {
            device.destroy_framebuffer(id);
        }
    }
}

// ============================================================================
// Texture Set
// ============================================================================

#[derive(Debug, Clone)]
pub struct TextureSet {
    pub width: u32,
    pub height: u32,

    /// Albedo, view-space normal, material parameters.
    pub colortex: [TextureId; 3],
    pub depthtex: TextureId,
    /// Segment id, object id, palette color.
    pub segtex: [TextureId; 3],
    pub usertex0: TextureId,

    pub lightingtex: TextureId,
    pub lightingtex2: TextureId,
    pub outputtex: TextureId,

    pub aotex: Option<TextureId>,
    pub shadowtex: Option<TextureId>,
}

impl TextureSet {
    /// Allocates the set for a `width × height` pixel target.
    pub fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32, settings: &RendererSettings) -> Self {
        let mut tex = |label: &str, format| device.create_texture(&TextureDescriptor::new(label, width, height, format));

        let colortex = [
            tex("colortex0", TextureFormat::Rgba16Float),
            tex("colortex1", TextureFormat::Rgba16Float),
            tex("colortex2", TextureFormat::Rgba16Float),
        ];
        let depthtex = tex("depthtex", TextureFormat::Depth32Float);
        let segtex = [
            tex("segtex0", TextureFormat::R32Sint),
            tex("segtex1", TextureFormat::R32Sint),
            tex("segtex2", TextureFormat::Rgba16Float),
        ];
        let usertex0 = tex("usertex0", TextureFormat::Rgba32Float);
        let lightingtex = tex("lightingtex", TextureFormat::Rgba16Float);
        let lightingtex2 = tex("lightingtex2", TextureFormat::Rgba16Float);
        let outputtex = tex("outputtex", TextureFormat::Rgba16Float);
        let aotex = settings.ao.then(|| tex("aotex", TextureFormat::R32Float));

        let shadowtex = settings.shadow.enabled.then(|| {
            let size = settings.shadow.map_size;
            device.create_texture(&TextureDescriptor::new(
                "shadowtex",
                size,
                size,
                TextureFormat::Depth32Float,
            ))
        });

        Self {
            width,
            height,
            colortex,
            depthtex,
            segtex,
            usertex0,
            lightingtex,
            lightingtex2,
            outputtex,
            aotex,
            shadowtex,
        }
    }

    /// Every texture of the set with its inventory name.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, TextureId)> {
        let mut entries = vec![
            ("colortex0", self.colortex[0]),
            ("colortex1", self.colortex[1]),
            ("colortex2", self.colortex[2]),
            ("depthtex", self.depthtex),
            ("segtex0", self.segtex[0]),
            ("segtex1", self.segtex[1]),
            ("segtex2", self.segtex[2]),
            ("usertex0", self.usertex0),
            ("lightingtex", self.lightingtex),
            ("lightingtex2", self.lightingtex2),
            ("outputtex", self.outputtex),
        ];
        if let Some(ao) = self.aotex {
            entries.push(("aotex", ao));
        }
        if let Some(shadow) = self.shadowtex {
            entries.push(("shadowtex", shadow));
        }
        entries
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        for (_, id) in self.entries() {
            device.destroy_texture(id);
        }
    }
}

// ============================================================================
// Noise
// ============================================================================

/// The persistent R32F noise texture sampled by AO and lighting.
pub fn create_random_texture(device: &mut dyn GraphicsDevice) -> Result<TextureId> {
    let desc = TextureDescriptor::new(
        "randomtex",
        RANDOM_TEXTURE_SIZE,
        RANDOM_TEXTURE_SIZE,
        TextureFormat::R32Float,
    )
    .with_wrap(WrapMode::Repeat);

    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let noise: Vec<f32> = (0..desc.texel_count()).map(|_| rng.random_range(0.0..1.0f32)).collect();

    let id = device.create_texture(&desc);
    device.write_texture(id, &noise)?;
    Ok(id)
}
