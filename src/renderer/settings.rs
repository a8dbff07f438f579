//! Renderer Settings
//!
//! Feature flags and sizes that shape the pass graph. They are meant to be
//! decided before [`Renderer::init`](super::Renderer::init); changing an
//! optional pass afterwards goes through the renderer's toggle methods and
//! rebuilds every texture.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lumen::renderer::settings::{RendererSettings, ShadowSettings};
//!
//! let settings = RendererSettings {
//!     shadow: ShadowSettings { enabled: true, ..Default::default() },
//!     ao: true,
//!     shader_dir: Some("shaders".into()),
//!     ..Default::default()
//! };
//!
//! // Or from a JSON file; missing fields keep their defaults.
//! let settings = RendererSettings::load("renderer.json")?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// Pass Settings
// ---------------------------------------------------------------------------

/// Directional shadow map configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    /// Width and height of the square shadow map, in texels.
    pub map_size: u32,
    /// Half-extent of the orthographic light frustum, in world units.
    pub frustum_size: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            map_size: 2048,
            frustum_size: 10.0,
        }
    }
}

/// Axis gizmo configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSettings {
    pub enabled: bool,
    /// Draw the unit gizmo at the world origin.
    pub global_axes: bool,
    /// Object id written for gizmo pixels; lets picking identify them.
    pub object_id: i32,
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Pixel density multiplier; textures are `width × scaling` by
    /// `height × scaling`.
    pub scaling: f32,

    // === Optional passes ===
    pub shadow: ShadowSettings,
    pub ao: bool,
    pub axis: AxisSettings,
    /// Run the final display pass (tone mapping) after compositing.
    pub display: bool,

    // === Outputs ===
    /// Write segmentation ids and palette colors in the GBuffer pass.
    pub segmentation: bool,
    /// Allocate the picking framebuffer at init.
    pub picking: bool,

    /// Directory holding the standard shader files. When set, `init` loads
    /// every pass's shaders from it.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            scaling: 1.0,
            shadow: ShadowSettings::default(),
            ao: false,
            axis: AxisSettings::default(),
            display: false,
            segmentation: true,
            picking: false,
            shader_dir: None,
        }
    }
}

impl RendererSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
