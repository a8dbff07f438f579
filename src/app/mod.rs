//! Application Context
//!
//! [`RenderContext`] is the explicit context object passed through an
//! application: it owns the [`Renderer`], the view-mode queue fed by UI
//! threads, the shader directory and the current mode. There is no global
//! state; logging is installed once with [`init_logging`].
//!
//! ```rust,ignore
//! use lumen::app::{RenderContext, ViewMode};
//!
//! lumen::app::init_logging();
//! let mut ctx = RenderContext::new(lumen::Renderer::software(640, 480), "shaders")?;
//! let ui = ctx.sender();
//! std::thread::spawn(move || ui.send(ViewMode::Segmentation));
//! ctx.frame(&mut scene, &camera);
//! ```

pub mod queue;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use self::queue::{ModeQueue, ModeSender};
use crate::errors::Result;
use crate::renderer::{Renderer, RendererState};
use crate::scene::camera::CameraSpec;
use crate::scene::scene::Scene;

/// Installs `env_logger` once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

/// What a frame shows on the default framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    /// Shaded image.
    #[default]
    Lighting,
    /// Linearized depth.
    Depth,
    /// GBuffer albedo.
    Albedo,
    /// Segment palette colors.
    Segmentation,
}

impl ViewMode {
    /// Fragment shader the lighting pass switches to, if any.
    #[must_use]
    pub fn lighting_fragment(self) -> Option<&'static str> {
        match self {
            Self::Lighting => Some("deferred.frag.wgsl"),
            Self::Depth => Some("deferred_depth.frag.wgsl"),
            Self::Albedo => Some("deferred_albedo.frag.wgsl"),
            Self::Segmentation => None,
        }
    }
}

pub struct RenderContext {
    pub renderer: Renderer,
    queue: ModeQueue,
    shader_dir: PathBuf,
    mode: ViewMode,
}

impl RenderContext {
    /// Loads the standard shaders from `shader_dir` and initializes the
    /// renderer if needed.
    pub fn new(mut renderer: Renderer, shader_dir: impl AsRef<Path>) -> Result<Self> {
        let shader_dir = shader_dir.as_ref().to_path_buf();
        renderer.load_shaders(&shader_dir)?;
        if renderer.state() == RendererState::Uninitialized {
            renderer.init()?;
        }
        Ok(Self {
            renderer,
            queue: ModeQueue::new(),
            shader_dir,
            mode: ViewMode::default(),
        })
    }

    #[must_use]
    pub fn sender(&self) -> ModeSender {
        self.queue.sender()
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    /// Applies a mode immediately, swapping the lighting shader if needed.
    pub fn set_mode(&mut self, mode: ViewMode) {
        if let Some(fragment) = mode.lighting_fragment()
            && self.mode.lighting_fragment() != Some(fragment)
        {
            let vs = self.shader_dir.join("deferred.vert.wgsl");
            let fs = self.shader_dir.join(fragment);
            if self.renderer.set_lighting_shader(vs, fs).is_err() {
                // Compile errors are logged; keep the previous mode.
                return;
            }
        }
        log::debug!("view mode {:?} -> {mode:?}", self.mode);
        self.mode = mode;
    }

    /// Drains queued modes in order, renders `scene` and shows the current
    /// mode on the default framebuffer.
    pub fn frame(&mut self, scene: &mut Scene, camera: &dyn CameraSpec) {
        for mode in self.queue.drain() {
            self.set_mode(mode);
        }
        self.renderer.render_scene(scene, camera);
        match self.mode {
            ViewMode::Segmentation => self.renderer.display_segmentation(None),
            ViewMode::Lighting | ViewMode::Depth | ViewMode::Albedo => self.renderer.display(None),
        }
    }
}
