#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod errors;
pub mod renderer;
pub mod scene;

pub use app::{RenderContext, ViewMode};
pub use errors::{LumenError, Result};
pub use renderer::core::{GraphicsDevice, SoftwareDevice, WgpuDevice};
pub use renderer::settings::RendererSettings;
pub use renderer::Renderer;
pub use scene::{
    AxesPlacement, Camera, CameraSpec, CubeMap, DirectionalLight, FpsCamera, Mesh, Object, ObjectKey,
    ParallelogramLight, PbrMaterial, PointLight, Scene, Texture,
};
