//! Render pass implementations.

mod ao;
mod axis;
mod composite;
mod gbuffer;
mod lighting;
mod shadow;
mod transparency;

pub use ao::AoPass;
pub use axis::AxisPass;
pub use composite::CompositePass;
pub use gbuffer::GBufferPass;
pub use lighting::LightingPass;
pub use shadow::ShadowPass;
pub use transparency::TransparencyPass;
