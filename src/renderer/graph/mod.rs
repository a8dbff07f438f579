//! Pass graph
//!
//! Provides:
//! - RenderPass: the shared pass contract with capability flags
//! - PassCore: program, framebuffer and size bookkeeping
//! - FrameContext: per-frame read-only inputs
//! - ShadowFrame: directional light frame
//! - The concrete passes, run in this order:
//!
//! ```text
//! shadow → gbuffer → (ao) → lighting → transparency → (axis) → composite → (display)
//! ```

pub mod pass;
pub mod passes;
pub mod shadow_utils;

pub use pass::{FrameContext, PassCapabilities, PassCore, RenderPass};
pub use passes::{AoPass, AxisPass, CompositePass, GBufferPass, LightingPass, ShadowPass, TransparencyPass};
pub use shadow_utils::ShadowFrame;
