//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`LumenError`] covers:
//! - GPU adapter and device creation, readback and unsupported operations
//! - Shader source loading and program compilation
//! - Pipeline preconditions (rendering before `init`, missing programs)
//! - Image export and cube map loading
//! - Settings parsing
//!
//! Most pipeline entry points follow a "report and continue" contract: the
//! failure is logged and the previous state is kept. Those entry points still
//! return [`Result<T>`] so callers can react, but ignoring the error is safe.
//!
//! ```rust,ignore
//! use lumen::errors::Result;
//!
//! fn configure(renderer: &mut lumen::Renderer) -> Result<()> {
//!     renderer.set_gbuffer_shader("shaders/gbuffer.vert.wgsl", "shaders/gbuffer.frag.wgsl")?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum LumenError {
    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Mapping a readback buffer failed.
    #[error("Texture readback failed: {0}")]
    Readback(String),

    /// The device cannot perform the requested operation.
    #[error("Unsupported by the {device} device: {what}")]
    Unsupported {
        /// Backend name
        device: &'static str,
        /// What was attempted
        what: String,
    },

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader source file could not be read.
    #[error("Failed to read shader source {path:?}: {source}")]
    ShaderSource {
        /// Path of the unreadable file
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Program compilation or linking failed.
    #[error("Shader program '{label}' failed to compile: {message}")]
    ShaderCompile {
        /// Program label (usually the fragment shader file name)
        label: String,
        /// Compiler log
        message: String,
    },

    // ========================================================================
    // Pipeline Preconditions
    // ========================================================================
    /// The renderer has not been initialized.
    #[error("Renderer is not initialized")]
    NotInitialized,

    /// The renderer is rebuilding its resources.
    #[error("Renderer is reconfiguring")]
    Reconfiguring,

    /// A pass required for the current frame has no program.
    #[error("Pass '{0}' has no shader program")]
    MissingShader(&'static str),

    /// Picking was requested before `enable_picking`.
    #[error("Picking is not enabled")]
    PickingDisabled,

    /// A device handle does not name a live object.
    #[error("Invalid {0} handle")]
    InvalidHandle(&'static str),

    /// A texture readback returned data of an unexpected size.
    #[error("Texture readback size mismatch: expected {expected} values, got {actual}")]
    TextureMismatch {
        /// Expected element count
        expected: usize,
        /// Returned element count
        actual: usize,
    },

    // ========================================================================
    // I/O & Format Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error.
    #[error("Image error: {0}")]
    Image(String),

    /// Cube map validation error.
    #[error("Cube map error: {0}")]
    CubeMap(String),

    /// Settings parsing error.
    #[error("Settings parse error: {0}")]
    Config(#[from] serde_json::Error),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for LumenError {
    fn from(err: image::ImageError) -> Self {
        LumenError::Image(err.to_string())
    }
}

/// Alias for `Result<T, LumenError>`.
pub type Result<T> = std::result::Result<T, LumenError>;
