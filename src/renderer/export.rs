//! Host-side Export
//!
//! Synchronous readback of pipeline textures. Every array is row-major with
//! the top row first (device rows are stored bottom-up, so rows are flipped).
//!
//! | method                 | texture      | element     |
//! |------------------------|--------------|-------------|
//! | `get_lighting`         | lightingtex  | RGBA `f32`  |
//! | `get_albedo`           | colortex0    | RGBA `f32`  |
//! | `get_normal`           | colortex1    | RGBA `f32`  |
//! | `get_depth`            | depthtex     | `f32`       |
//! | `get_segmentation`     | segtex0      | `i32`       |
//! | `get_segmentation2`    | segtex1      | `i32`       |
//! | `get_user_texture`     | usertex0     | RGBA `f32`  |
//!
//! The `write_*_raw` variants dump the same array as little-endian binary and
//! write `<file>.meta` next to it with `width: W, height: H`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bytemuck::Pod;

use super::Renderer;
use super::core::TextureId;
use super::textures::TextureSet;
use crate::errors::{LumenError, Result};

/// Reverses the row order of a `width × height` image of `channels`
/// elements per pixel.
#[must_use]
pub fn flip_rows<T: Copy>(data: &[T], width: usize, height: usize, channels: usize) -> Vec<T> {
    let row = width * channels;
    if row == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks_exact(row).rev().take(height) {
        out.extend_from_slice(chunk);
    }
    out
}

fn meta_path(path: &Path) -> PathBuf {
    let mut meta = OsString::from(path.as_os_str());
    meta.push(".meta");
    PathBuf::from(meta)
}

fn write_raw<T: Pod>(path: &Path, data: &[T], width: u32, height: u32) -> Result<()> {
    std::fs::write(path, bytemuck::cast_slice(data))?;
    std::fs::write(meta_path(path), format!("width: {width}, height: {height}\n"))?;
    log::debug!("wrote {} ({width}x{height})", path.display());
    Ok(())
}

impl Renderer {
    fn export_set(&self) -> Result<&TextureSet> {
        self.textures.as_ref().ok_or(LumenError::NotInitialized)
    }

    fn read_f32_flipped(&self, texture: TextureId) -> Result<Vec<f32>> {
        let desc = self
            .device
            .texture_descriptor(texture)
            .ok_or(LumenError::InvalidHandle("texture"))?;
        let data = self.device.read_texture_f32(texture)?;
        let channels = desc.format.channels();
        let expected = desc.texel_count() * channels;
        if data.len() != expected {
            return Err(LumenError::TextureMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(flip_rows(&data, desc.width as usize, desc.height as usize, channels))
    }

    fn read_i32_flipped(&self, texture: TextureId) -> Result<Vec<i32>> {
        let desc = self
            .device
            .texture_descriptor(texture)
            .ok_or(LumenError::InvalidHandle("texture"))?;
        let data = self.device.read_texture_i32(texture)?;
        if data.len() != desc.texel_count() {
            return Err(LumenError::TextureMismatch {
                expected: desc.texel_count(),
                actual: data.len(),
            });
        }
        Ok(flip_rows(&data, desc.width as usize, desc.height as usize, 1))
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    pub fn get_lighting(&self) -> Result<Vec<f32>> {
        self.read_f32_flipped(self.export_set()?.lightingtex)
    }

    pub fn get_albedo(&self) -> Result<Vec<f32>> {
        self.read_f32_flipped(self.export_set()?.colortex[0])
    }

    pub fn get_normal(&self) -> Result<Vec<f32>> {
        self.read_f32_flipped(self.export_set()?.colortex[1])
    }

    /// Window-space depth in `[0, 1]`; background pixels read 1.
    pub fn get_depth(&self) -> Result<Vec<f32>> {
        self.read_f32_flipped(self.export_set()?.depthtex)
    }

    /// Segment id per pixel, 0 where no object was drawn.
    pub fn get_segmentation(&self) -> Result<Vec<i32>> {
        self.read_i32_flipped(self.export_set()?.segtex[0])
    }

    /// Object id per pixel, 0 where no object was drawn.
    pub fn get_segmentation2(&self) -> Result<Vec<i32>> {
        self.read_i32_flipped(self.export_set()?.segtex[1])
    }

    pub fn get_user_texture(&self) -> Result<Vec<f32>> {
        self.read_f32_flipped(self.export_set()?.usertex0)
    }

    // ========================================================================
    // Raw files
    // ========================================================================

    pub fn write_lighting_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_lighting()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_albedo_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_albedo()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_normal_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_normal()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_depth_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_depth()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_segmentation_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_segmentation()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_segmentation2_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_segmentation2()?, self.pixel_width, self.pixel_height)
    }

    pub fn write_user_texture_raw(&self, path: impl AsRef<Path>) -> Result<()> {
        write_raw(path.as_ref(), &self.get_user_texture()?, self.pixel_width, self.pixel_height)
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Writes the final image (what [`display`](Self::display) shows) as an
    /// RGBA8 PNG, top row first.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let set = self.export_set()?;
        let texture = if self.display_pass_ran() {
            set.outputtex
        } else {
            set.lightingtex2
        };
        self.write_texture_png(texture, path.as_ref())
    }

    /// Writes the lighting buffer as an RGBA8 PNG.
    pub fn write_lighting_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_texture_png(self.export_set()?.lightingtex, path.as_ref())
    }

    fn write_texture_png(&self, texture: TextureId, path: &Path) -> Result<()> {
        let rgba = self.read_f32_flipped(texture)?;
        let bytes: Vec<u8> = rgba
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let image = image::RgbaImage::from_raw(self.pixel_width, self.pixel_height, bytes)
            .ok_or_else(|| LumenError::Image("pixel buffer does not match image size".to_string()))?;
        image.save(path)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_rows_reverses_row_order() {
        let data = [1, 2, 3, 4, 5, 6];
        assert_eq!(flip_rows(&data, 3, 2, 1), vec![4, 5, 6, 1, 2, 3]);
        assert_eq!(flip_rows(&data, 1, 3, 2), vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(meta_path(Path::new("/tmp/seg.bin")), PathBuf::from("/tmp/seg.bin.meta"));
    }
}
