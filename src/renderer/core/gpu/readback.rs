//! Synchronous texture readback.
//!
//! A region is copied into a mappable staging buffer, the buffer is mapped
//! and the device polled until the map callback fires. Rows come back
//! bottom row first, matching the storage order every device reports.

use half::f16;

use crate::errors::{LumenError, Result};
use crate::renderer::core::TextureFormat;

/// Bytes per texel as stored on the GPU.
#[inline]
pub(crate) fn texel_size(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba16Float => 8,
        TextureFormat::Rgba32Float => 16,
        TextureFormat::R32Float | TextureFormat::R32Sint | TextureFormat::Depth32Float => 4,
    }
}

/// Row pitch of a buffer copy, padded to wgpu's copy alignment.
#[inline]
pub(crate) fn padded_bytes_per_row(width: u32, format: TextureFormat) -> u32 {
    (width * texel_size(format)).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Drops the row padding and reverses the row order.
pub(crate) fn unpad_rows(data: &[u8], width: u32, height: u32, format: TextureFormat) -> Vec<u8> {
    let row = (width * texel_size(format)) as usize;
    let pitch = padded_bytes_per_row(width, format) as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for y in (0..height as usize).rev() {
        if let Some(bytes) = data.get(y * pitch..y * pitch + row) {
            out.extend_from_slice(bytes);
        }
    }
    out
}

/// The inverse of [`unpad_rows`], for uploads. Uploads may use a packed
/// pitch, so only the row order changes.
pub(crate) fn flip_rows(data: &[u8], row: usize) -> Vec<u8> {
    if row == 0 {
        return Vec::new();
    }
    data.chunks_exact(row).rev().flatten().copied().collect()
}

fn words(bytes: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    bytes.chunks_exact(4).map(|w| [w[0], w[1], w[2], w[3]])
}

/// Decodes texels to one float per channel.
pub(crate) fn decode_f32(bytes: &[u8], format: TextureFormat) -> Vec<f32> {
    match format {
        TextureFormat::Rgba16Float => bytes
            .chunks_exact(2)
            .map(|h| f16::from_le_bytes([h[0], h[1]]).to_f32())
            .collect(),
        TextureFormat::R32Sint => words(bytes).map(|w| i32::from_le_bytes(w) as f32).collect(),
        TextureFormat::Rgba32Float | TextureFormat::R32Float | TextureFormat::Depth32Float => {
            words(bytes).map(f32::from_le_bytes).collect()
        }
    }
}

pub(crate) fn decode_i32(bytes: &[u8], format: TextureFormat) -> Vec<i32> {
    match format {
        TextureFormat::R32Sint => words(bytes).map(i32::from_le_bytes).collect(),
        _ => decode_f32(bytes, format).into_iter().map(|f| f as i32).collect(),
    }
}

/// Encodes host floats for an upload.
pub(crate) fn encode_f32(data: &[f32], format: TextureFormat) -> Vec<u8> {
    match format {
        TextureFormat::Rgba16Float => data.iter().flat_map(|v| f16::from_f32(*v).to_le_bytes()).collect(),
        TextureFormat::R32Sint => data.iter().flat_map(|v| (*v as i32).to_le_bytes()).collect(),
        TextureFormat::Rgba32Float | TextureFormat::R32Float | TextureFormat::Depth32Float => {
            data.iter().flat_map(|v| v.to_le_bytes()).collect()
        }
    }
}

/// A texel rectangle, with `y` counted from the top row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Copies `region` of `texture` back to the host, bottom row first.
pub(crate) fn read_region(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: TextureFormat,
    region: Region,
) -> Result<Vec<u8>> {
    if region.width == 0 || region.height == 0 {
        return Ok(Vec::new());
    }
    let pitch = padded_bytes_per_row(region.width, format);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging"),
        size: u64::from(pitch) * u64::from(region.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: region.x,
                y: region.y,
                z: 0,
            },
            aspect: if format.is_depth() {
                wgpu::TextureAspect::DepthOnly
            } else {
                wgpu::TextureAspect::All
            },
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(region.height),
            },
        },
        wgpu::Extent3d {
            width: region.width,
            height: region.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = flume::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let mapped = loop {
        if let Err(e) = device.poll(wgpu::PollType::Poll) {
            return Err(LumenError::Readback(format!("device poll: {e}")));
        }
        match rx.try_recv() {
            Ok(result) => break result,
            Err(flume::TryRecvError::Empty) => std::thread::yield_now(),
            Err(flume::TryRecvError::Disconnected) => {
                return Err(LumenError::Readback("map callback dropped".to_string()));
            }
        }
    };
    mapped.map_err(|e| LumenError::Readback(format!("buffer map: {e}")))?;

    let data = slice.get_mapped_range();
    let rows = unpad_rows(&data, region.width, region.height, format);
    drop(data);
    buffer.unmap();
    Ok(rows)
}
