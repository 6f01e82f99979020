use crate::file_loader::HdrPanorama;
use crate::renderer::{BaseRenderer, F16, USE_LABELS};
use crate::sampler_cache::SamplerDescriptor;

use anyhow::{anyhow, bail, Result};

#[derive(Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler_index: usize,
    pub size: wgpu::Extent3d,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    pub fn mip_level_count(&self) -> u32 {
        self.texture.mip_level_count()
    }

    pub fn layer_count(&self) -> u32 {
        self.size.depth_or_array_layers
    }

    pub fn unpadded_bytes_per_row(&self, mip_level: Option<u32>) -> Result<u32> {
        Ok((self.size.width >> mip_level.unwrap_or(0)).max(1) * bytes_per_pixel(self.format())?)
    }

    pub fn padded_bytes_per_row(&self, mip_level: Option<u32>) -> Result<u32> {
        let unpadded_bytes_per_row = self.unpadded_bytes_per_row(mip_level)?;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
        Ok(unpadded_bytes_per_row + padded_bytes_per_row_padding)
    }

    /// Uploads an equirectangular panorama as a filterable half-float texture.
    #[profiling::function]
    pub fn from_panorama(base_renderer: &BaseRenderer, panorama: &HdrPanorama) -> Self {
        let size = wgpu::Extent3d {
            width: panorama.width,
            height: panorama.height,
            depth_or_array_layers: 1,
        };
        let texture = base_renderer
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: USE_LABELS.then_some("sphere map"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::HDR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

        let half_pixels: Vec<F16> = panorama
            .pixels
            .iter()
            .flat_map(|pixel| pixel.map(F16::from))
            .collect();

        base_renderer.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&half_pixels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(panorama.width * 8),
                rows_per_image: Some(panorama.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler_index = base_renderer
            .sampler_cache()
            .get_sampler_index(&base_renderer.device, &SamplerDescriptor::panorama());

        Self {
            texture,
            view,
            sampler_index,
            size,
        }
    }

    /// Cube texture that can be rendered into face by face and mip by mip.
    pub fn create_cube_render_target(
        base_renderer: &BaseRenderer,
        resolution: u32,
        mip_level_count: u32,
        label: &str,
        sampler_descriptor: &SamplerDescriptor,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 6,
        };
        let mip_level_count = mip_level_count.min(size.max_mips(wgpu::TextureDimension::D2));

        let texture = base_renderer
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: USE_LABELS.then_some(label),
                size,
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::HDR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let sampler_index = base_renderer
            .sampler_cache()
            .get_sampler_index(&base_renderer.device, sampler_descriptor);

        Self {
            texture,
            view,
            sampler_index,
            size,
        }
    }

    /// A cubic volume stored as `resolution` layers of `resolution²` texels.
    pub fn create_layered_render_target(
        base_renderer: &BaseRenderer,
        resolution: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: resolution,
        };

        let texture = base_renderer
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: USE_LABELS.then_some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::HDR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let sampler_index = base_renderer
            .sampler_cache()
            .get_sampler_index(&base_renderer.device, &SamplerDescriptor::volume_repeat());

        Self {
            texture,
            view,
            sampler_index,
            size,
        }
    }

    pub fn create_render_target(
        base_renderer: &BaseRenderer,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = base_renderer
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: USE_LABELS.then_some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..Default::default()
        });

        let sampler_index = base_renderer
            .sampler_cache()
            .get_sampler_index(&base_renderer.device, &SamplerDescriptor::clamp_linear());

        Self {
            texture,
            view,
            sampler_index,
            size,
        }
    }

    pub fn create_depth_texture(
        base_renderer: &BaseRenderer,
        (width, height): (u32, u32),
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = base_renderer
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: USE_LABELS.then_some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

        let view = texture.create_view(&Default::default());
        let sampler_index = base_renderer.sampler_cache().get_sampler_index(
            &base_renderer.device,
            &SamplerDescriptor {
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..SamplerDescriptor::clamp_linear()
            },
        );

        Self {
            texture,
            view,
            sampler_index,
            size,
        }
    }

    /// 2D view of one layer and one mip, used as a color attachment.
    pub fn layer_view(&self, layer: u32, mip_level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: USE_LABELS.then_some("layer view"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            base_mip_level: mip_level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// Reads every layer back from the gpu. Each entry of the result holds all mips of one
    /// layer, tightly packed, largest mip first.
    #[profiling::function]
    pub fn to_bytes(&self, base_renderer: &BaseRenderer) -> Result<Vec<Vec<u8>>> {
        let mut result = vec![];
        for layer in 0..self.layer_count() {
            let mut layer_bytes = vec![];
            for mip_level in 0..self.mip_level_count() {
                let width = (self.size.width >> mip_level).max(1);
                let height = (self.size.height >> mip_level).max(1);
                let unpadded_bytes_per_row = self.unpadded_bytes_per_row(Some(mip_level))?;
                let padded_bytes_per_row = self.padded_bytes_per_row(Some(mip_level))?;

                let mut encoder =
                    base_renderer
                        .device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: USE_LABELS.then_some("to_bytes encoder"),
                        });

                let output_buffer = base_renderer.device.create_buffer(&wgpu::BufferDescriptor {
                    size: (padded_bytes_per_row * height) as u64,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    label: USE_LABELS.then_some("to_bytes output buffer"),
                    mapped_at_creation: false,
                });

                encoder.copy_texture_to_buffer(
                    wgpu::ImageCopyTexture {
                        aspect: wgpu::TextureAspect::All,
                        texture: &self.texture,
                        mip_level,
                        origin: wgpu::Origin3d {
                            z: layer,
                            ..wgpu::Origin3d::ZERO
                        },
                    },
                    wgpu::ImageCopyBuffer {
                        buffer: &output_buffer,
                        layout: wgpu::ImageDataLayout {
                            offset: 0,
                            bytes_per_row: Some(padded_bytes_per_row),
                            rows_per_image: None,
                        },
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );

                base_renderer.queue.submit(Some(encoder.finish()));

                {
                    let buffer_slice = output_buffer.slice(..);

                    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
                    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
                        // the receiver outlives the poll below, so a failed send can't happen
                        let _ = tx.send(result);
                    });
                    base_renderer.device.poll(wgpu::Maintain::Wait);
                    crate::block_on(rx.receive())
                        .ok_or_else(|| anyhow!("Texture read back was cancelled"))??;

                    let data = &buffer_slice.get_mapped_range();
                    layer_bytes.reserve((unpadded_bytes_per_row * height) as usize);
                    for row in 0..height {
                        let start_index = (row * padded_bytes_per_row) as usize;
                        let end_index = start_index + unpadded_bytes_per_row as usize;
                        layer_bytes.extend_from_slice(&data[start_index..end_index]);
                    }
                }
                output_buffer.unmap();
            }
            result.push(layer_bytes);
        }

        Ok(result)
    }
}

/// Byte offset and length of one mip inside a layer returned by [`Texture::to_bytes`].
pub fn mip_byte_range(
    texture: &Texture,
    mip_level: u32,
) -> Result<std::ops::Range<usize>> {
    let mut start = 0;
    for level in 0..mip_level {
        let height = (texture.size.height >> level).max(1);
        start += (texture.unpadded_bytes_per_row(Some(level))? * height) as usize;
    }
    let height = (texture.size.height >> mip_level).max(1);
    let len = (texture.unpadded_bytes_per_row(Some(mip_level))? * height) as usize;
    Ok(start..start + len)
}

pub fn bytes_per_pixel(format: wgpu::TextureFormat) -> Result<u32> {
    Ok(match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        wgpu::TextureFormat::Rg16Float => 4,
        wgpu::TextureFormat::Rgba32Float => 16,
        wgpu::TextureFormat::Rgba8Unorm
        | wgpu::TextureFormat::Rgba8UnormSrgb
        | wgpu::TextureFormat::Bgra8Unorm
        | wgpu::TextureFormat::Bgra8UnormSrgb
        | wgpu::TextureFormat::Depth32Float => 4,
        other => bail!("No read back support for texture format {other:?}"),
    })
}

/// Little endian half floats to f32, in texel channel order.
pub fn decode_f16_texels(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| half::f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_half_floats() {
        let values = [1.0f32, -0.5, 0.0, 65504.0];
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|value| half::f16::from_f32(*value).to_le_bytes())
            .collect();
        assert_eq!(decode_f16_texels(&bytes), values.to_vec());
    }

    #[test]
    fn read_back_sizes() {
        assert_eq!(bytes_per_pixel(Texture::HDR_FORMAT).ok(), Some(8));
        assert_eq!(bytes_per_pixel(Texture::BRDF_LUT_FORMAT).ok(), Some(4));
        assert!(bytes_per_pixel(wgpu::TextureFormat::Bc1RgbaUnorm).is_err());
    }
}
