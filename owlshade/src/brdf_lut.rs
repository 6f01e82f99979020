use crate::errors::BakeError;
use crate::render_target::OffscreenTarget;
use crate::renderer::{BakeParams, BakePipelines, BaseRenderer, USE_LABELS};
use crate::texture::{decode_f16_texels, Texture};

use glam::Vec2;
use wgpu::util::DeviceExt;

pub const BRDF_LUT_RESOLUTION: u32 = 512;

/// Integrates the split-sum scale and bias into a `BRDF_LUT_RESOLUTION²` lut. x is N·V,
/// y is roughness.
#[profiling::function]
pub fn integrate(
    base_renderer: &BaseRenderer,
    pipelines: &BakePipelines,
    sample_count: u32,
) -> Result<Texture, BakeError> {
    let device = &base_renderer.device;

    let lut = Texture::create_render_target(
        base_renderer,
        (BRDF_LUT_RESOLUTION, BRDF_LUT_RESOLUTION),
        Texture::BRDF_LUT_FORMAT,
        "brdf lut",
    );

    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: USE_LABELS.then_some("Brdf Lut Params Buffer"),
        contents: bytemuck::cast_slice(&[BakeParams {
            sample_count: sample_count.max(1),
            ..Default::default()
        }]),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &pipelines.single_uniform_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }],
        label: USE_LABELS.then_some("brdf_lut_params_bind_group"),
    });

    let target = OffscreenTarget::new(base_renderer, BRDF_LUT_RESOLUTION, false);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: USE_LABELS.then_some("Brdf Lut Gen Encoder"),
    });
    {
        let mut rpass = target.begin_pass(&mut encoder, &lut.view, "Brdf Lut Gen");
        rpass.set_pipeline(&pipelines.brdf_lut_pipeline);
        rpass.set_bind_group(0, &params_bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
    base_renderer.queue.submit(Some(encoder.finish()));

    Ok(lut)
}

/// Decoded lut read back from the gpu.
pub struct BrdfLutTexels {
    resolution: u32,
    texels: Vec<f32>,
}

impl BrdfLutTexels {
    pub fn read(base_renderer: &BaseRenderer, lut: &Texture) -> anyhow::Result<Self> {
        let layers = lut.to_bytes(base_renderer)?;
        let bytes = layers
            .first()
            .ok_or_else(|| anyhow::anyhow!("Brdf lut has no layers"))?;
        Ok(Self {
            resolution: lut.size.width,
            texels: decode_f16_texels(bytes),
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// (scale, bias) at texel (x, y), row 0 first. `None` outside the lut.
    pub fn get(&self, x: u32, y: u32) -> Option<Vec2> {
        if x >= self.resolution || y >= self.resolution {
            return None;
        }
        let index = ((y * self.resolution + x) * 2) as usize;
        let texel = self.texels.get(index..index + 2)?;
        Some(Vec2::new(texel[0], texel[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_lookup_stays_inside_the_lut() {
        let texels = BrdfLutTexels {
            resolution: 2,
            texels: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
        };
        assert_eq!(texels.get(1, 0), Some(Vec2::new(0.3, 0.4)));
        assert_eq!(texels.get(0, 1), Some(Vec2::new(0.5, 0.6)));
        assert_eq!(texels.get(2, 0), None);
        assert_eq!(texels.get(0, 2), None);
        assert_eq!(texels.get(u32::MAX, u32::MAX), None);

        let truncated = BrdfLutTexels {
            resolution: 2,
            texels: vec![0.1, 0.2],
        };
        assert_eq!(truncated.get(1, 1), None);
    }
}
