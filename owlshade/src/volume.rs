use crate::errors::BakeError;
use crate::render_target::OffscreenTarget;
use crate::renderer::{BakeParams, BakePipelines, BaseRenderer, PrerenderContext, USE_LABELS};
use crate::texture::Texture;

use wgpu::util::DeviceExt;

/// Depth parameter handed to the shader for slice `index`.
pub fn slice_depth(index: u32, resolution: u32) -> f32 {
    index as f32 / resolution as f32
}

pub fn check_volume_resolution(albedo: u32, requested: u32) -> Result<(), BakeError> {
    if albedo != requested {
        return Err(BakeError::VolumeResolutionMismatch { albedo, requested });
    }
    Ok(())
}

/// The procedural albedo volume. Only [`bake_albedo_volume`] makes one, and the normal
/// bake takes one, so the normal volume can't be baked from nothing.
pub struct AlbedoVolume(Texture);

impl AlbedoVolume {
    pub fn texture(&self) -> &Texture {
        &self.0
    }

    pub fn resolution(&self) -> u32 {
        self.0.size.width
    }

    pub fn into_texture(self) -> Texture {
        self.0
    }
}

/// Renders a full screen triangle into each layer of a `resolution³` layered texture,
/// with `BakeParams::depth` set to the layer's depth. The hook may bind an input texture
/// at group 1.
#[profiling::function]
pub fn bake_volume<F>(
    base_renderer: &BaseRenderer,
    pipelines: &BakePipelines,
    pipeline: &wgpu::RenderPipeline,
    resolution: u32,
    label: &str,
    prerender_hook: F,
) -> Result<Texture, BakeError>
where
    F: FnOnce(&mut PrerenderContext) -> Result<Option<wgpu::BindGroup>, BakeError>,
{
    let device = &base_renderer.device;
    let resolution = resolution.max(1);

    let volume = Texture::create_layered_render_target(base_renderer, resolution, label);

    let mut context = PrerenderContext::new(base_renderer, pipelines);
    let input_bind_group = prerender_hook(&mut context)?;
    let base_params = context.params();

    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: USE_LABELS.then_some("Volume Params Buffer"),
        contents: bytemuck::cast_slice(&[base_params]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &pipelines.single_uniform_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }],
        label: USE_LABELS.then_some("volume_params_bind_group"),
    });

    let target = OffscreenTarget::new(base_renderer, resolution, false);

    for layer in 0..resolution {
        base_renderer.queue.write_buffer(
            &params_buffer,
            0,
            bytemuck::cast_slice(&[BakeParams {
                depth: slice_depth(layer, resolution),
                ..base_params
            }]),
        );

        let layer_view = volume.layer_view(layer, 0);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: USE_LABELS.then_some("volume bake encoder"),
        });
        {
            let mut rpass = target.begin_pass(&mut encoder, &layer_view, label);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &params_bind_group, &[]);
            if let Some(input_bind_group) = &input_bind_group {
                rpass.set_bind_group(1, input_bind_group, &[]);
            }
            rpass.draw(0..3, 0..1);
        }
        base_renderer.queue.submit(Some(encoder.finish()));
    }

    Ok(volume)
}

/// Turbulence, veins, dots and brushed noise in r, g, b and a.
pub fn bake_albedo_volume(
    base_renderer: &BaseRenderer,
    pipelines: &BakePipelines,
    resolution: u32,
) -> Result<AlbedoVolume, BakeError> {
    bake_volume(
        base_renderer,
        pipelines,
        &pipelines.albedo_volume_pipeline,
        resolution,
        "albedo volume",
        |_| Ok(None),
    )
    .map(AlbedoVolume)
}

/// Normal perturbation derived from the albedo volume's turbulence gradient.
pub fn bake_normal_volume(
    base_renderer: &BaseRenderer,
    pipelines: &BakePipelines,
    albedo: &AlbedoVolume,
    resolution: u32,
) -> Result<Texture, BakeError> {
    check_volume_resolution(albedo.resolution(), resolution)?;
    bake_volume(
        base_renderer,
        pipelines,
        &pipelines.normal_volume_pipeline,
        resolution,
        "normal volume",
        |context| {
            Ok(Some(context.bind_input(
                &context.pipelines().single_array_texture_bind_group_layout,
                albedo.texture(),
                "albedo_volume_bind_group",
            )))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_cover_unit_depth() {
        assert_eq!(slice_depth(0, 4), 0.0);
        assert_eq!(slice_depth(2, 4), 0.5);
        assert_eq!(slice_depth(3, 4), 0.75);
        // the shader recovers the layer with round(depth * resolution)
        for resolution in [1, 7, 64, 128] {
            for layer in 0..resolution {
                let depth = slice_depth(layer, resolution);
                assert_eq!((depth * resolution as f32).round() as u32, layer);
            }
        }
    }

    #[test]
    fn mismatched_resolutions_are_rejected() {
        assert!(check_volume_resolution(128, 128).is_ok());
        assert!(matches!(
            check_volume_resolution(128, 64),
            Err(BakeError::VolumeResolutionMismatch {
                albedo: 128,
                requested: 64
            })
        ));
    }
}
