use crate::buffer::GpuBuffer;
use crate::capture::{CaptureCameraUniform, CaptureFrustumSet, CubeFace};
use crate::errors::BakeError;
use crate::mesh::BasicMesh;
use crate::render_target::OffscreenTarget;
use crate::renderer::{BakeParams, BakePipelines, BaseRenderer, PrerenderContext, USE_LABELS};
use crate::sampler_cache::SamplerDescriptor;
use crate::texture::Texture;

use wgpu::util::DeviceExt;

pub const IRRADIANCE_RESOLUTION: u32 = 32;
pub const PREFILTER_RESOLUTION: u32 = 128;
pub const PREFILTER_MIP_COUNT: u32 = 5;

/// The irradiance convolution steps its hemisphere loops by at least this many radians.
pub const MIN_IRRADIANCE_SAMPLE_DELTA: f32 = 0.005;

pub fn prefilter_roughness(mip_level: u32) -> f32 {
    mip_level as f32 / (PREFILTER_MIP_COUNT - 1) as f32
}

pub fn mip_resolution(base_resolution: u32, mip_level: u32) -> u32 {
    (base_resolution >> mip_level).max(1)
}

/// Renders the inside of a unit cube six times, once per capture view, into the faces of
/// a cube texture. The pipeline decides what gets drawn and the prerender hook binds its
/// input texture, so the same loop turns a panorama into a cube map, convolves
/// irradiance and prefilters specular.
pub struct CubemapBaker<'a> {
    pipelines: &'a BakePipelines,
    capture: CaptureFrustumSet,
    cube_vertex_buffer: GpuBuffer,
    cube_index_buffer: GpuBuffer,
    cube_index_count: u32,
    camera_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl<'a> CubemapBaker<'a> {
    pub fn new(
        base_renderer: &BaseRenderer,
        pipelines: &'a BakePipelines,
        capture: CaptureFrustumSet,
    ) -> Result<Self, BakeError> {
        let device = &base_renderer.device;
        let cube_mesh = BasicMesh::unit_cube();
        let cube_indices = cube_mesh
            .indices_u16()
            .map_err(|err| BakeError::resource_load("unit cube", err))?;

        let cube_vertex_buffer = GpuBuffer::from_bytes(
            device,
            bytemuck::cast_slice(&cube_mesh.capture_vertices()),
            std::mem::size_of::<crate::mesh::CaptureVertex>(),
            wgpu::BufferUsages::VERTEX,
            "Cube Vertex Buffer",
        );
        let cube_index_buffer = GpuBuffer::from_bytes(
            device,
            bytemuck::cast_slice(&cube_indices),
            std::mem::size_of::<u16>(),
            wgpu::BufferUsages::INDEX,
            "Cube Index Buffer",
        );

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: USE_LABELS.then_some("Capture Camera Buffer"),
            contents: bytemuck::cast_slice(&[CaptureCameraUniform::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: USE_LABELS.then_some("Cube Bake Params Buffer"),
            contents: bytemuck::cast_slice(&[BakeParams::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.two_uniform_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
            label: USE_LABELS.then_some("cube_bake_uniform_bind_group"),
        });

        Ok(Self {
            pipelines,
            capture,
            cube_vertex_buffer,
            cube_index_count: cube_indices.len() as u32,
            cube_index_buffer,
            camera_buffer,
            params_buffer,
            uniform_bind_group,
        })
    }

    /// Bakes a single-mip cube of `resolution²` per face.
    #[profiling::function]
    pub fn bake<F>(
        &self,
        base_renderer: &BaseRenderer,
        pipeline: &wgpu::RenderPipeline,
        resolution: u32,
        label: &str,
        prerender_hook: F,
    ) -> Result<Texture, BakeError>
    where
        F: FnOnce(&mut PrerenderContext) -> Result<wgpu::BindGroup, BakeError>,
    {
        let cube = Texture::create_cube_render_target(
            base_renderer,
            resolution,
            1,
            label,
            &SamplerDescriptor::clamp_linear(),
        );
        let mut target = OffscreenTarget::new(base_renderer, resolution, true);
        self.bake_mip(base_renderer, pipeline, &cube, 0, &mut target, prerender_hook)?;
        Ok(cube)
    }

    /// Renders all six faces of one mip level of `cube`. `target` is resized to the mip's
    /// resolution.
    pub fn bake_mip<F>(
        &self,
        base_renderer: &BaseRenderer,
        pipeline: &wgpu::RenderPipeline,
        cube: &Texture,
        mip_level: u32,
        target: &mut OffscreenTarget,
        prerender_hook: F,
    ) -> Result<(), BakeError>
    where
        F: FnOnce(&mut PrerenderContext) -> Result<wgpu::BindGroup, BakeError>,
    {
        target.resize(base_renderer, mip_resolution(cube.size.width, mip_level));

        let mut context = PrerenderContext::new(base_renderer, self.pipelines);
        let input_bind_group = prerender_hook(&mut context)?;
        base_renderer.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::cast_slice(&[context.params()]),
        );

        for face in CubeFace::ALL {
            base_renderer.queue.write_buffer(
                &self.camera_buffer,
                0,
                bytemuck::cast_slice(&[self.capture.uniform(face)]),
            );

            let face_view = cube.layer_view(face.layer(), mip_level);
            let mut encoder =
                base_renderer
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: USE_LABELS.then_some("cube bake encoder"),
                    });
            {
                let mut rpass = target.begin_pass(&mut encoder, &face_view, face.name());
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &self.uniform_bind_group, &[]);
                rpass.set_bind_group(1, &input_bind_group, &[]);
                rpass.set_vertex_buffer(0, self.cube_vertex_buffer.src().slice(..));
                rpass.set_index_buffer(
                    self.cube_index_buffer.src().slice(..),
                    wgpu::IndexFormat::Uint16,
                );
                rpass.draw_indexed(0..self.cube_index_count, 0, 0..1);
            }
            base_renderer.queue.submit(Some(encoder.finish()));
        }

        Ok(())
    }

    /// Projects the equirectangular sphere map onto a cube.
    pub fn environment_from_panorama(
        &self,
        base_renderer: &BaseRenderer,
        sphere_map: &Texture,
        resolution: u32,
    ) -> Result<Texture, BakeError> {
        self.bake(
            base_renderer,
            &self.pipelines.equirectangular_to_cubemap_pipeline,
            resolution,
            "environment cubemap",
            |context| {
                Ok(context.bind_input(
                    &context.pipelines().single_texture_bind_group_layout,
                    sphere_map,
                    "sphere_map_bind_group",
                ))
            },
        )
    }

    /// Cosine weighted hemisphere convolution of `environment`, stepping both angles by
    /// `sample_delta` radians.
    pub fn convolve_irradiance(
        &self,
        base_renderer: &BaseRenderer,
        environment: &Texture,
        sample_delta: f32,
    ) -> Result<Texture, BakeError> {
        self.bake(
            base_renderer,
            &self.pipelines.irradiance_pipeline,
            IRRADIANCE_RESOLUTION,
            "irradiance cubemap",
            |context| {
                context.set_params(BakeParams {
                    sample_delta: sample_delta.max(MIN_IRRADIANCE_SAMPLE_DELTA),
                    ..context.params()
                });
                Ok(context.bind_input(
                    &context.pipelines().single_cube_texture_bind_group_layout,
                    environment,
                    "irradiance_input_bind_group",
                ))
            },
        )
    }

    /// GGX prefiltered specular cube, roughness `level / 4` in mip `level`.
    #[profiling::function]
    pub fn prefilter(
        &self,
        base_renderer: &BaseRenderer,
        environment: &Texture,
        sample_count: u32,
    ) -> Result<Texture, BakeError> {
        let prefiltered = Texture::create_cube_render_target(
            base_renderer,
            PREFILTER_RESOLUTION,
            PREFILTER_MIP_COUNT,
            "prefiltered cubemap",
            &SamplerDescriptor::mip_linear(),
        );
        let mut target = OffscreenTarget::new(base_renderer, PREFILTER_RESOLUTION, true);

        for mip_level in 0..prefiltered.mip_level_count() {
            profiling::scope!("prefilter mip", &mip_level.to_string());
            self.bake_mip(
                base_renderer,
                &self.pipelines.prefilter_pipeline,
                &prefiltered,
                mip_level,
                &mut target,
                |context| {
                    context.set_params(BakeParams {
                        roughness: prefilter_roughness(mip_level),
                        sample_count: sample_count.max(1),
                        ..context.params()
                    });
                    Ok(context.bind_input(
                        &context.pipelines().single_cube_texture_bind_group_layout,
                        environment,
                        "prefilter_input_bind_group",
                    ))
                },
            )?;
        }

        Ok(prefiltered)
    }
}
