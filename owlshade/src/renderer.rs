use crate::errors::BakeError;
use crate::mesh::CaptureVertex;
use crate::sampler_cache::SamplerCache;
use crate::texture::Texture;

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

pub(crate) const USE_LABELS: bool = true;
pub(crate) const ENABLE_GRAPHICS_API_VALIDATION: bool = false;

// see last comment here for why we don't have 'Hash': https://internals.rust-lang.org/t/f32-f64-should-implement-hash/5436/33
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct F16(pub half::f16);

unsafe impl bytemuck::Pod for F16 {}
unsafe impl bytemuck::Zeroable for F16 {}

impl Deref for F16 {
    type Target = half::f16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<f32> for F16 {
    fn from(value: f32) -> Self {
        Self(half::f16::from_f32(value))
    }
}

/// Parameters shared by every offscreen bake shader. Each bake reads the fields it needs:
/// the prefilter reads `roughness` and `sample_count`, the irradiance convolution reads
/// `sample_delta` and the volume bakes read `depth`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BakeParams {
    pub roughness: f32,
    pub sample_count: u32,
    pub depth: f32,
    pub sample_delta: f32,
}

pub struct BaseRenderer {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    pub limits: wgpu::Limits,
    sampler_cache: Mutex<SamplerCache>,
}

impl BaseRenderer {
    #[profiling::function]
    pub async fn offscreen(backends: wgpu::Backends) -> Result<Self> {
        let instance = Self::make_instance(backends);
        Self::new(instance).await
    }

    fn make_instance(backends: wgpu::Backends) -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags: if ENABLE_GRAPHICS_API_VALIDATION {
                wgpu::InstanceFlags::debugging()
            } else {
                wgpu::InstanceFlags::empty()
            },
            ..Default::default()
        })
    }

    #[profiling::function]
    async fn new(instance: wgpu::Instance) -> Result<Self> {
        let request_adapter_options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        };
        let adapter = instance
            .request_adapter(&request_adapter_options)
            .await
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Failed to find a wgpu adapter with options: {request_adapter_options:?}"
                )
            })?;

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
        {
            anyhow::bail!(
                "Adapter {:?} can't read storage buffers from the vertex stage",
                adapter.get_info().name
            );
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|err| anyhow::anyhow!("Failed to create wgpu device: {err}"))?;

        log::info!(
            "WGPU device initialized with:\nAdapter: {:?}\nFeatures: {:?}",
            adapter.get_info(),
            device.features()
        );

        let limits = device.limits();

        Ok(Self {
            device,
            adapter,
            queue,
            limits,
            sampler_cache: Mutex::new(SamplerCache::default()),
        })
    }

    pub fn sampler_cache(&self) -> MutexGuard<'_, SamplerCache> {
        self.sampler_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` inside validation and out-of-memory error scopes and turns anything the
    /// device reported into a [`BakeError`]. Device errors win over the closure's own error.
    pub fn capture_gpu_errors<T>(
        &self,
        f: impl FnOnce() -> Result<T, BakeError>,
    ) -> Result<T, BakeError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let result = f();

        // scopes pop in reverse push order
        let validation_error = crate::block_on(self.device.pop_error_scope());
        let out_of_memory_error = crate::block_on(self.device.pop_error_scope());

        if let Some(err) = out_of_memory_error {
            return Err(BakeError::OutOfMemory(err.to_string()));
        }
        if let Some(err) = validation_error {
            return Err(BakeError::Gpu(err.to_string()));
        }
        result
    }
}

/// Bind group layouts and pipelines used by the offscreen bakes. Built once per init and
/// dropped when baking is done.
pub struct BakePipelines {
    pub single_texture_bind_group_layout: wgpu::BindGroupLayout,
    pub single_cube_texture_bind_group_layout: wgpu::BindGroupLayout,
    pub single_array_texture_bind_group_layout: wgpu::BindGroupLayout,
    pub single_uniform_bind_group_layout: wgpu::BindGroupLayout,
    pub two_uniform_bind_group_layout: wgpu::BindGroupLayout,

    pub equirectangular_to_cubemap_pipeline: wgpu::RenderPipeline,
    pub irradiance_pipeline: wgpu::RenderPipeline,
    pub prefilter_pipeline: wgpu::RenderPipeline,
    pub brdf_lut_pipeline: wgpu::RenderPipeline,
    pub albedo_volume_pipeline: wgpu::RenderPipeline,
    pub normal_volume_pipeline: wgpu::RenderPipeline,
}

impl BakePipelines {
    #[profiling::function]
    pub fn new(base: &BaseRenderer) -> Self {
        let device = &base.device;

        let make_shader = |label: &str, source: &'static str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: USE_LABELS.then_some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };

        let equirectangular_to_cubemap_shader = make_shader(
            "Equirectangular To Cubemap Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/capture.wgsl"),
                include_str!("shaders/equirect_to_cube.wgsl"),
            ),
        );
        let irradiance_shader = make_shader(
            "Irradiance Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/pbr_funcs.wgsl"),
                include_str!("shaders/capture.wgsl"),
                include_str!("shaders/irradiance.wgsl"),
            ),
        );
        let prefilter_shader = make_shader(
            "Prefilter Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/pbr_funcs.wgsl"),
                include_str!("shaders/capture.wgsl"),
                include_str!("shaders/prefilter.wgsl"),
            ),
        );
        let brdf_lut_shader = make_shader(
            "Brdf Lut Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/pbr_funcs.wgsl"),
                include_str!("shaders/fullscreen.wgsl"),
                include_str!("shaders/brdf_lut.wgsl"),
            ),
        );
        let albedo_volume_shader = make_shader(
            "Albedo Volume Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/fullscreen.wgsl"),
                include_str!("shaders/noise.wgsl"),
                include_str!("shaders/albedo_volume.wgsl"),
            ),
        );
        let normal_volume_shader = make_shader(
            "Normal Volume Shader",
            concat!(
                include_str!("shaders/bake_params.wgsl"),
                include_str!("shaders/fullscreen.wgsl"),
                include_str!("shaders/normal_volume.wgsl"),
            ),
        );

        let single_texture_bind_group_layout = make_single_texture_bind_group_layout(
            device,
            wgpu::TextureViewDimension::D2,
            "single_texture_bind_group_layout",
        );
        let single_cube_texture_bind_group_layout = make_single_texture_bind_group_layout(
            device,
            wgpu::TextureViewDimension::Cube,
            "single_cube_texture_bind_group_layout",
        );
        let single_array_texture_bind_group_layout = make_single_texture_bind_group_layout(
            device,
            wgpu::TextureViewDimension::D2Array,
            "single_array_texture_bind_group_layout",
        );

        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let single_uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[uniform_entry(0)],
                label: USE_LABELS.then_some("single_uniform_bind_group_layout"),
            });

        let two_uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[uniform_entry(0), uniform_entry(1)],
                label: USE_LABELS.then_some("two_uniform_bind_group_layout"),
            });

        let hdr_color_targets = &[Some(wgpu::ColorTargetState {
            format: Texture::HDR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        // the capture projection flips y, which also flips the winding of the cube's faces
        let capture_primitive_state = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        };
        let capture_depth_stencil_state = Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let make_capture_pipeline =
            |label: &str, shader: &wgpu::ShaderModule, input_layout: &wgpu::BindGroupLayout| {
                let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: USE_LABELS.then_some(label),
                    bind_group_layouts: &[&two_uniform_bind_group_layout, input_layout],
                    push_constant_ranges: &[],
                });
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: USE_LABELS.then_some(label),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: shader,
                        entry_point: "vs_main",
                        buffers: &[CaptureVertex::desc()],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: shader,
                        entry_point: "fs_main",
                        targets: hdr_color_targets,
                    }),
                    primitive: capture_primitive_state,
                    depth_stencil: capture_depth_stencil_state.clone(),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                })
            };

        let equirectangular_to_cubemap_pipeline = make_capture_pipeline(
            "Equirectangular To Cubemap Pipeline",
            &equirectangular_to_cubemap_shader,
            &single_texture_bind_group_layout,
        );
        let irradiance_pipeline = make_capture_pipeline(
            "Irradiance Pipeline",
            &irradiance_shader,
            &single_cube_texture_bind_group_layout,
        );
        let prefilter_pipeline = make_capture_pipeline(
            "Prefilter Pipeline",
            &prefilter_shader,
            &single_cube_texture_bind_group_layout,
        );

        let make_fullscreen_pipeline = |label: &str,
                                        shader: &wgpu::ShaderModule,
                                        bind_group_layouts: &[&wgpu::BindGroupLayout],
                                        format: wgpu::TextureFormat| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: USE_LABELS.then_some(label),
                bind_group_layouts,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: USE_LABELS.then_some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };

        let brdf_lut_pipeline = make_fullscreen_pipeline(
            "Brdf Lut Gen Pipeline",
            &brdf_lut_shader,
            &[&single_uniform_bind_group_layout],
            Texture::BRDF_LUT_FORMAT,
        );
        let albedo_volume_pipeline = make_fullscreen_pipeline(
            "Albedo Volume Pipeline",
            &albedo_volume_shader,
            &[&single_uniform_bind_group_layout],
            Texture::HDR_FORMAT,
        );
        let normal_volume_pipeline = make_fullscreen_pipeline(
            "Normal Volume Pipeline",
            &normal_volume_shader,
            &[
                &single_uniform_bind_group_layout,
                &single_array_texture_bind_group_layout,
            ],
            Texture::HDR_FORMAT,
        );

        Self {
            single_texture_bind_group_layout,
            single_cube_texture_bind_group_layout,
            single_array_texture_bind_group_layout,
            single_uniform_bind_group_layout,
            two_uniform_bind_group_layout,

            equirectangular_to_cubemap_pipeline,
            irradiance_pipeline,
            prefilter_pipeline,
            brdf_lut_pipeline,
            albedo_volume_pipeline,
            normal_volume_pipeline,
        }
    }
}

fn make_single_texture_bind_group_layout(
    device: &wgpu::Device,
    view_dimension: wgpu::TextureViewDimension,
    label: &str,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: USE_LABELS.then_some(label),
    })
}

/// Handed to a bake's pre-render hook. The hook binds whatever input the bake shader
/// samples and may override the bake parameters before the first pass is recorded.
pub struct PrerenderContext<'a> {
    base: &'a BaseRenderer,
    pipelines: &'a BakePipelines,
    params: BakeParams,
}

impl<'a> PrerenderContext<'a> {
    pub(crate) fn new(base: &'a BaseRenderer, pipelines: &'a BakePipelines) -> Self {
        Self {
            base,
            pipelines,
            params: BakeParams::default(),
        }
    }

    pub fn base(&self) -> &'a BaseRenderer {
        self.base
    }

    pub fn pipelines(&self) -> &'a BakePipelines {
        self.pipelines
    }

    pub fn params(&self) -> BakeParams {
        self.params
    }

    pub fn set_params(&mut self, params: BakeParams) {
        self.params = params;
    }

    /// Binds `texture` and its cached sampler to the given single texture layout.
    pub fn bind_input(
        &self,
        layout: &wgpu::BindGroupLayout,
        texture: &Texture,
        label: &str,
    ) -> wgpu::BindGroup {
        let sampler_cache = self.base.sampler_cache();
        self.base
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(
                            sampler_cache.get_sampler_by_index(texture.sampler_index),
                        ),
                    },
                ],
                label: USE_LABELS.then_some(label),
            })
    }
}
