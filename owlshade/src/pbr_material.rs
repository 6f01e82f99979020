use crate::brdf_lut;
use crate::capture::CaptureFrustumSet;
use crate::config::PbrConfig;
use crate::cubemap::CubemapBaker;
use crate::errors::{BakeError, InitError, InitStep, MaterialError};
use crate::file_loader::AssetSource;
use crate::material::{FrameInput, Material, MaterialInput, TessType};
use crate::morph::{MorphBlendState, MorphBuffer};
use crate::renderer::{BakePipelines, BaseRenderer, USE_LABELS};
use crate::sampler_cache::SamplerDescriptor;
use crate::texture::Texture;
use crate::uniforms::*;
use crate::volume::{self, AlbedoVolume};

use std::time::Instant;

use glam::f32::Vec3;

/// Upper bound on the per-edge subdivision of the procedural tessellation.
pub const MAX_TESS_FACTOR: u32 = 64;

/// Number of segments each triangle edge is split into for the given stored levels.
pub fn tess_factor(level_inner: f32, level_outer: f32) -> u32 {
    (level_inner.max(level_outer) + 1.0).clamp(1.0, MAX_TESS_FACTOR as f32) as u32
}

/// Vertices drawn for a mesh of `index_count` indices: each triangle becomes
/// `tess_factor²` sub-triangles.
pub fn tessellated_vertex_count(
    index_count: usize,
    tess_factor: u32,
) -> Result<u32, MaterialError> {
    u32::try_from(index_count)
        .ok()
        .and_then(|count| count.checked_mul(tess_factor))
        .and_then(|count| count.checked_mul(tess_factor))
        .ok_or(MaterialError::DrawTooLarge {
            index_count,
            tess_factor,
        })
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PbrParams {
    pub albedo: Vec3,
    pub ao: f32,
    pub exposure: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub base_spec: f32,
    pub normal_strength: f32,
    /// Requested level minus one.
    pub tess_level_inner: f32,
    /// Requested level minus one.
    pub tess_level_outer: f32,
    pub tess_type: TessType,
    pub phong_strength: f32,
    pub tess_mask_cap: f32,
    pub eye_disp: f32,
    pub eye_scale: f32,
    pub eye_rotation: f32,
    pub eye_warp: f32,
    pub eye_exponent: f32,
    pub eye_thickness: f32,
    pub eye_gap: f32,
    pub eye_fuzz: f32,
    pub eye_mask_cap: f32,
    pub eye_translate: Vec3,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            albedo: Vec3::new(0.5, 0.5, 0.5),
            ao: 1.0,
            exposure: 1.0,
            roughness: 0.5,
            metallic: 0.0,
            base_spec: 0.04,
            normal_strength: 1.0,
            tess_level_inner: 0.0,
            tess_level_outer: 0.0,
            tess_type: TessType::Flat,
            phong_strength: 0.0,
            tess_mask_cap: 0.25,
            eye_disp: 0.0,
            eye_scale: 1.0,
            eye_rotation: 0.0,
            eye_warp: 0.0,
            eye_exponent: 1.0,
            eye_thickness: 0.1,
            eye_gap: 0.1,
            eye_fuzz: 0.05,
            eye_mask_cap: 0.25,
            eye_translate: Vec3::ZERO,
        }
    }
}

impl PbrParams {
    /// Stores the new value and pushes it to `sink` straight away. Returns false for inputs
    /// that aren't shader parameters.
    pub fn apply(&mut self, input: MaterialInput, sink: &mut dyn UniformSink) -> bool {
        use MaterialInput::*;

        match input {
            Metallic(value) => {
                self.metallic = value;
                sink.set_uniform("u_metallic", UniformValue::Float(value));
            }
            Roughness(value) => {
                self.roughness = value;
                sink.set_uniform("u_roughness", UniformValue::Float(value));
            }
            Albedo(value) => {
                self.albedo = value;
                sink.set_uniform("u_albedo", UniformValue::Vec3(value));
            }
            Ao(value) => {
                self.ao = value;
                sink.set_uniform("u_ao", UniformValue::Float(value));
            }
            Exposure(value) => {
                self.exposure = value;
                sink.set_uniform("u_exposure", UniformValue::Float(value));
            }
            BaseSpec(value) => {
                self.base_spec = value;
                sink.set_uniform("u_baseSpec", UniformValue::Float(value));
            }
            NormalStrength(value) => {
                self.normal_strength = value;
                sink.set_uniform("u_normalStrength", UniformValue::Float(value));
            }
            TessLevelInner(level) => {
                self.tess_level_inner = level.saturating_sub(1) as f32;
                sink.set_uniform(
                    "u_tessLevelInner",
                    UniformValue::Float(self.tess_level_inner),
                );
            }
            TessLevelOuter(level) => {
                self.tess_level_outer = level.saturating_sub(1) as f32;
                sink.set_uniform(
                    "u_tessLevelOuter",
                    UniformValue::Float(self.tess_level_outer),
                );
            }
            TessType(tess_type) => {
                self.tess_type = tess_type;
                sink.set_uniform("u_tessType", UniformValue::Int(tess_type.shader_value()));
            }
            PhongStrength(percent) => {
                self.phong_strength = percent as f32 / 100.0;
                sink.set_uniform("u_phongStrength", UniformValue::Float(self.phong_strength));
            }
            TessMaskCap(value) => {
                self.tess_mask_cap = value;
                sink.set_uniform("u_tessMaskCap", UniformValue::Float(value));
            }
            EyeDisp(value) => {
                self.eye_disp = value;
                sink.set_uniform("u_eyeDisp", UniformValue::Float(value));
            }
            EyeScale(value) => {
                self.eye_scale = value;
                sink.set_uniform("u_eyeScale", UniformValue::Float(value));
            }
            EyeRotation(value) => {
                self.eye_rotation = value;
                sink.set_uniform("u_eyeRotation", UniformValue::Float(value));
            }
            EyeWarp(value) => {
                self.eye_warp = value;
                sink.set_uniform("u_eyeWarp", UniformValue::Float(value));
            }
            EyeExponent(value) => {
                self.eye_exponent = value;
                sink.set_uniform("u_eyeExponent", UniformValue::Float(value));
            }
            EyeThickness(value) => {
                self.eye_thickness = value;
                sink.set_uniform("u_eyeThickness", UniformValue::Float(value));
            }
            EyeGap(value) => {
                self.eye_gap = value;
                sink.set_uniform("u_eyeGap", UniformValue::Float(value));
            }
            EyeFuzz(value) => {
                self.eye_fuzz = value;
                sink.set_uniform("u_eyeFuzz", UniformValue::Float(value));
            }
            EyeMaskCap(value) => {
                self.eye_mask_cap = value;
                sink.set_uniform("u_eyeMaskCap", UniformValue::Float(value));
            }
            EyeTranslateX(value) => {
                self.eye_translate.x = value;
                sink.set_uniform("u_eyeTranslate", UniformValue::Vec3(self.eye_translate));
            }
            EyeTranslateY(value) => {
                self.eye_translate.y = value;
                sink.set_uniform("u_eyeTranslate", UniformValue::Vec3(self.eye_translate));
            }
            EyeTranslateZ(value) => {
                self.eye_translate.z = value;
                sink.set_uniform("u_eyeTranslate", UniformValue::Vec3(self.eye_translate));
            }
            Paused(_) => return false,
        }
        true
    }

    pub fn push_all(&self, sink: &mut dyn UniformSink) {
        let floats = [
            ("u_ao", self.ao),
            ("u_exposure", self.exposure),
            ("u_roughness", self.roughness),
            ("u_metallic", self.metallic),
            ("u_baseSpec", self.base_spec),
            ("u_normalStrength", self.normal_strength),
            ("u_tessLevelInner", self.tess_level_inner),
            ("u_tessLevelOuter", self.tess_level_outer),
            ("u_phongStrength", self.phong_strength),
            ("u_tessMaskCap", self.tess_mask_cap),
            ("u_eyeDisp", self.eye_disp),
            ("u_eyeScale", self.eye_scale),
            ("u_eyeRotation", self.eye_rotation),
            ("u_eyeWarp", self.eye_warp),
            ("u_eyeExponent", self.eye_exponent),
            ("u_eyeThickness", self.eye_thickness),
            ("u_eyeGap", self.eye_gap),
            ("u_eyeFuzz", self.eye_fuzz),
            ("u_eyeMaskCap", self.eye_mask_cap),
        ];
        for (name, value) in floats {
            sink.set_uniform(name, UniformValue::Float(value));
        }
        sink.set_uniform("u_albedo", UniformValue::Vec3(self.albedo));
        sink.set_uniform("u_eyeTranslate", UniformValue::Vec3(self.eye_translate));
        sink.set_uniform("u_tessType", UniformValue::Int(self.tess_type.shader_value()));
    }

    pub fn tess_factor(&self) -> u32 {
        tess_factor(self.tess_level_inner, self.tess_level_outer)
    }
}

const PBR_SHADER_SOURCE: &str = concat!(
    include_str!("shaders/pbr_funcs.wgsl"),
    include_str!("shaders/owl_eye.wgsl"),
    include_str!("shaders/owl_pbr.wgsl"),
);

/// Everything the pbr material bakes and binds during init.
pub struct PbrResources {
    pub environment: Texture,
    pub irradiance: Texture,
    pub prefiltered: Texture,
    pub brdf_lut: Texture,
    pub albedo_volume: Texture,
    pub normal_volume: Texture,
    pub morph: MorphBuffer,
    uniform_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    environment_bind_group: wgpu::BindGroup,
    uniform_bind_group: wgpu::BindGroup,
    morph_bind_group: wgpu::BindGroup,
}

/// Image based lit, procedurally textured and morph animated material.
pub struct PbrMaterial {
    config: PbrConfig,
    params: PbrParams,
    blend: MorphBlendState,
    resources: Option<PbrResources>,
}

fn run_step<T>(
    base_renderer: &BaseRenderer,
    step: InitStep,
    f: impl FnOnce() -> Result<T, BakeError>,
) -> Result<T, InitError> {
    profiling::scope!("pbr init step", step.name());
    let start_time = Instant::now();
    let result = base_renderer
        .capture_gpu_errors(f)
        .map_err(|source| InitError { step, source })?;
    log::info!("{step} took {:?}", start_time.elapsed());
    Ok(result)
}

impl PbrMaterial {
    pub const SHADER_IDENTIFIER: &'static str = "owl_pbr";

    pub fn new(config: PbrConfig, params: PbrParams) -> Self {
        let blend = MorphBlendState::new(config.morph_target_count, config.morph_fps);
        Self {
            config,
            params,
            blend,
            resources: None,
        }
    }

    pub fn config(&self) -> &PbrConfig {
        &self.config
    }

    pub fn params(&self) -> &PbrParams {
        &self.params
    }

    pub fn blend_state(&self) -> &MorphBlendState {
        &self.blend
    }

    pub fn resources(&self) -> Option<&PbrResources> {
        self.resources.as_ref()
    }

    /// Vertices drawn per frame: every index of the mesh, subdivided `tess_factor²` times.
    pub fn draw_vertex_count(&self) -> Result<u32, MaterialError> {
        let resources = self
            .resources
            .as_ref()
            .ok_or(MaterialError::NotReady(Self::SHADER_IDENTIFIER))?;
        tessellated_vertex_count(resources.morph.index_count(), self.params.tess_factor())
    }

    #[profiling::function]
    fn bake(
        &self,
        base_renderer: &BaseRenderer,
        assets: &dyn AssetSource,
    ) -> Result<PbrResources, InitError> {
        let config = &self.config;

        let pipelines = run_step(base_renderer, InitStep::CompileBakeShaders, || {
            Ok(BakePipelines::new(base_renderer))
        })?;
        let capture = run_step(base_renderer, InitStep::CaptureMatrices, || {
            Ok(CaptureFrustumSet::new())
        })?;
        let sphere_map = run_step(base_renderer, InitStep::LoadSphereMap, || {
            let panorama = assets
                .load_panorama()
                .map_err(|err| BakeError::resource_load("sphere map", err))?;
            Ok(Texture::from_panorama(base_renderer, &panorama))
        })?;

        let baker = CubemapBaker::new(base_renderer, &pipelines, capture)
            .map_err(|source| InitError {
                step: InitStep::BakeEnvironment,
                source,
            })?;
        let environment = run_step(base_renderer, InitStep::BakeEnvironment, || {
            baker.environment_from_panorama(
                base_renderer,
                &sphere_map,
                config.environment_resolution,
            )
        })?;
        let irradiance = run_step(base_renderer, InitStep::ConvolveIrradiance, || {
            baker.convolve_irradiance(
                base_renderer,
                &environment,
                config.irradiance_sample_delta,
            )
        })?;
        let prefiltered = run_step(base_renderer, InitStep::PrefilterSpecular, || {
            baker.prefilter(base_renderer, &environment, config.prefilter_sample_count)
        })?;
        let brdf_lut = run_step(base_renderer, InitStep::IntegrateBrdf, || {
            brdf_lut::integrate(base_renderer, &pipelines, config.brdf_sample_count)
        })?;
        let albedo_volume: AlbedoVolume = run_step(base_renderer, InitStep::BakeAlbedoVolume, || {
            volume::bake_albedo_volume(base_renderer, &pipelines, config.volume_resolution)
        })?;
        let normal_volume = run_step(base_renderer, InitStep::BakeNormalVolume, || {
            volume::bake_normal_volume(
                base_renderer,
                &pipelines,
                &albedo_volume,
                config.volume_resolution,
            )
        })?;
        let morph = run_step(base_renderer, InitStep::BuildMorphBuffer, || {
            MorphBuffer::build(base_renderer, assets, config.morph_target_count)
        })?;

        run_step(base_renderer, InitStep::BindUniforms, || {
            Ok(bind_resources(
                base_renderer,
                config,
                BakedTextures {
                    environment,
                    irradiance,
                    prefiltered,
                    brdf_lut,
                    albedo_volume: albedo_volume.into_texture(),
                    normal_volume,
                },
                morph,
            ))
        })
    }

    fn writer<'a>(
        resources: &'a PbrResources,
        base_renderer: &'a BaseRenderer,
    ) -> GpuUniformWriter<'a> {
        GpuUniformWriter::new(&base_renderer.queue, &resources.uniform_buffer)
    }
}

struct BakedTextures {
    environment: Texture,
    irradiance: Texture,
    prefiltered: Texture,
    brdf_lut: Texture,
    albedo_volume: Texture,
    normal_volume: Texture,
}

fn bind_resources(
    base_renderer: &BaseRenderer,
    config: &PbrConfig,
    textures: BakedTextures,
    morph: MorphBuffer,
) -> PbrResources {
    let device = &base_renderer.device;

    let texture_entry = |binding: u32, view_dimension: wgpu::TextureViewDimension| {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        }
    };
    let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    };
    let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    let environment_bind_group_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                texture_entry(IRRADIANCE_UNIT, wgpu::TextureViewDimension::Cube),
                texture_entry(PREFILTER_UNIT, wgpu::TextureViewDimension::Cube),
                texture_entry(BRDF_LUT_UNIT, wgpu::TextureViewDimension::D2),
                texture_entry(ALBEDO_VOLUME_UNIT, wgpu::TextureViewDimension::D2Array),
                texture_entry(NORMAL_VOLUME_UNIT, wgpu::TextureViewDimension::D2Array),
                sampler_entry(CLAMP_SAMPLER_BINDING),
                sampler_entry(MIP_SAMPLER_BINDING),
                sampler_entry(VOLUME_SAMPLER_BINDING),
            ],
            label: USE_LABELS.then_some("pbr_environment_bind_group_layout"),
        });
    let uniform_bind_group_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: MATERIAL_UNIFORMS_BINDING,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(MATERIAL_UNIFORMS_SIZE),
                },
                count: None,
            }],
            label: USE_LABELS.then_some("pbr_uniform_bind_group_layout"),
        });
    let morph_bind_group_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                storage_entry(MORPH_BUFFER_BINDING),
                storage_entry(MORPH_INDEX_BINDING),
                storage_entry(MORPH_UV_BINDING),
            ],
            label: USE_LABELS.then_some("pbr_morph_bind_group_layout"),
        });

    let environment_bind_group = {
        let mut sampler_cache = base_renderer.sampler_cache();
        let clamp_sampler_index =
            sampler_cache.get_sampler_index(device, &SamplerDescriptor::clamp_linear());
        let mip_sampler_index =
            sampler_cache.get_sampler_index(device, &SamplerDescriptor::mip_linear());
        let volume_sampler_index =
            sampler_cache.get_sampler_index(device, &SamplerDescriptor::volume_repeat());

        let texture_views = [
            (IRRADIANCE_UNIT, &textures.irradiance),
            (PREFILTER_UNIT, &textures.prefiltered),
            (BRDF_LUT_UNIT, &textures.brdf_lut),
            (ALBEDO_VOLUME_UNIT, &textures.albedo_volume),
            (NORMAL_VOLUME_UNIT, &textures.normal_volume),
        ];
        let samplers = [
            (CLAMP_SAMPLER_BINDING, clamp_sampler_index),
            (MIP_SAMPLER_BINDING, mip_sampler_index),
            (VOLUME_SAMPLER_BINDING, volume_sampler_index),
        ];

        let entries: Vec<wgpu::BindGroupEntry> = texture_views
            .iter()
            .map(|(binding, texture)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            })
            .chain(samplers.iter().map(|(binding, sampler_index)| {
                wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::Sampler(
                        sampler_cache.get_sampler_by_index(*sampler_index),
                    ),
                }
            }))
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &environment_bind_group_layout,
            entries: &entries,
            label: USE_LABELS.then_some("pbr_environment_bind_group"),
        })
    };

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: USE_LABELS.then_some("Pbr Material Uniform Buffer"),
        size: MATERIAL_UNIFORMS_SIZE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &uniform_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: MATERIAL_UNIFORMS_BINDING,
            resource: uniform_buffer.as_entire_binding(),
        }],
        label: USE_LABELS.then_some("pbr_uniform_bind_group"),
    });
    let morph_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &morph_bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: MORPH_BUFFER_BINDING,
                resource: morph.morph_buffer().src().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: MORPH_INDEX_BINDING,
                resource: morph.index_buffer().src().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: MORPH_UV_BINDING,
                resource: morph.uv_buffer().src().as_entire_binding(),
            },
        ],
        label: USE_LABELS.then_some("pbr_morph_bind_group"),
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: USE_LABELS.then_some("Owl Pbr Shader"),
        source: wgpu::ShaderSource::Wgsl(PBR_SHADER_SOURCE.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: USE_LABELS.then_some("Owl Pbr Pipeline Layout"),
        bind_group_layouts: &[
            &environment_bind_group_layout,
            &uniform_bind_group_layout,
            &morph_bind_group_layout,
        ],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: USE_LABELS.then_some("Owl Pbr Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: config.output_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });

    let mut writer = GpuUniformWriter::new(&base_renderer.queue, &uniform_buffer);
    writer.set_uniform(
        "u_morphTargetCount",
        UniformValue::UInt(morph.pose_count() as u32),
    );
    writer.set_uniform("u_vertexCount", UniformValue::UInt(morph.vertex_count() as u32));
    writer.set_uniform(
        "u_normalOffset",
        UniformValue::UInt(morph.normal_block_offset() as u32),
    );
    // the gl backend can't query array layer counts in the shader
    writer.set_uniform(
        "u_volumeLayerCount",
        UniformValue::UInt(textures.albedo_volume.layer_count()),
    );

    let BakedTextures {
        environment,
        irradiance,
        prefiltered,
        brdf_lut,
        albedo_volume,
        normal_volume,
    } = textures;

    PbrResources {
        environment,
        irradiance,
        prefiltered,
        brdf_lut,
        albedo_volume,
        normal_volume,
        morph,
        uniform_buffer,
        pipeline,
        environment_bind_group,
        uniform_bind_group,
        morph_bind_group,
    }
}

impl Material for PbrMaterial {
    fn shader_identifier(&self) -> &'static str {
        Self::SHADER_IDENTIFIER
    }

    fn is_ready(&self) -> bool {
        self.resources.is_some()
    }

    fn init(
        &mut self,
        base_renderer: &BaseRenderer,
        assets: &dyn AssetSource,
    ) -> Result<(), InitError> {
        // a failed re-init must not leave the old resources half replaced
        self.resources = None;
        let resources = self.bake(base_renderer, assets)?;

        let mut writer = Self::writer(&resources, base_renderer);
        self.params.push_all(&mut writer);
        writer.set_uniform("u_blend", UniformValue::Float(self.blend.blend_factor()));

        self.resources = Some(resources);
        log::info!("{} material ready", Self::SHADER_IDENTIFIER);
        Ok(())
    }

    fn update(
        &mut self,
        base_renderer: &BaseRenderer,
        frame: &FrameInput,
    ) -> Result<(), MaterialError> {
        let Some(resources) = &self.resources else {
            log::warn!("{} material updated before init", Self::SHADER_IDENTIFIER);
            return Err(MaterialError::NotReady(Self::SHADER_IDENTIFIER));
        };

        self.blend.advance(frame.delta);

        let mut writer = Self::writer(resources, base_renderer);
        writer.set_uniform("u_M", UniformValue::Mat4(frame.model));
        writer.set_uniform("u_MVP", UniformValue::Mat4(frame.mvp()));
        writer.set_uniform("u_N", UniformValue::Mat4(frame.normal_matrix()));
        writer.set_uniform("u_camPos", UniformValue::Vec3(frame.camera_position));
        writer.set_uniform("u_blend", UniformValue::Float(self.blend.blend_factor()));
        Ok(())
    }

    fn handle_input(&mut self, base_renderer: &BaseRenderer, input: MaterialInput) {
        if let MaterialInput::Paused(paused) = input {
            self.blend.set_paused(paused);
            return;
        }
        match &self.resources {
            Some(resources) => {
                let mut writer = Self::writer(resources, base_renderer);
                self.params.apply(input, &mut writer);
            }
            None => {
                self.params.apply(input, &mut DetachedSink);
            }
        }
    }

    fn render<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) -> Result<(), MaterialError> {
        let resources = self
            .resources
            .as_ref()
            .ok_or(MaterialError::NotReady(Self::SHADER_IDENTIFIER))?;
        let vertex_count = self.draw_vertex_count()?;

        rpass.set_pipeline(&resources.pipeline);
        rpass.set_bind_group(ENVIRONMENT_BIND_GROUP, &resources.environment_bind_group, &[]);
        rpass.set_bind_group(
            MATERIAL_UNIFORMS_BIND_GROUP,
            &resources.uniform_bind_group,
            &[],
        );
        rpass.set_bind_group(MORPH_BIND_GROUP, &resources.morph_bind_group, &[]);
        rpass.draw(0..vertex_count, 0..1);
        Ok(())
    }

    fn debug_textures(&self) -> Vec<(&'static str, &Texture)> {
        let Some(resources) = &self.resources else {
            return vec![];
        };
        vec![
            ("environment", &resources.environment),
            ("irradiance", &resources.irradiance),
            ("prefiltered", &resources.prefiltered),
            ("brdf_lut", &resources.brdf_lut),
            ("albedo_volume", &resources.albedo_volume),
            ("normal_volume", &resources.normal_volume),
        ]
    }
}
