use std::fmt;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("failed to load {what}")]
    ResourceLoad {
        what: String,
        #[source]
        source: BoxedError,
    },
    #[error("gpu validation error: {0}")]
    Gpu(String),
    #[error("gpu ran out of memory: {0}")]
    OutOfMemory(String),
    #[error(
        "morph pose {pose} does not match pose 0: {found_vertices} vertices / {found_indices} indices, expected {expected_vertices} / {expected_indices}"
    )]
    TopologyMismatch {
        pose: usize,
        expected_vertices: usize,
        found_vertices: usize,
        expected_indices: usize,
        found_indices: usize,
    },
    #[error("normal volume resolution {requested} does not match the albedo volume ({albedo})")]
    VolumeResolutionMismatch { albedo: u32, requested: u32 },
    #[error("a morph target set needs at least one pose")]
    EmptyMorphSet,
}

impl BakeError {
    pub fn resource_load(what: impl Into<String>, err: anyhow::Error) -> Self {
        Self::ResourceLoad {
            what: what.into(),
            source: err.into(),
        }
    }
}

/// The ordered steps of [`crate::pbr_material::PbrMaterial::init`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InitStep {
    CompileBakeShaders,
    CaptureMatrices,
    LoadSphereMap,
    BakeEnvironment,
    ConvolveIrradiance,
    PrefilterSpecular,
    IntegrateBrdf,
    BakeAlbedoVolume,
    BakeNormalVolume,
    BuildMorphBuffer,
    BindUniforms,
}

impl InitStep {
    pub const ALL: [InitStep; 11] = [
        InitStep::CompileBakeShaders,
        InitStep::CaptureMatrices,
        InitStep::LoadSphereMap,
        InitStep::BakeEnvironment,
        InitStep::ConvolveIrradiance,
        InitStep::PrefilterSpecular,
        InitStep::IntegrateBrdf,
        InitStep::BakeAlbedoVolume,
        InitStep::BakeNormalVolume,
        InitStep::BuildMorphBuffer,
        InitStep::BindUniforms,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InitStep::CompileBakeShaders => "compile bake shaders",
            InitStep::CaptureMatrices => "capture matrices",
            InitStep::LoadSphereMap => "load sphere map",
            InitStep::BakeEnvironment => "bake environment cubemap",
            InitStep::ConvolveIrradiance => "convolve irradiance",
            InitStep::PrefilterSpecular => "prefilter specular",
            InitStep::IntegrateBrdf => "integrate brdf",
            InitStep::BakeAlbedoVolume => "bake albedo volume",
            InitStep::BakeNormalVolume => "bake normal volume",
            InitStep::BuildMorphBuffer => "build morph buffer",
            InitStep::BindUniforms => "bind uniforms",
        }
    }
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("material init failed at step '{step}'")]
pub struct InitError {
    pub step: InitStep,
    #[source]
    pub source: BakeError,
}

#[derive(Debug, thiserror::Error)]
pub enum MaterialError {
    #[error("{0} material was used before init completed")]
    NotReady(&'static str),
    #[error("{index_count} indices at tessellation factor {tess_factor} exceed the u32 vertex range")]
    DrawTooLarge { index_count: usize, tess_factor: u32 },
}
