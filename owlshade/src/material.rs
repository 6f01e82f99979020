use crate::config::PbrConfig;
use crate::errors::{InitError, MaterialError};
use crate::file_loader::AssetSource;
use crate::pbr_material::{PbrMaterial, PbrParams};
use crate::renderer::BaseRenderer;
use crate::texture::Texture;

use std::time::Duration;

use glam::f32::{Mat4, Vec3};

/// Per frame transforms and elapsed time, passed in by whoever owns the camera.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameInput {
    pub delta: Duration,
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
}

impl FrameInput {
    pub fn mvp(&self) -> Mat4 {
        self.projection * self.view * self.model
    }

    pub fn normal_matrix(&self) -> Mat4 {
        self.model.inverse().transpose()
    }
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            delta: Duration::ZERO,
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TessType {
    #[default]
    Flat,
    Phong,
}

impl TessType {
    pub fn shader_value(self) -> i32 {
        match self {
            TessType::Flat => 0,
            TessType::Phong => 1,
        }
    }
}

/// One variant per material control a ui can expose.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MaterialInput {
    Metallic(f32),
    Roughness(f32),
    Albedo(Vec3),
    Ao(f32),
    Exposure(f32),
    BaseSpec(f32),
    NormalStrength(f32),
    /// Requested level; the material stores and pushes `level - 1`.
    TessLevelInner(i32),
    /// Requested level; the material stores and pushes `level - 1`.
    TessLevelOuter(i32),
    TessType(TessType),
    /// Percent, pushed as a 0..1 factor.
    PhongStrength(i32),
    TessMaskCap(f32),
    EyeDisp(f32),
    EyeScale(f32),
    EyeRotation(f32),
    EyeWarp(f32),
    EyeExponent(f32),
    EyeThickness(f32),
    EyeGap(f32),
    EyeFuzz(f32),
    EyeMaskCap(f32),
    EyeTranslateX(f32),
    EyeTranslateY(f32),
    EyeTranslateZ(f32),
    Paused(bool),
}

pub trait Material {
    /// Names the shader program this material draws with.
    fn shader_identifier(&self) -> &'static str;

    fn is_ready(&self) -> bool;

    fn init(&mut self, base_renderer: &BaseRenderer, assets: &dyn AssetSource)
        -> Result<(), InitError>;

    fn update(
        &mut self,
        base_renderer: &BaseRenderer,
        frame: &FrameInput,
    ) -> Result<(), MaterialError>;

    fn handle_input(&mut self, base_renderer: &BaseRenderer, input: MaterialInput);

    fn render<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) -> Result<(), MaterialError>;

    /// Baked textures worth looking at, by name.
    fn debug_textures(&self) -> Vec<(&'static str, &Texture)> {
        vec![]
    }
}

/// Owns every material and tracks which one is drawn.
#[derive(Default)]
pub struct MaterialRegistry {
    materials: Vec<Box<dyn Material>>,
    active: usize,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two reference pbr materials: a red metal and a rougher blue dielectric.
    pub fn demo_scene(config: &PbrConfig) -> Self {
        let mut registry = Self::new();
        registry.push(Box::new(PbrMaterial::new(
            config.clone(),
            PbrParams {
                albedo: Vec3::new(0.5, 0.0, 0.0),
                ao: 1.0,
                exposure: 1.0,
                roughness: 0.5,
                metallic: 1.0,
                ..Default::default()
            },
        )));
        registry.push(Box::new(PbrMaterial::new(
            config.clone(),
            PbrParams {
                albedo: Vec3::new(0.1, 0.2, 0.5),
                ao: 0.5,
                exposure: 1.0,
                roughness: 0.4,
                metallic: 0.2,
                ..Default::default()
            },
        )));
        registry
    }

    pub fn push(&mut self, material: Box<dyn Material>) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&dyn Material> {
        self.materials.get(self.active).map(|material| material.as_ref())
    }

    pub fn active_mut(&mut self) -> Option<&mut (dyn Material + 'static)> {
        self.materials
            .get_mut(self.active)
            .map(|material| material.as_mut())
    }

    pub fn get(&self, index: usize) -> Option<&dyn Material> {
        self.materials.get(index).map(|material| material.as_ref())
    }

    /// Selects the next material, wrapping back to the first.
    pub fn next_material(&mut self) -> usize {
        if !self.materials.is_empty() {
            self.active = (self.active + 1) % self.materials.len();
        }
        self.active
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.materials.len() {
            return false;
        }
        self.active = index;
        true
    }

    /// Initialises every material, stopping at the first failure.
    pub fn init_all(
        &mut self,
        base_renderer: &BaseRenderer,
        assets: &dyn AssetSource,
    ) -> Result<(), InitError> {
        for (index, material) in self.materials.iter_mut().enumerate() {
            log::info!(
                "Initializing material {index} ({})",
                material.shader_identifier()
            );
            material.init(base_renderer, assets)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Material> {
        self.materials.iter().map(|material| material.as_ref())
    }
}
