use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the pbr material's bakes and animation. Missing fields take their
/// default, so a config file only needs to list what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrConfig {
    pub environment_resolution: u32,
    pub volume_resolution: u32,
    pub prefilter_sample_count: u32,
    pub brdf_sample_count: u32,
    pub irradiance_sample_delta: f32,
    pub morph_target_count: usize,
    pub morph_fps: f64,
    /// Color format the shading pass renders into.
    #[serde(skip)]
    pub output_format: wgpu::TextureFormat,
}

impl Default for PbrConfig {
    fn default() -> Self {
        Self {
            environment_resolution: 512,
            volume_resolution: 128,
            prefilter_sample_count: 1024,
            brdf_sample_count: 1024,
            irradiance_sample_delta: 0.025,
            morph_target_count: 4,
            morph_fps: 25.0,
            output_format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl PbrConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("{err} ({})", path.display()))?;
        Self::from_json_str(&json).map_err(|err| anyhow!("{err} ({})", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment_resolution == 0 || self.volume_resolution == 0 {
            bail!(
                "Bake resolutions must be positive (environment {}, volume {})",
                self.environment_resolution,
                self.volume_resolution
            );
        }
        if self.prefilter_sample_count == 0 || self.brdf_sample_count == 0 {
            bail!("Sample counts must be positive");
        }
        if self.irradiance_sample_delta.is_nan() || self.irradiance_sample_delta <= 0.0 {
            bail!(
                "Irradiance sample delta must be positive, got {}",
                self.irradiance_sample_delta
            );
        }
        if self.morph_target_count == 0 {
            bail!("At least one morph target is needed");
        }
        if !self.morph_fps.is_finite() || self.morph_fps < 0.0 {
            bail!("Morph fps must be a finite, non-negative number, got {}", self.morph_fps);
        }
        Ok(())
    }
}
