use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use glam::f32::{Mat4, Vec3};
use image::{ImageBuffer, Rgb, Rgba};
use owlshade::{
    brdf_lut::BrdfLutTexels,
    capture::CubeFace,
    config::PbrConfig,
    file_loader::FileAssetSource,
    material::{FrameInput, Material, MaterialRegistry},
    render_target::OffscreenTarget,
    renderer::BaseRenderer,
    sampling::{integrate_brdf, lut_coordinate},
    texture::{decode_f16_texels, mip_byte_range, Texture},
};

const PREVIEW_RESOLUTION: u32 = 512;
const FRAME_DELTA: Duration = Duration::from_millis(40);
const VERIFY_TEXEL_STEP: u32 = 32;

pub struct BakeArgs {
    pub panorama: PathBuf,
    pub pose_template: String,
    pub asset_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub dump_folder: Option<PathBuf>,
    pub preview: Option<PathBuf>,
    pub frames: Option<u32>,
    pub verify: bool,
}

pub fn run(args: BakeArgs) {
    if let Err(err) = run_internal(args) {
        log::error!("Error: {err:?}\n{}", err.backtrace());
    }
}

fn run_internal(args: BakeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => PbrConfig::from_json_file(path)?,
        None => PbrConfig::default(),
    };
    config.validate()?;

    let assets = FileAssetSource::new(
        args.asset_root.clone().unwrap_or_else(|| PathBuf::from(".")),
        &args.panorama,
        &args.pose_template,
    )?;

    let base_renderer = owlshade::block_on(BaseRenderer::offscreen(wgpu::Backends::PRIMARY))?;

    let mut registry = MaterialRegistry::demo_scene(&config);
    registry.init_all(&base_renderer, &assets)?;
    log::info!("Initialized {} materials", registry.len());

    let material = registry
        .active_mut()
        .ok_or_else(|| anyhow!("The demo scene has no materials"))?;

    if let Some(dump_folder) = &args.dump_folder {
        dump_textures(&base_renderer, material, dump_folder)?;
    }

    if args.verify {
        verify_brdf_lut(&base_renderer, material, config.brdf_sample_count)?;
    }

    if let Some(preview_path) = &args.preview {
        render_preview(
            &base_renderer,
            material,
            &config,
            args.frames.unwrap_or(1),
            preview_path,
        )?;
    }

    Ok(())
}

/// 1 - e^(-c) then gamma 2.2, the same curve the shading pass ends with.
fn tone_map(value: f32) -> u8 {
    let mapped = (1.0 - (-value.max(0.0)).exp()).powf(1.0 / 2.2);
    (mapped * 255.0).round().clamp(0.0, 255.0) as u8
}

fn unit_to_byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

fn dump_textures(
    base_renderer: &BaseRenderer,
    material: &dyn Material,
    dump_folder: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dump_folder)?;

    for (name, texture) in material.debug_textures() {
        let layers = texture.to_bytes(base_renderer)?;
        let range = mip_byte_range(texture, 0)?;
        let (width, height) = (texture.size.width, texture.size.height);

        match texture.format() {
            wgpu::TextureFormat::Rg16Float => {
                let texels = decode_f16_texels(&layers[0][range]);
                let img = ImageBuffer::<Rgb<u8>, _>::from_fn(width, height, |x, y| {
                    let index = ((y * width + x) * 2) as usize;
                    Rgb([unit_to_byte(texels[index]), unit_to_byte(texels[index + 1]), 0])
                });
                save(img, &dump_folder.join(format!("{name}.png")))?;
            }
            wgpu::TextureFormat::Rgba16Float => {
                let file_names: Vec<String> = if layers.len() == 6 {
                    CubeFace::ALL
                        .iter()
                        .map(|face| format!("{name}_{}.png", face.name()))
                        .collect()
                } else {
                    (0..layers.len())
                        .map(|layer| format!("{name}_{layer}.png"))
                        .collect()
                };

                // volumes only get their middle slice
                let dumped_layers: Vec<usize> = if layers.len() == 6 {
                    (0..6).collect()
                } else {
                    vec![layers.len() / 2]
                };

                for layer in dumped_layers {
                    let texels = decode_f16_texels(&layers[layer][range.clone()]);
                    let img = ImageBuffer::<Rgb<u8>, _>::from_fn(width, height, |x, y| {
                        let index = ((y * width + x) * 4) as usize;
                        Rgb([
                            tone_map(texels[index]),
                            tone_map(texels[index + 1]),
                            tone_map(texels[index + 2]),
                        ])
                    });
                    save(img, &dump_folder.join(&file_names[layer]))?;
                }
            }
            other => {
                log::warn!("Not dumping {name}: no png conversion for {other:?}");
            }
        }
    }

    Ok(())
}

fn save<P>(img: ImageBuffer<P, Vec<u8>>, path: &Path) -> Result<()>
where
    P: image::Pixel<Subpixel = u8> + image::PixelWithColorType,
{
    img.save(path)
        .map_err(|err| anyhow!("{err} ({})", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn verify_brdf_lut(
    base_renderer: &BaseRenderer,
    material: &dyn Material,
    sample_count: u32,
) -> Result<()> {
    let (_, lut) = material
        .debug_textures()
        .into_iter()
        .find(|(name, _)| *name == "brdf_lut")
        .ok_or_else(|| anyhow!("The active material has no brdf lut"))?;
    let texels = BrdfLutTexels::read(base_renderer, lut)?;
    let resolution = texels.resolution();

    let mut max_error = 0.0f32;
    let mut worst_texel = (0, 0);
    for y in (0..resolution).step_by(VERIFY_TEXEL_STEP as usize) {
        for x in (0..resolution).step_by(VERIFY_TEXEL_STEP as usize) {
            let expected = integrate_brdf(
                lut_coordinate(x, resolution),
                lut_coordinate(y, resolution),
                sample_count,
            );
            let baked = texels
                .get(x, y)
                .ok_or_else(|| anyhow!("Brdf lut read back is missing texel ({x}, {y})"))?;
            let error = (baked - expected).abs().max_element();
            if error > max_error {
                max_error = error;
                worst_texel = (x, y);
            }
        }
    }

    log::info!(
        "Brdf lut max error against the cpu reference: {max_error} at texel {worst_texel:?}"
    );
    Ok(())
}

fn render_preview(
    base_renderer: &BaseRenderer,
    material: &mut dyn Material,
    config: &PbrConfig,
    frames: u32,
    preview_path: &Path,
) -> Result<()> {
    if config.output_format != wgpu::TextureFormat::Rgba8Unorm {
        bail!(
            "Previews are written from Rgba8Unorm, the material renders {:?}",
            config.output_format
        );
    }

    let camera_position = Vec3::new(0.0, 0.0, 3.0);
    let frame = FrameInput {
        delta: FRAME_DELTA,
        model: Mat4::IDENTITY,
        view: Mat4::look_at_rh(camera_position, Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 100.0),
        camera_position,
    };
    for _ in 0..frames.max(1) {
        material.update(base_renderer, &frame)?;
    }

    let target = OffscreenTarget::new(base_renderer, PREVIEW_RESOLUTION, true);
    let color = Texture::create_render_target(
        base_renderer,
        (PREVIEW_RESOLUTION, PREVIEW_RESOLUTION),
        config.output_format,
        "preview",
    );

    let mut encoder = base_renderer
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Preview Encoder"),
        });
    {
        let mut rpass = target.begin_pass(&mut encoder, &color.view, "Preview");
        material.render(&mut rpass)?;
    }
    base_renderer.queue.submit(Some(encoder.finish()));

    let mut layers = color.to_bytes(base_renderer)?;
    let img = ImageBuffer::<Rgba<u8>, _>::from_raw(
        PREVIEW_RESOLUTION,
        PREVIEW_RESOLUTION,
        layers.remove(0),
    )
    .ok_or_else(|| anyhow!("Preview read back had the wrong size"))?;
    save(img, preview_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_map_matches_shading_curve() {
        assert_eq!(tone_map(0.0), 0);
        assert_eq!(tone_map(-3.0), 0);
        assert_eq!(tone_map(100.0), 255);
        // 1 - e^-1 = 0.632, ^(1/2.2) = 0.812
        assert_eq!(tone_map(1.0), 207);
    }
}
