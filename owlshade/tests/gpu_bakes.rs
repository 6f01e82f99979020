use owlshade::brdf_lut::{self, BrdfLutTexels, BRDF_LUT_RESOLUTION};
use owlshade::capture::{CaptureFrustumSet, CubeFace};
use owlshade::config::PbrConfig;
use owlshade::cubemap::{
    prefilter_roughness, CubemapBaker, IRRADIANCE_RESOLUTION, PREFILTER_MIP_COUNT,
    PREFILTER_RESOLUTION,
};
use owlshade::errors::{BakeError, MaterialError};
use owlshade::file_loader::{HdrPanorama, InMemoryAssets};
use owlshade::material::{FrameInput, Material, MaterialInput};
use owlshade::mesh::BasicMesh;
use owlshade::pbr_material::{PbrMaterial, PbrParams};
use owlshade::render_target::OffscreenTarget;
use owlshade::renderer::{BakePipelines, BaseRenderer};
use owlshade::sampling::{integrate_brdf, lut_coordinate};
use owlshade::texture::{decode_f16_texels, mip_byte_range, Texture};
use owlshade::volume;

use std::f32::consts::PI;
use std::time::Duration;

use glam::f32::{Mat4, Vec3};

/// Same backends as the cli. Gl can't copy cube faces back to a buffer, so read back
/// checks would fail there for reasons unrelated to the bakes.
fn renderer() -> Option<BaseRenderer> {
    let _ = env_logger::builder().is_test(true).try_init();
    match owlshade::block_on(BaseRenderer::offscreen(wgpu::Backends::PRIMARY)) {
        Ok(renderer) if renderer.adapter.get_info().backend == wgpu::Backend::Gl => {
            log::warn!("Skipping gpu test: no texture read back on the gl backend");
            None
        }
        Ok(renderer) => Some(renderer),
        Err(err) => {
            log::warn!("Skipping gpu test: {err}");
            None
        }
    }
}

fn constant_panorama(width: u32, height: u32, value: f32) -> HdrPanorama {
    HdrPanorama::new(
        width,
        height,
        vec![[value, value, value, 1.0]; (width * height) as usize],
    )
    .unwrap()
}

fn rgb_texels(bytes: &[u8]) -> Vec<Vec3> {
    decode_f16_texels(bytes)
        .chunks_exact(4)
        .map(|texel| Vec3::new(texel[0], texel[1], texel[2]))
        .collect()
}

/// Panorama whose color is the direction it was sampled from, remapped to 0..1.
fn direction_panorama(width: u32, height: u32) -> HdrPanorama {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            let longitude = (u - 0.5) * 2.0 * PI;
            let latitude = (0.5 - v) * PI;
            let direction = Vec3::new(
                longitude.cos() * latitude.cos(),
                latitude.sin(),
                longitude.sin() * latitude.cos(),
            );
            let color = direction * 0.5 + 0.5;
            pixels.push([color.x, color.y, color.z, 1.0]);
        }
    }
    HdrPanorama::new(width, height, pixels).unwrap()
}

fn checker_panorama(width: u32, height: u32, cells: u32) -> HdrPanorama {
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let cell = (x * cells / width) + (y * cells / height);
            let value = if cell % 2 == 0 { 4.0 } else { 0.0 };
            [value, value, value, 1.0]
        })
        .collect();
    HdrPanorama::new(width, height, pixels).unwrap()
}

fn small_config() -> PbrConfig {
    PbrConfig {
        environment_resolution: 16,
        volume_resolution: 8,
        prefilter_sample_count: 16,
        brdf_sample_count: 16,
        irradiance_sample_delta: 0.2,
        ..Default::default()
    }
}

fn cube_poses(count: usize) -> Vec<BasicMesh> {
    (0..count)
        .map(|pose| {
            let mut mesh = BasicMesh::unit_cube();
            let scale = 1.0 + pose as f32 * 0.1;
            for position in &mut mesh.positions {
                *position *= scale;
            }
            mesh
        })
        .collect()
}

#[test]
fn environment_faces_follow_capture_order() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let baker =
        CubemapBaker::new(&base_renderer, &pipelines, CaptureFrustumSet::new()).unwrap();
    let sphere_map = Texture::from_panorama(&base_renderer, &direction_panorama(128, 64));

    let resolution = 16;
    let environment = base_renderer
        .capture_gpu_errors(|| {
            baker.environment_from_panorama(&base_renderer, &sphere_map, resolution)
        })
        .unwrap();
    let faces = environment.to_bytes(&base_renderer).unwrap();
    assert_eq!(faces.len(), 6);

    for face in CubeFace::ALL {
        let texels = decode_f16_texels(&faces[face.layer() as usize]);
        // average the four texels around the face center
        let mut center = Vec3::ZERO;
        for (x, y) in [(7, 7), (8, 7), (7, 8), (8, 8)] {
            let index = ((y * resolution + x) * 4) as usize;
            center += Vec3::new(texels[index], texels[index + 1], texels[index + 2]);
        }
        center /= 4.0;

        let expected = face.forward() * 0.5 + 0.5;
        assert!(
            (center - expected).abs().max_element() < 0.1,
            "{}: expected {expected}, got {center}",
            face.name()
        );
    }
}

#[test]
fn brdf_lut_matches_cpu_reference() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let sample_count = 64;
    let lut = base_renderer
        .capture_gpu_errors(|| brdf_lut::integrate(&base_renderer, &pipelines, sample_count))
        .unwrap();
    let texels = BrdfLutTexels::read(&base_renderer, &lut).unwrap();
    assert_eq!(texels.resolution(), BRDF_LUT_RESOLUTION);

    // smooth and head on: everything is reflected
    let corner = texels.get(BRDF_LUT_RESOLUTION - 1, 0).unwrap();
    assert!(corner.x > 0.9, "{corner}");
    assert!(corner.y < 0.05, "{corner}");

    for (x, y) in [(BRDF_LUT_RESOLUTION - 1, 0), (256, 128), (64, 400), (400, 500)] {
        let expected = integrate_brdf(
            lut_coordinate(x, BRDF_LUT_RESOLUTION),
            lut_coordinate(y, BRDF_LUT_RESOLUTION),
            sample_count,
        );
        let baked = texels.get(x, y).unwrap();
        assert!(
            (baked - expected).abs().max_element() < 0.02,
            "texel ({x}, {y}): expected {expected}, got {baked}"
        );
    }
}

#[test]
fn prefiltered_mips_get_smoother() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let baker =
        CubemapBaker::new(&base_renderer, &pipelines, CaptureFrustumSet::new()).unwrap();
    let sphere_map = Texture::from_panorama(&base_renderer, &checker_panorama(128, 64, 8));

    let prefiltered = base_renderer
        .capture_gpu_errors(|| {
            let environment = baker.environment_from_panorama(&base_renderer, &sphere_map, 64)?;
            baker.prefilter(&base_renderer, &environment, 64)
        })
        .unwrap();
    assert_eq!(prefiltered.mip_level_count(), PREFILTER_MIP_COUNT);

    let faces = prefiltered.to_bytes(&base_renderer).unwrap();
    let variances: Vec<f32> = (0..PREFILTER_MIP_COUNT)
        .map(|mip_level| {
            let range = mip_byte_range(&prefiltered, mip_level).unwrap();
            let luminance: Vec<f32> = faces
                .iter()
                .flat_map(|face| {
                    decode_f16_texels(&face[range.clone()])
                        .chunks_exact(4)
                        .map(|texel| (texel[0] + texel[1] + texel[2]) / 3.0)
                        .collect::<Vec<_>>()
                })
                .collect();
            let mean = luminance.iter().sum::<f32>() / luminance.len() as f32;
            luminance
                .iter()
                .map(|value| (value - mean) * (value - mean))
                .sum::<f32>()
                / luminance.len() as f32
        })
        .collect();

    assert!(variances[0] > 1.0, "{variances:?}");
    for pair in variances.windows(2) {
        assert!(pair[1] <= pair[0] * 1.1 + 1e-3, "{variances:?}");
    }
    assert!(variances[PREFILTER_MIP_COUNT as usize - 1] < variances[0] * 0.5);
}

#[test]
fn smooth_prefilter_level_reproduces_environment() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let baker =
        CubemapBaker::new(&base_renderer, &pipelines, CaptureFrustumSet::new()).unwrap();
    let sphere_map = Texture::from_panorama(&base_renderer, &direction_panorama(256, 128));

    let (environment, prefiltered) = base_renderer
        .capture_gpu_errors(|| {
            let environment = baker.environment_from_panorama(
                &base_renderer,
                &sphere_map,
                PREFILTER_RESOLUTION,
            )?;
            let prefiltered = baker.prefilter(&base_renderer, &environment, 16)?;
            Ok((environment, prefiltered))
        })
        .unwrap();
    assert_eq!(prefilter_roughness(0), 0.0);

    let environment_faces = environment.to_bytes(&base_renderer).unwrap();
    let prefiltered_faces = prefiltered.to_bytes(&base_renderer).unwrap();
    let level_0 = mip_byte_range(&prefiltered, 0).unwrap();

    for face in CubeFace::ALL {
        let layer = face.layer() as usize;
        let expected = rgb_texels(&environment_faces[layer]);
        let baked = rgb_texels(&prefiltered_faces[layer][level_0.clone()]);
        assert_eq!(expected.len(), baked.len());

        let max_error = expected
            .iter()
            .zip(&baked)
            .map(|(expected, baked)| (*expected - *baked).abs().max_element())
            .fold(0.0f32, f32::max);
        assert!(max_error < 0.02, "{}: max error {max_error}", face.name());
    }
}

#[test]
fn uniform_environment_gives_uniform_irradiance() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let baker =
        CubemapBaker::new(&base_renderer, &pipelines, CaptureFrustumSet::new()).unwrap();
    let radiance = 2.0;
    let sphere_map = Texture::from_panorama(&base_renderer, &constant_panorama(64, 32, radiance));

    let irradiance = base_renderer
        .capture_gpu_errors(|| {
            let environment = baker.environment_from_panorama(&base_renderer, &sphere_map, 16)?;
            baker.convolve_irradiance(&base_renderer, &environment, 0.05)
        })
        .unwrap();
    assert_eq!(irradiance.size.width, IRRADIANCE_RESOLUTION);

    let faces = irradiance.to_bytes(&base_renderer).unwrap();
    assert_eq!(faces.len(), 6);
    for (layer, face) in faces.iter().enumerate() {
        for texel in rgb_texels(face) {
            // the cosine weighted riemann sum lands slightly under the radiance
            assert!(
                (texel - Vec3::splat(radiance)).abs().max_element() < 0.1,
                "layer {layer}: {texel}"
            );
        }
    }
}

#[test]
fn albedo_volume_varies_across_layers() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let resolution = 8;
    let albedo = base_renderer
        .capture_gpu_errors(|| volume::bake_albedo_volume(&base_renderer, &pipelines, resolution))
        .unwrap();
    assert_eq!(albedo.resolution(), resolution);

    let layers = albedo.texture().to_bytes(&base_renderer).unwrap();
    assert_eq!(layers.len(), resolution as usize);

    let first = decode_f16_texels(&layers[0]);
    let middle = decode_f16_texels(&layers[resolution as usize / 2]);
    assert!(first.iter().chain(&middle).all(|value| value.is_finite()));
    let difference: f32 = first
        .iter()
        .zip(&middle)
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert!(difference > 1.0, "layers barely differ: {difference}");
}

#[test]
fn normal_volume_follows_albedo_turbulence_gradient() {
    // slope applied per unit of turbulence gradient by the normal bake
    const BUMP_SCALE: f32 = 0.05;

    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let resolution = 8;
    let (albedo, normals) = base_renderer
        .capture_gpu_errors(|| {
            let albedo = volume::bake_albedo_volume(&base_renderer, &pipelines, resolution)?;
            let normals =
                volume::bake_normal_volume(&base_renderer, &pipelines, &albedo, resolution)?;
            Ok((albedo, normals))
        })
        .unwrap();

    let size = resolution as i32;
    let turbulence: Vec<Vec<f32>> = albedo
        .texture()
        .to_bytes(&base_renderer)
        .unwrap()
        .iter()
        .map(|layer| {
            decode_f16_texels(layer)
                .chunks_exact(4)
                .map(|texel| texel[0])
                .collect()
        })
        .collect();
    let turbulence_at = |x: i32, y: i32, z: i32| {
        let wrap = |value: i32| value.rem_euclid(size) as usize;
        turbulence[wrap(z)][wrap(y) * size as usize + wrap(x)]
    };

    let normal_layers = normals.to_bytes(&base_renderer).unwrap();
    for z in 0..size {
        let texels = decode_f16_texels(&normal_layers[z as usize]);
        for y in 0..size {
            for x in 0..size {
                let gradient = Vec3::new(
                    turbulence_at(x + 1, y, z) - turbulence_at(x - 1, y, z),
                    turbulence_at(x, y + 1, z) - turbulence_at(x, y - 1, z),
                    turbulence_at(x, y, z + 1) - turbulence_at(x, y, z - 1),
                ) * (0.5 * size as f32);
                let expected = Vec3::new(
                    -gradient.x * BUMP_SCALE,
                    -gradient.y * BUMP_SCALE,
                    1.0,
                )
                .normalize();

                let index = ((y * size + x) * 4) as usize;
                let baked = Vec3::new(texels[index], texels[index + 1], texels[index + 2]);
                assert!(
                    (baked - expected).abs().max_element() < 0.01,
                    "texel ({x}, {y}, {z}): expected {expected}, got {baked}"
                );
                assert!((baked.length() - 1.0).abs() < 0.01);
                assert!((texels[index + 3] - gradient.z * BUMP_SCALE).abs() < 0.01);
            }
        }
    }
}

#[test]
fn normal_volume_rejects_other_resolutions() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let pipelines = BakePipelines::new(&base_renderer);
    let albedo = base_renderer
        .capture_gpu_errors(|| volume::bake_albedo_volume(&base_renderer, &pipelines, 8))
        .unwrap();

    let result = volume::bake_normal_volume(&base_renderer, &pipelines, &albedo, 16);
    assert!(matches!(
        result,
        Err(BakeError::VolumeResolutionMismatch {
            albedo: 8,
            requested: 16
        })
    ));
}

#[test]
fn material_inits_and_draws_from_memory_assets() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let config = small_config();
    let assets = InMemoryAssets {
        panorama: Some(direction_panorama(32, 16)),
        poses: cube_poses(config.morph_target_count),
    };

    let mut material = PbrMaterial::new(config, PbrParams::default());
    assert!(matches!(
        material.update(&base_renderer, &FrameInput::default()),
        Err(MaterialError::NotReady(_))
    ));

    material.init(&base_renderer, &assets).unwrap();
    assert!(material.is_ready());
    assert_eq!(material.debug_textures().len(), 6);

    material.handle_input(&base_renderer, MaterialInput::TessLevelInner(3));
    assert_eq!(material.draw_vertex_count().ok(), Some(36 * 3 * 3));

    let frame = FrameInput {
        delta: Duration::from_millis(40),
        view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0),
        camera_position: Vec3::new(0.0, 0.0, 4.0),
        ..Default::default()
    };
    material.update(&base_renderer, &frame).unwrap();

    let target = OffscreenTarget::new(&base_renderer, 32, true);
    let color = Texture::create_render_target(
        &base_renderer,
        (32, 32),
        material.config().output_format,
        "preview",
    );
    base_renderer
        .capture_gpu_errors(|| {
            let mut encoder =
                base_renderer
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("preview encoder"),
                    });
            {
                let mut rpass = target.begin_pass(&mut encoder, &color.view, "preview");
                material
                    .render(&mut rpass)
                    .map_err(|err| BakeError::Gpu(err.to_string()))?;
            }
            base_renderer.queue.submit(Some(encoder.finish()));
            Ok(())
        })
        .unwrap();

    let pixels = color.to_bytes(&base_renderer).unwrap();
    // the cube covers the middle of the frame
    let center = ((16 * 32 + 16) * 4) as usize;
    assert!(pixels[0][center..center + 3].iter().any(|channel| *channel > 0));
}

#[test]
fn failed_init_reports_the_step() {
    let Some(base_renderer) = renderer() else {
        return;
    };
    let assets = InMemoryAssets {
        panorama: None,
        poses: cube_poses(4),
    };
    let mut material = PbrMaterial::new(small_config(), PbrParams::default());
    let err = material.init(&base_renderer, &assets).unwrap_err();
    assert_eq!(err.step, owlshade::errors::InitStep::LoadSphereMap);
    assert!(!material.is_ready());
}
