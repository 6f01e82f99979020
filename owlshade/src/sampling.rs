//! CPU versions of the low discrepancy sampling and split-sum integration that the bake
//! shaders run. Used to check baked textures and in tests.

use std::f32::consts::PI;

use glam::f32::{Vec2, Vec3};

/// Van der Corput radical inverse in base 2, by bit reversal.
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10 // / 0x100000000
}

pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// Half vector around `n` distributed like the GGX lobe of the given perceptual
/// roughness.
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);

    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

/// Smith-Schlick geometry term with the image based lighting remapping `k = a / 2`.
pub fn geometry_schlick_ggx_ibl(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

pub fn geometry_smith_ibl(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx_ibl(n_dot_v, roughness) * geometry_schlick_ggx_ibl(n_dot_l, roughness)
}

/// Split-sum scale and bias for one (N·V, roughness) pair.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let n_dot_v = n_dot_v.max(1e-4);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;

    let mut scale = 0.0;
    let mut bias = 0.0;

    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        if n_dot_l > 0.0 {
            let g = geometry_smith_ibl(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(1e-4);
            let fc = (1.0 - v_dot_h).powi(5);

            scale += (1.0 - fc) * g_vis;
            bias += fc * g_vis;
        }
    }

    Vec2::new(scale, bias) / sample_count as f32
}

/// Texel center of a lut of `resolution` texels along one axis.
pub fn lut_coordinate(texel: u32, resolution: u32) -> f32 {
    (texel as f32 + 0.5) / resolution as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn radical_inverse_mirrors_bits() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert_eq!(radical_inverse_vdc(1), 0.5);
        assert_eq!(radical_inverse_vdc(2), 0.25);
        assert_eq!(radical_inverse_vdc(3), 0.75);
        assert_eq!(radical_inverse_vdc(4), 0.125);
        assert!(radical_inverse_vdc(u32::MAX) < 1.0 + f32::EPSILON);
    }

    #[test]
    fn hammersley_points_fill_the_square() {
        let n = 16;
        let points: Vec<Vec2> = (0..n).map(|i| hammersley(i, n)).collect();
        for (i, point) in points.iter().enumerate() {
            assert_eq!(point.x, i as f32 / n as f32);
            assert!((0.0..1.0).contains(&point.y));
        }
        // one point per row of a 4x4 grid stratification
        for row in 0..4 {
            let lo = row as f32 * 0.25;
            let count = points
                .iter()
                .filter(|point| point.y >= lo && point.y < lo + 0.25)
                .count();
            assert_eq!(count, 4);
        }
    }

    #[test]
    fn smooth_ggx_samples_are_the_normal() {
        for n in [Vec3::Z, Vec3::X, Vec3::new(0.3, -0.4, 0.5).normalize()] {
            for i in 0..8 {
                let h = importance_sample_ggx(hammersley(i, 8), n, 0.0);
                assert_abs_diff_eq!(h.dot(n), 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn rough_ggx_samples_stay_in_the_hemisphere() {
        let n = Vec3::new(-0.2, 0.9, 0.1).normalize();
        for i in 0..64 {
            let h = importance_sample_ggx(hammersley(i, 64), n, 1.0);
            assert_abs_diff_eq!(h.length(), 1.0, epsilon = 1e-5);
            assert!(h.dot(n) >= -1e-6);
        }
    }

    #[test]
    fn mirror_at_normal_incidence() {
        let scale_bias = integrate_brdf(1.0, 0.0, 256);
        assert_abs_diff_eq!(scale_bias.x, 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(scale_bias.y, 0.0, epsilon = 0.01);
    }

    #[test]
    fn rough_surfaces_lose_energy() {
        let smooth = integrate_brdf(0.5, 0.1, 512);
        let rough = integrate_brdf(0.5, 0.9, 512);
        assert!(rough.x + rough.y < smooth.x + smooth.y);
    }

    #[test]
    fn grazing_angles_raise_the_bias() {
        let head_on = integrate_brdf(1.0, 0.3, 512);
        let grazing = integrate_brdf(0.05, 0.3, 512);
        assert!(grazing.y > head_on.y);
    }
}
