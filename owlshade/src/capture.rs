use glam::f32::{Mat4, Vec3};

pub const CAPTURE_NEAR_PLANE_DISTANCE: f32 = 0.1;
pub const CAPTURE_FAR_PLANE_DISTANCE: f32 = 10.0;

/// Cube faces in the layer order wgpu (and every other api) expects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn forward(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    // never parallel to forward, so look_at stays well defined at the poles
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "pos_x",
            CubeFace::NegativeX => "neg_x",
            CubeFace::PositiveY => "pos_y",
            CubeFace::NegativeY => "neg_y",
            CubeFace::PositiveZ => "pos_z",
            CubeFace::NegativeZ => "neg_z",
        }
    }
}

#[repr(C)]
#[derive(Default, Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CaptureCameraUniform {
    view_proj: [[f32; 4]; 4],
}

impl From<Mat4> for CaptureCameraUniform {
    fn from(view_proj: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
        }
    }
}

/// The six views and the shared projection used to render a cube map from the origin.
#[derive(Copy, Clone, Debug)]
pub struct CaptureFrustumSet {
    views: [Mat4; 6],
    projection: Mat4,
}

impl CaptureFrustumSet {
    pub fn new() -> Self {
        let views = CubeFace::ALL.map(|face| Mat4::look_at_rh(Vec3::ZERO, face.forward(), face.up()));

        // wgpu puts texel row 0 at the top of clip space, the cube sampling convention puts
        // it at t = 0. flipping y lines the two up.
        let projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::perspective_rh(
                90.0_f32.to_radians(),
                1.0,
                CAPTURE_NEAR_PLANE_DISTANCE,
                CAPTURE_FAR_PLANE_DISTANCE,
            );

        Self { views, projection }
    }

    pub fn view(&self, face: CubeFace) -> Mat4 {
        self.views[face.layer() as usize]
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_proj(&self, face: CubeFace) -> Mat4 {
        self.projection * self.view(face)
    }

    pub fn uniform(&self, face: CubeFace) -> CaptureCameraUniform {
        self.view_proj(face).into()
    }
}

impl Default for CaptureFrustumSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use glam::{Vec2, Vec4Swizzles};

    /// Face selection and face coordinates from the cube map sampling table shared by
    /// Vulkan, D3D, Metal and OpenGL.
    fn reference_face_uv(dir: Vec3) -> (CubeFace, Vec2) {
        let abs = dir.abs();
        let (face, sc, tc, ma) = if abs.x >= abs.y && abs.x >= abs.z {
            if dir.x > 0.0 {
                (CubeFace::PositiveX, -dir.z, -dir.y, abs.x)
            } else {
                (CubeFace::NegativeX, dir.z, -dir.y, abs.x)
            }
        } else if abs.y >= abs.z {
            if dir.y > 0.0 {
                (CubeFace::PositiveY, dir.x, dir.z, abs.y)
            } else {
                (CubeFace::NegativeY, dir.x, -dir.z, abs.y)
            }
        } else if dir.z > 0.0 {
            (CubeFace::PositiveZ, dir.x, -dir.y, abs.z)
        } else {
            (CubeFace::NegativeZ, -dir.x, -dir.y, abs.z)
        };
        (face, Vec2::new((sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5))
    }

    /// Where a direction lands in the render target when drawn through a face's capture
    /// camera, with row 0 at the top like wgpu.
    fn rendered_uv(frusta: &CaptureFrustumSet, face: CubeFace, dir: Vec3) -> Vec2 {
        let clip = frusta.view_proj(face) * dir.extend(1.0);
        assert!(clip.w > 0.0, "{dir:?} is behind the {face:?} camera");
        let ndc = clip.xy() / clip.w;
        Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5)
    }

    #[test]
    fn faces_land_where_the_sampler_looks() {
        let frusta = CaptureFrustumSet::new();
        let directions = [
            Vec3::new(1.0, 0.3, -0.2),
            Vec3::new(-1.0, -0.4, 0.6),
            Vec3::new(0.25, 1.0, 0.5),
            Vec3::new(-0.7, -1.0, -0.1),
            Vec3::new(0.1, -0.45, 1.0),
            Vec3::new(0.6, 0.2, -1.0),
            Vec3::new(0.9, 0.8, 0.95),
        ];
        for dir in directions {
            let dir = dir.normalize();
            let (face, expected_uv) = reference_face_uv(dir);
            let uv = rendered_uv(&frusta, face, dir);
            assert_abs_diff_eq!(uv.x, expected_uv.x, epsilon = 1e-5);
            assert_abs_diff_eq!(uv.y, expected_uv.y, epsilon = 1e-5);
        }
    }

    #[test]
    fn face_centers_hit_the_middle_of_their_face() {
        let frusta = CaptureFrustumSet::new();
        for face in CubeFace::ALL {
            let (reference_face, _) = reference_face_uv(face.forward());
            assert_eq!(reference_face, face);
            let uv = rendered_uv(&frusta, face, face.forward());
            assert_abs_diff_eq!(uv.x, 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(uv.y, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn views_cover_the_sphere_once() {
        let mut covered = Vec3::ZERO;
        for face in CubeFace::ALL {
            assert_abs_diff_eq!(face.forward().dot(face.up()), 0.0);
            covered += face.forward().abs();
            assert_eq!(CubeFace::ALL[face.layer() as usize], face);
        }
        assert_eq!(covered, Vec3::splat(2.0));
    }
}
