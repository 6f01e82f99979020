use crate::buffer::GpuBuffer;
use crate::errors::BakeError;
use crate::file_loader::AssetSource;
use crate::mesh::BasicMesh;
use crate::renderer::BaseRenderer;

use std::time::Duration;

/// Every pose's positions followed by every pose's normals, one `[f32; 4]` per vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphTargetSet {
    data: Vec<[f32; 4]>,
    pose_count: usize,
    vertex_count: usize,
    indices: Vec<u32>,
    uvs: Vec<[f32; 2]>,
}

impl MorphTargetSet {
    /// Packs the poses, rejecting any pose whose vertex count or index list differs from
    /// pose 0. Indices and uvs are shared, so they are taken from pose 0.
    pub fn pack(poses: &[BasicMesh]) -> Result<Self, BakeError> {
        let Some(first_pose) = poses.first() else {
            return Err(BakeError::EmptyMorphSet);
        };
        let vertex_count = first_pose.vertex_count();

        for (pose, mesh) in poses.iter().enumerate().skip(1) {
            if mesh.vertex_count() != vertex_count
                || mesh.normals.len() != first_pose.normals.len()
                || mesh.indices != first_pose.indices
            {
                return Err(BakeError::TopologyMismatch {
                    pose,
                    expected_vertices: vertex_count,
                    found_vertices: mesh.vertex_count(),
                    expected_indices: first_pose.indices.len(),
                    found_indices: mesh.indices.len(),
                });
            }
        }

        let mut data = Vec::with_capacity(poses.len() * vertex_count * 2);
        data.extend(
            poses
                .iter()
                .flat_map(|mesh| mesh.positions.iter().map(|position| position.extend(1.0).to_array())),
        );
        data.extend(
            poses
                .iter()
                .flat_map(|mesh| mesh.normals.iter().map(|normal| normal.extend(0.0).to_array())),
        );

        Ok(Self {
            data,
            pose_count: poses.len(),
            vertex_count,
            indices: first_pose.indices.clone(),
            uvs: first_pose.uvs.iter().map(|uv| uv.to_array()).collect(),
        })
    }

    pub fn data(&self) -> &[[f32; 4]] {
        &self.data
    }

    pub fn pose_count(&self) -> usize {
        self.pose_count
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    /// Index of the first normal, in `[f32; 4]` elements.
    pub fn normal_block_offset(&self) -> usize {
        self.pose_count * self.vertex_count
    }

    pub fn position(&self, pose: usize, vertex: usize) -> [f32; 4] {
        self.data[pose * self.vertex_count + vertex]
    }

    pub fn normal(&self, pose: usize, vertex: usize) -> [f32; 4] {
        self.data[self.normal_block_offset() + pose * self.vertex_count + vertex]
    }
}

/// The morph data, index and uv storage buffers read by the shading pass. Written once.
pub struct MorphBuffer {
    morph: GpuBuffer,
    indices: GpuBuffer,
    uvs: GpuBuffer,
    pose_count: usize,
    vertex_count: usize,
    index_count: usize,
    normal_block_offset: usize,
}

impl MorphBuffer {
    #[profiling::function]
    pub fn build(
        base_renderer: &BaseRenderer,
        source: &dyn AssetSource,
        pose_count: usize,
    ) -> Result<Self, BakeError> {
        let poses = (0..pose_count)
            .map(|pose| {
                source
                    .load_pose(pose)
                    .map_err(|err| BakeError::resource_load(format!("morph pose {pose}"), err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let target_set = MorphTargetSet::pack(&poses)?;
        Ok(Self::upload(base_renderer, &target_set))
    }

    pub fn upload(base_renderer: &BaseRenderer, target_set: &MorphTargetSet) -> Self {
        let usage = wgpu::BufferUsages::STORAGE;
        let device = &base_renderer.device;

        let morph = GpuBuffer::from_bytes(
            device,
            bytemuck::cast_slice(target_set.data()),
            std::mem::size_of::<[f32; 4]>(),
            usage,
            "Morph Target Buffer",
        );
        let indices = GpuBuffer::from_bytes(
            device,
            bytemuck::cast_slice(target_set.indices()),
            std::mem::size_of::<u32>(),
            usage,
            "Morph Index Buffer",
        );
        let uvs = GpuBuffer::from_bytes(
            device,
            bytemuck::cast_slice(target_set.uvs()),
            std::mem::size_of::<[f32; 2]>(),
            usage,
            "Morph Uv Buffer",
        );

        log::info!(
            "Uploaded {} morph poses of {} vertices, normals start at element {}",
            target_set.pose_count(),
            target_set.vertex_count(),
            target_set.normal_block_offset()
        );

        Self {
            morph,
            indices,
            uvs,
            pose_count: target_set.pose_count(),
            vertex_count: target_set.vertex_count(),
            index_count: target_set.indices().len(),
            normal_block_offset: target_set.normal_block_offset(),
        }
    }

    pub fn morph_buffer(&self) -> &GpuBuffer {
        &self.morph
    }

    pub fn index_buffer(&self) -> &GpuBuffer {
        &self.indices
    }

    pub fn uv_buffer(&self) -> &GpuBuffer {
        &self.uvs
    }

    pub fn vertex_stride(&self) -> usize {
        self.morph.stride()
    }

    pub fn normal_block_offset(&self) -> usize {
        self.normal_block_offset
    }

    pub fn pose_count(&self) -> usize {
        self.pose_count
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

/// Elapsed-time accumulator that drives the morph blend. Only `advance` moves it forward
/// and only while unpaused; it is never reset.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MorphBlendState {
    elapsed_ms: f64,
    paused: bool,
    fps: f64,
    target_count: usize,
}

impl MorphBlendState {
    pub fn new(target_count: usize, fps: f64) -> Self {
        Self {
            elapsed_ms: 0.0,
            paused: false,
            fps,
            target_count,
        }
    }

    pub fn advance(&mut self, delta: Duration) {
        if !self.paused {
            self.elapsed_ms += delta.as_secs_f64() * 1000.0;
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Fractional pose position in `[0, target_count)`.
    pub fn blend_factor(&self) -> f32 {
        if self.target_count == 0 {
            return 0.0;
        }
        ((self.elapsed_ms * 0.001 * self.fps) % self.target_count as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use glam::{Vec2, Vec3};

    fn triangle_pose(offset: f32) -> BasicMesh {
        BasicMesh {
            positions: vec![
                Vec3::new(offset, 0.0, 0.0),
                Vec3::new(offset + 1.0, 0.0, 0.0),
                Vec3::new(offset, 1.0, 0.0),
            ],
            normals: vec![Vec3::Z; 3],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn positions_then_normals() {
        let poses = [triangle_pose(0.0), triangle_pose(10.0), triangle_pose(20.0)];
        let set = MorphTargetSet::pack(&poses).unwrap();

        assert_eq!(set.pose_count(), 3);
        assert_eq!(set.vertex_count(), 3);
        assert_eq!(set.normal_block_offset(), 9);
        assert_eq!(set.data().len(), 18);

        assert_eq!(set.data()[0], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(set.data()[4], [11.0, 0.0, 0.0, 1.0]);
        assert_eq!(set.position(2, 2), [20.0, 1.0, 0.0, 1.0]);
        assert_eq!(set.data()[9], [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(set.normal(2, 2), [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(set.uvs(), &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn mismatched_vertex_count_is_rejected() {
        let mut bigger = triangle_pose(1.0);
        bigger.positions.push(Vec3::ONE);
        bigger.normals.push(Vec3::Z);
        bigger.uvs.push(Vec2::ONE);

        let err = MorphTargetSet::pack(&[triangle_pose(0.0), bigger]).unwrap_err();
        assert!(matches!(
            err,
            BakeError::TopologyMismatch {
                pose: 1,
                expected_vertices: 3,
                found_vertices: 4,
                ..
            }
        ));
    }

    #[test]
    fn mismatched_indices_are_rejected() {
        let mut flipped = triangle_pose(1.0);
        flipped.indices = vec![0, 2, 1];
        assert!(matches!(
            MorphTargetSet::pack(&[triangle_pose(0.0), flipped]),
            Err(BakeError::TopologyMismatch { pose: 1, .. })
        ));
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(
            MorphTargetSet::pack(&[]),
            Err(BakeError::EmptyMorphSet)
        ));
    }

    #[test]
    fn blend_wraps_at_target_count() {
        let mut blend = MorphBlendState::new(4, 25.0);
        blend.advance(Duration::from_millis(4000));
        assert_eq!(blend.blend_factor(), 0.0);

        blend.advance(Duration::from_millis(100));
        assert_abs_diff_eq!(blend.blend_factor(), 2.5, epsilon = 1e-5);

        // 4230ms = 105.75 frames
        blend.advance(Duration::from_millis(130));
        assert_abs_diff_eq!(blend.blend_factor(), 1.75, epsilon = 1e-5);
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let mut blend = MorphBlendState::new(4, 25.0);
        blend.advance(Duration::from_millis(50));
        let frozen = blend.blend_factor();
        assert_abs_diff_eq!(frozen, 1.25, epsilon = 1e-5);

        blend.set_paused(true);
        assert!(blend.is_paused());
        for _ in 0..10 {
            blend.advance(Duration::from_millis(333));
        }
        assert_eq!(blend.blend_factor(), frozen);

        blend.set_paused(false);
        blend.advance(Duration::from_millis(20));
        assert_abs_diff_eq!(blend.blend_factor(), 1.75, epsilon = 1e-5);
        assert_abs_diff_eq!(blend.elapsed_ms(), 70.0, epsilon = 1e-9);
    }
}
