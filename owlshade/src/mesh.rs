use std::collections::{hash_map, HashMap};
use std::io::{BufReader, Cursor};

use anyhow::{bail, Result};
use glam::f32::{Vec2, Vec3};
use obj::raw::object::Polygon;
use obj::raw::parse_obj;

/// Vertex used by the cube capture passes, position only.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CaptureVertex {
    pub position: [f32; 3],
}

impl CaptureVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
    ];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CaptureVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Indexed triangle mesh with one position, normal and uv per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl BasicMesh {
    /// Reads an obj file. Polygons are fan triangulated and vertices are numbered in the
    /// order they are first referenced, so two poses exported from the same topology come
    /// out with identical index lists.
    #[profiling::function]
    pub fn from_obj_bytes(obj_file_bytes: &[u8]) -> Result<Self> {
        let obj = parse_obj(BufReader::new(Cursor::new(obj_file_bytes)))?;

        // (position, uv, normal)
        let mut triangles: Vec<[(usize, Option<usize>, usize); 3]> = vec![];

        for polygon in obj.polygons.iter() {
            let points: Vec<(usize, Option<usize>, usize)> = match polygon {
                Polygon::PTN(points) => points
                    .iter()
                    .map(|&(position, uv, normal)| (position, Some(uv), normal))
                    .collect(),
                Polygon::PN(points) => points
                    .iter()
                    .map(|&(position, normal)| (position, None, normal))
                    .collect(),
                _ => {
                    bail!("BasicMesh requires that all points have a position and a normal");
                }
            };

            let Some((&last_elem, rest)) = points.split_last() else {
                bail!("BasicMesh requires that all polygons have at least 3 vertices");
            };
            if rest.len() < 2 {
                bail!("BasicMesh requires that all polygons have at least 3 vertices");
            }

            triangles.extend(
                rest.iter()
                    .zip(rest[1..].iter())
                    .map(|(&x, &y)| [last_elem, x, y]),
            );
        }

        let mut index_map: HashMap<(usize, Option<usize>, usize), u32> = HashMap::new();
        let mut mesh = BasicMesh::default();

        for &key in triangles.iter().flatten() {
            let index = match index_map.entry(key) {
                hash_map::Entry::Occupied(entry) => *entry.get(),
                hash_map::Entry::Vacant(vacant_entry) => {
                    let (position_index, uv_index, normal_index) = key;
                    let Some(&(x, y, z, _)) = obj.positions.get(position_index) else {
                        bail!("Position index {position_index} is out of range");
                    };
                    let Some(&(nx, ny, nz)) = obj.normals.get(normal_index) else {
                        bail!("Normal index {normal_index} is out of range");
                    };
                    let uv = match uv_index {
                        Some(uv_index) => {
                            let Some(&(u, v, _)) = obj.tex_coords.get(uv_index) else {
                                bail!("Texture coordinate index {uv_index} is out of range");
                            };
                            // convert uv format into 0->1 range
                            Vec2::new(u, 1.0 - v)
                        }
                        None => Vec2::ZERO,
                    };

                    let new_index = mesh.positions.len() as u32;
                    mesh.positions.push(Vec3::new(x, y, z));
                    mesh.normals.push(Vec3::new(nx, ny, nz).normalize_or_zero());
                    mesh.uvs.push(uv);
                    *vacant_entry.insert(new_index)
                }
            };
            mesh.indices.push(index);
        }

        Ok(mesh)
    }

    /// The proxy cube drawn by the capture passes: 8 corners at ±1, 36 indices.
    pub fn unit_cube() -> Self {
        let positions: Vec<Vec3> = (0..8)
            .map(|corner| {
                Vec3::new(
                    if corner & 1 == 0 { -1.0 } else { 1.0 },
                    if corner & 2 == 0 { -1.0 } else { 1.0 },
                    if corner & 4 == 0 { -1.0 } else { 1.0 },
                )
            })
            .collect();
        let normals = positions.iter().map(|position| position.normalize()).collect();
        let uvs = vec![Vec2::ZERO; positions.len()];

        #[rustfmt::skip]
        let indices = vec![
            1, 3, 7, 1, 7, 5, // +x
            0, 4, 6, 0, 6, 2, // -x
            2, 6, 7, 2, 7, 3, // +y
            0, 1, 5, 0, 5, 4, // -y
            4, 5, 7, 4, 7, 6, // +z
            0, 2, 3, 0, 3, 1, // -z
        ];

        Self {
            positions,
            normals,
            uvs,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn capture_vertices(&self) -> Vec<CaptureVertex> {
        self.positions
            .iter()
            .map(|position| CaptureVertex {
                position: (*position).into(),
            })
            .collect()
    }

    pub fn indices_u16(&self) -> Result<Vec<u16>> {
        self.indices
            .iter()
            .map(|&index| {
                u16::try_from(index).map_err(|_| anyhow::anyhow!("Index {index} doesn't fit in u16"))
            })
            .collect()
    }
}
