use glam::f32::{Mat4, Vec3};

/// Size of the `MaterialUniforms` struct in `owl_pbr.wgsl`, padded to its 16 byte
/// alignment.
pub const MATERIAL_UNIFORMS_SIZE: u64 = 336;

pub const ENVIRONMENT_BIND_GROUP: u32 = 0;
pub const MATERIAL_UNIFORMS_BIND_GROUP: u32 = 1;
pub const MATERIAL_UNIFORMS_BINDING: u32 = 0;
pub const MORPH_BIND_GROUP: u32 = 2;
pub const MORPH_BUFFER_BINDING: u32 = 0;
pub const MORPH_INDEX_BINDING: u32 = 1;
pub const MORPH_UV_BINDING: u32 = 2;

pub const CLAMP_SAMPLER_BINDING: u32 = 5;
pub const MIP_SAMPLER_BINDING: u32 = 6;
pub const VOLUME_SAMPLER_BINDING: u32 = 7;

pub const IRRADIANCE_UNIT: u32 = 0;
pub const PREFILTER_UNIT: u32 = 1;
pub const BRDF_LUT_UNIT: u32 = 2;
pub const ALBEDO_VOLUME_UNIT: u32 = 3;
pub const NORMAL_VOLUME_UNIT: u32 = 4;

/// Texture name to binding in the environment bind group. The shading shader declares the
/// same bindings, so this table is part of the shader interface.
pub const TEXTURE_UNITS: [(&str, u32); 5] = [
    ("u_irradianceMap", IRRADIANCE_UNIT),
    ("u_prefilterMap", PREFILTER_UNIT),
    ("u_brdfMap", BRDF_LUT_UNIT),
    ("u_albedoMap", ALBEDO_VOLUME_UNIT),
    ("u_normalMap", NORMAL_VOLUME_UNIT),
];

pub fn texture_unit(name: &str) -> Option<u32> {
    TEXTURE_UNITS
        .iter()
        .find(|(unit_name, _)| *unit_name == name)
        .map(|(_, unit)| *unit)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    UInt,
    Vec3,
    Mat4,
}

impl UniformKind {
    pub fn size(self) -> u64 {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::UInt => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Mat4 => 64,
        }
    }

    pub fn alignment(self) -> u64 {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::UInt => 4,
            UniformKind::Vec3 | UniformKind::Mat4 => 16,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Vec3(Vec3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::UInt(_) => UniformKind::UInt,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(value) => bytemuck::bytes_of(value).to_vec(),
            UniformValue::Int(value) => bytemuck::bytes_of(value).to_vec(),
            UniformValue::UInt(value) => bytemuck::bytes_of(value).to_vec(),
            UniformValue::Vec3(value) => bytemuck::cast_slice(&value.to_array()).to_vec(),
            UniformValue::Mat4(value) => bytemuck::cast_slice(&value.to_cols_array()).to_vec(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: &'static str,
    pub offset: u64,
    pub kind: UniformKind,
}

const fn slot(name: &'static str, offset: u64, kind: UniformKind) -> UniformSlot {
    UniformSlot { name, offset, kind }
}

/// Every logical uniform name the pbr material pushes and where it lives in
/// `MaterialUniforms`.
#[rustfmt::skip]
pub const UNIFORM_SLOTS: [UniformSlot; 31] = [
    slot("u_M",                 0,   UniformKind::Mat4),
    slot("u_MVP",               64,  UniformKind::Mat4),
    slot("u_N",                 128, UniformKind::Mat4),
    slot("u_camPos",            192, UniformKind::Vec3),
    slot("u_blend",             204, UniformKind::Float),
    slot("u_albedo",            208, UniformKind::Vec3),
    slot("u_ao",                220, UniformKind::Float),
    slot("u_eyeTranslate",      224, UniformKind::Vec3),
    slot("u_roughness",         236, UniformKind::Float),
    slot("u_metallic",          240, UniformKind::Float),
    slot("u_baseSpec",          244, UniformKind::Float),
    slot("u_normalStrength",    248, UniformKind::Float),
    slot("u_exposure",          252, UniformKind::Float),
    slot("u_tessLevelInner",    256, UniformKind::Float),
    slot("u_tessLevelOuter",    260, UniformKind::Float),
    slot("u_tessType",          264, UniformKind::Int),
    slot("u_phongStrength",     268, UniformKind::Float),
    slot("u_eyeDisp",           272, UniformKind::Float),
    slot("u_eyeScale",          276, UniformKind::Float),
    slot("u_eyeRotation",       280, UniformKind::Float),
    slot("u_eyeWarp",           284, UniformKind::Float),
    slot("u_eyeExponent",       288, UniformKind::Float),
    slot("u_eyeThickness",      292, UniformKind::Float),
    slot("u_eyeGap",            296, UniformKind::Float),
    slot("u_eyeFuzz",           300, UniformKind::Float),
    slot("u_eyeMaskCap",        304, UniformKind::Float),
    slot("u_tessMaskCap",       308, UniformKind::Float),
    slot("u_morphTargetCount",  312, UniformKind::UInt),
    slot("u_vertexCount",       316, UniformKind::UInt),
    slot("u_normalOffset",      320, UniformKind::UInt),
    slot("u_volumeLayerCount",  324, UniformKind::UInt),
];

pub fn uniform_slot(name: &str) -> Option<&'static UniformSlot> {
    UNIFORM_SLOTS.iter().find(|slot| slot.name == name)
}

/// Receives uniform updates by logical name.
pub trait UniformSink {
    fn set_uniform(&mut self, name: &str, value: UniformValue);
}

/// Writes uniforms straight into the material's uniform buffer through the queue.
pub struct GpuUniformWriter<'a> {
    queue: &'a wgpu::Queue,
    buffer: &'a wgpu::Buffer,
}

impl<'a> GpuUniformWriter<'a> {
    pub fn new(queue: &'a wgpu::Queue, buffer: &'a wgpu::Buffer) -> Self {
        Self { queue, buffer }
    }
}

impl UniformSink for GpuUniformWriter<'_> {
    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(slot) = uniform_slot(name) else {
            log::warn!("Ignoring unknown uniform {name}");
            return;
        };
        if slot.kind != value.kind() {
            log::warn!(
                "Ignoring {name}: expected a {:?}, got {:?}",
                slot.kind,
                value.kind()
            );
            return;
        }
        self.queue
            .write_buffer(self.buffer, slot.offset, &value.to_bytes());
    }
}

/// Sink for materials that have nothing bound yet. Values stay in the material's own
/// state until init pushes them.
#[derive(Default)]
pub struct DetachedSink;

impl UniformSink for DetachedSink {
    fn set_uniform(&mut self, _name: &str, _value: UniformValue) {}
}

#[cfg(test)]
#[derive(Default, Debug)]
pub(crate) struct RecordingSink {
    pub values: Vec<(String, UniformValue)>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn last(&self, name: &str) -> Option<UniformValue> {
        self.values
            .iter()
            .rev()
            .find(|(value_name, _)| value_name == name)
            .map(|(_, value)| *value)
    }
}

#[cfg(test)]
impl UniformSink for RecordingSink {
    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.values.push((name.to_string(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    #[test]
    fn slots_are_aligned_and_disjoint() {
        let mut sorted = UNIFORM_SLOTS.to_vec();
        sorted.sort_by_key(|slot| slot.offset);

        for slot in &sorted {
            assert_eq!(slot.offset % slot.kind.alignment(), 0, "{} is misaligned", slot.name);
            assert!(slot.offset + slot.kind.size() <= MATERIAL_UNIFORMS_SIZE);
        }
        for pair in sorted.windows(2) {
            assert!(
                pair[0].offset + pair[0].kind.size() <= pair[1].offset,
                "{} overlaps {}",
                pair[0].name,
                pair[1].name
            );
        }
        assert_eq!(MATERIAL_UNIFORMS_SIZE % 16, 0);
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = UNIFORM_SLOTS.iter().map(|slot| slot.name).collect();
        assert_eq!(names.len(), UNIFORM_SLOTS.len());
        assert_eq!(uniform_slot("u_blend").map(|slot| slot.offset), Some(204));
        assert_eq!(
            uniform_slot("u_volumeLayerCount").map(|slot| (slot.offset, slot.kind)),
            Some((324, UniformKind::UInt))
        );
        assert!(uniform_slot("u_doesNotExist").is_none());
    }

    #[test]
    fn texture_units_are_fixed() {
        assert_eq!(texture_unit("u_irradianceMap"), Some(0));
        assert_eq!(texture_unit("u_prefilterMap"), Some(1));
        assert_eq!(texture_unit("u_brdfMap"), Some(2));
        assert_eq!(texture_unit("u_albedoMap"), Some(3));
        assert_eq!(texture_unit("u_normalMap"), Some(4));
        let samplers = [CLAMP_SAMPLER_BINDING, MIP_SAMPLER_BINDING, VOLUME_SAMPLER_BINDING];
        assert!(TEXTURE_UNITS
            .iter()
            .all(|(_, unit)| !samplers.contains(unit)));
    }

    #[test]
    fn values_match_their_kind_sizes() {
        let values = [
            UniformValue::Float(1.0),
            UniformValue::Int(-3),
            UniformValue::UInt(7),
            UniformValue::Vec3(Vec3::ONE),
            UniformValue::Mat4(Mat4::IDENTITY),
        ];
        for value in values {
            assert_eq!(value.to_bytes().len() as u64, value.kind().size());
        }
        assert_eq!(
            UniformValue::Int(-1).to_bytes(),
            (-1i32).to_le_bytes().to_vec()
        );
    }
}
