use wgpu::{Device, Sampler};

// same as wgpu::SamplerDescriptor but without the label, so it can be compared
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SamplerDescriptor {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub compare: Option<wgpu::CompareFunction>,
}

impl SamplerDescriptor {
    /// Linear min/mag, clamp to edge on every axis. The default for baked cube and 2D
    /// textures.
    pub fn clamp_linear() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
        }
    }

    /// Trilinear, for the prefiltered specular cube.
    pub fn mip_linear() -> Self {
        Self {
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Self::clamp_linear()
        }
    }

    /// Repeats in u and v and mirrors across w.
    pub fn volume_repeat() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::MirrorRepeat,
            ..Self::clamp_linear()
        }
    }

    /// Wraps around the horizon, clamps at the poles.
    pub fn panorama() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            ..Self::clamp_linear()
        }
    }

    pub fn into_wgpu(self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: None,
            address_mode_u: self.address_mode_u,
            address_mode_v: self.address_mode_v,
            address_mode_w: self.address_mode_w,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            lod_min_clamp: self.lod_min_clamp,
            lod_max_clamp: self.lod_max_clamp,
            compare: self.compare,
            anisotropy_clamp: 1,
            border_color: None,
        }
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::clamp_linear()
    }
}

#[derive(Default, Debug)]
pub struct SamplerCache {
    samplers: Vec<(SamplerDescriptor, Sampler)>,
}

impl SamplerCache {
    pub fn get_sampler_index(&mut self, device: &Device, a_descriptor: &SamplerDescriptor) -> usize {
        if let Some(existing_sampler_index) = self
            .samplers
            .iter()
            .position(|(descriptor, _)| descriptor == a_descriptor)
        {
            return existing_sampler_index;
        }
        let new_sampler_index = self.samplers.len();
        let new_sampler = device.create_sampler(&a_descriptor.into_wgpu());
        self.samplers.push((*a_descriptor, new_sampler));
        new_sampler_index
    }

    pub fn get_sampler_by_index(&self, sampler_index: usize) -> &Sampler {
        let (_, sampler) = &self.samplers[sampler_index];
        sampler
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_texture_conventions() {
        let clamp = SamplerDescriptor::clamp_linear();
        assert_eq!(clamp.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(clamp.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(clamp.mipmap_filter, wgpu::FilterMode::Nearest);

        assert_eq!(
            SamplerDescriptor::mip_linear().mipmap_filter,
            wgpu::FilterMode::Linear
        );

        let volume = SamplerDescriptor::volume_repeat();
        assert_eq!(volume.address_mode_v, wgpu::AddressMode::Repeat);
        assert_eq!(volume.address_mode_w, wgpu::AddressMode::MirrorRepeat);

        assert_ne!(
            SamplerDescriptor::panorama(),
            SamplerDescriptor::clamp_linear()
        );
    }
}
