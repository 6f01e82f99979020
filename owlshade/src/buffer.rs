use crate::renderer::USE_LABELS;

use wgpu::util::DeviceExt;

/// Gpu buffer that is written once at creation and never resized.
#[derive(Debug)]
pub struct GpuBuffer {
    src: wgpu::Buffer,
    stride: usize,
    length: usize,
}

impl GpuBuffer {
    #[profiling::function]
    pub fn from_bytes(
        device: &wgpu::Device,
        contents: &[u8],
        stride: usize,
        usage: wgpu::BufferUsages,
        label: &str,
    ) -> Self {
        let length = contents.len().div_ceil(stride);

        // zero-sized bindings are invalid, keep at least one element around
        let mut contents_padded = contents.to_vec();
        contents_padded.resize((length.max(1)) * stride, 0);

        log::debug!("{label}: {} bytes ({length} x {stride})", contents_padded.len());

        Self {
            src: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: USE_LABELS.then_some(label),
                contents: &contents_padded,
                usage,
            }),
            stride,
            length,
        }
    }

    pub fn src(&self) -> &wgpu::Buffer {
        &self.src
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn length_bytes(&self) -> usize {
        self.length * self.stride
    }
}
