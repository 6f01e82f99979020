use crate::renderer::{BaseRenderer, USE_LABELS};
use crate::texture::Texture;

/// Owns the depth attachment for a square offscreen pass. Color attachments are supplied
/// per pass since the bakes write straight into layers and mips of their output texture.
pub struct OffscreenTarget {
    resolution: u32,
    depth: Option<Texture>,
}

impl OffscreenTarget {
    pub fn new(base_renderer: &BaseRenderer, resolution: u32, with_depth: bool) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            depth: with_depth.then(|| {
                Texture::create_depth_texture(
                    base_renderer,
                    (resolution, resolution),
                    "offscreen depth texture",
                )
            }),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn resize(&mut self, base_renderer: &BaseRenderer, resolution: u32) {
        let resolution = resolution.max(1);
        if resolution == self.resolution {
            return;
        }
        *self = Self::new(base_renderer, resolution, self.has_depth());
    }

    /// Clears `color_view` to black and depth to 1.0. The pass ends when the returned
    /// value is dropped, on every path out of the caller's scope.
    pub fn begin_pass<'a>(
        &'a self,
        encoder: &'a mut wgpu::CommandEncoder,
        color_view: &'a wgpu::TextureView,
        label: &str,
    ) -> wgpu::RenderPass<'a> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: USE_LABELS.then_some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: self.depth.as_ref().map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}
