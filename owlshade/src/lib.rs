pub mod brdf_lut;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod cubemap;
pub mod errors;
pub mod file_loader;
pub mod material;
pub mod mesh;
pub mod morph;
pub mod pbr_material;
pub mod render_target;
pub mod renderer;
pub mod sampler_cache;
pub mod sampling;
pub mod texture;
pub mod uniforms;
pub mod volume;

pub use wgpu;

/// Drives a future to completion on the current thread. Every gpu wait in this crate
/// (error scopes, buffer mapping) goes through here.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    pollster::block_on(future)
}
