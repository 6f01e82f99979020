use crate::mesh::BasicMesh;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

/// Linear RGBA float pixels, row 0 at the top.
#[derive(Clone, Debug, PartialEq)]
pub struct HdrPanorama {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl HdrPanorama {
    pub fn new(width: u32, height: u32, pixels: Vec<[f32; 4]>) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("Panorama must not be empty ({width}x{height})");
        }
        if pixels.len() != (width * height) as usize {
            bail!(
                "Panorama of {width}x{height} needs {} pixels, got {}",
                width * height,
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes any format the image crate was built with. Radiance `.hdr` keeps its full
    /// range, 8 bit formats come out in 0..1.
    #[profiling::function]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba32f();
        let (width, height) = image.dimensions();
        let pixels = image.pixels().map(|pixel| pixel.0).collect();
        Self::new(width, height, pixels)
    }
}

/// Where the pbr material gets its panorama and morph poses from.
pub trait AssetSource {
    fn load_panorama(&self) -> Result<HdrPanorama>;

    fn load_pose(&self, index: usize) -> Result<BasicMesh>;
}

pub struct FileAssetSource {
    root: PathBuf,
    panorama_path: PathBuf,
    pose_path_template: String,
}

impl FileAssetSource {
    pub const POSE_INDEX_PLACEHOLDER: &'static str = "{}";

    /// `pose_path_template` holds a `{}` that is replaced by the pose index, so
    /// `"owl/owl_{}.obj"` yields `owl/owl_0.obj`, `owl/owl_1.obj` and so on. Relative
    /// paths resolve against `root`.
    pub fn new<P, Q>(root: P, panorama_path: Q, pose_path_template: &str) -> Result<Self>
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        if !pose_path_template.contains(Self::POSE_INDEX_PLACEHOLDER) {
            bail!(
                "Pose path template '{pose_path_template}' needs a '{}' for the pose index",
                Self::POSE_INDEX_PLACEHOLDER
            );
        }
        Ok(Self {
            root: root.into(),
            panorama_path: panorama_path.into(),
            pose_path_template: pose_path_template.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pose_path(&self, index: usize) -> PathBuf {
        self.root.join(
            self.pose_path_template
                .replace(Self::POSE_INDEX_PLACEHOLDER, &index.to_string()),
        )
    }

    pub fn panorama_path(&self) -> PathBuf {
        self.root.join(&self.panorama_path)
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| anyhow!("{err} ({})", path.display()))
}

impl AssetSource for FileAssetSource {
    fn load_panorama(&self) -> Result<HdrPanorama> {
        let path = self.panorama_path();
        HdrPanorama::from_bytes(&read(&path)?)
            .map_err(|err| anyhow!("{err} ({})", path.display()))
    }

    fn load_pose(&self, index: usize) -> Result<BasicMesh> {
        let path = self.pose_path(index);
        BasicMesh::from_obj_bytes(&read(&path)?)
            .map_err(|err| anyhow!("{err} ({})", path.display()))
    }
}

/// Assets that are already in memory, for tests and generated content.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAssets {
    pub panorama: Option<HdrPanorama>,
    pub poses: Vec<BasicMesh>,
}

impl AssetSource for InMemoryAssets {
    fn load_panorama(&self) -> Result<HdrPanorama> {
        self.panorama
            .clone()
            .ok_or_else(|| anyhow!("No panorama was provided"))
    }

    fn load_pose(&self, index: usize) -> Result<BasicMesh> {
        self.poses
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("Pose {index} was not provided ({} poses)", self.poses.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_paths_follow_the_template() {
        let source = FileAssetSource::new("assets", "sky.hdr", "owl/owl_{}.obj").unwrap();
        assert_eq!(source.pose_path(3), Path::new("assets/owl/owl_3.obj"));
        assert_eq!(source.panorama_path(), Path::new("assets/sky.hdr"));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        assert!(FileAssetSource::new("assets", "sky.hdr", "owl/owl.obj").is_err());
    }

    #[test]
    fn missing_files_name_the_path() {
        let source = FileAssetSource::new(
            "definitely/not/a/real/folder",
            "sky.hdr",
            "pose_{}.obj",
        )
        .unwrap();
        let err = source.load_pose(7).unwrap_err();
        assert!(err.to_string().contains("pose_7.obj"), "{err}");
        assert!(source.load_panorama().is_err());
    }

    #[test]
    fn panorama_size_is_checked() {
        assert!(HdrPanorama::new(2, 2, vec![[0.0; 4]; 3]).is_err());
        assert!(HdrPanorama::new(0, 2, vec![]).is_err());
        assert!(HdrPanorama::new(2, 1, vec![[1.0; 4]; 2]).is_ok());
    }

    #[test]
    fn in_memory_assets_report_missing_poses() {
        let assets = InMemoryAssets::default();
        assert!(assets.load_panorama().is_err());
        assert!(assets.load_pose(0).is_err());
    }
}
