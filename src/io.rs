//! External interfaces a host embeds this crate behind: a source of named
//! blobs/images in, a sink of GPU-side resources out. Neither trait assumes
//! a particular asset layout or renderer; see
//! [`crate::fs_source::FsBlobSource`] for the one concrete `BlobSource`
//! this crate ships.

use crate::error::Result;
use crate::image::Image;
use crate::math::{Quat, Vec3};
use crate::scene::types::{Geometry, Material, Skeleton};

/// A source of named file contents and decoded images. Names use backslash
/// path separators, matching how they're recorded inside AAR archives.
pub trait BlobSource {
    fn exists(&self, name: &str) -> bool;
    fn filenames(&self) -> Vec<String>;
    fn load(&self, name: &str) -> Result<Vec<u8>>;
    fn load_image(&self, name: &str) -> Result<Image>;
    /// Loads an ordered animation-frame set named `base`, `base_00`,
    /// `base_01`, … stopping at the first missing index.
    fn load_image_list(&self, base: &str) -> Result<Vec<Image>>;
}

/// A sink that turns the scene IR into renderer-side resources. Every
/// created handle is expected to be tracked by the caller's own
/// [`ResourceRegistry`] (or equivalent) for teardown.
pub trait SceneSink {
    type Texture;
    type Material;
    type Geometry;
    type Mesh;

    fn create_texture(&mut self, image: &Image) -> Self::Texture;
    fn create_material(&mut self, material: &Material) -> Self::Material;
    fn create_geometry(&mut self, geometry: &Geometry) -> Self::Geometry;
    fn create_skinned_mesh(
        &mut self,
        geometry: &Self::Geometry,
        materials: &[Self::Material],
        skeleton: Option<&Skeleton>,
    ) -> Self::Mesh;

    fn set_bone_transform(&mut self, mesh: &Self::Mesh, joint_index: usize, pos: Vec3, rot: Quat);
    fn set_material_texture(&mut self, material: &Self::Material, texture: &Self::Texture);
    /// Sets a material's color-texture UV offset, driven by `(u, v)`
    /// UV-scroll at the current frame.
    fn set_material_texture_offset(&mut self, material: &Self::Material, offset: (f32, f32));
}

/// Tracks every resource a [`SceneSink`] has handed back so it can be torn
/// down in insertion order with a single call.
pub struct ResourceRegistry<H> {
    handles: Vec<H>,
}

impl<H> ResourceRegistry<H> {
    pub fn new() -> ResourceRegistry<H> {
        ResourceRegistry { handles: Vec::new() }
    }

    pub fn register(&mut self, handle: H) {
        self.handles.push(handle);
    }

    /// Releases every tracked handle, in insertion order, via `release`.
    pub fn dispose(mut self, mut release: impl FnMut(H)) {
        for handle in self.handles.drain(..) {
            release(handle);
        }
    }
}

impl<H> Default for ResourceRegistry<H> {
    fn default() -> ResourceRegistry<H> {
        ResourceRegistry::new()
    }
}
