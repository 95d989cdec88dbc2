//! The renderer-neutral intermediate representation a [`super::builder`]
//! produces from a parsed [`crate::formats::pol::Pol`].

use std::collections::HashMap;

use crate::image::Image;
use crate::math::{Mat4, Quat, Vec2, Vec3};

/// How a bone name resolves in a [`Skeleton`]'s name lookup: bone names are
/// not guaranteed unique, so a name that collides resolves to `NonUnique`
/// rather than picking one arbitrarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRef {
    Unique(usize),
    NonUnique,
}

#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub id: i32,
    pub parent: Option<usize>,
    pub local_pos: Vec3,
    pub local_rot: Quat,
    pub inverse_bind: Mat4,
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    id_index: HashMap<i32, usize>,
    name_index: HashMap<String, NameRef>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Skeleton {
        let mut id_index = HashMap::with_capacity(joints.len());
        let mut name_index: HashMap<String, NameRef> = HashMap::with_capacity(joints.len());
        for (i, j) in joints.iter().enumerate() {
            id_index.insert(j.id, i);
            name_index
                .entry(j.name.clone())
                .and_modify(|r| *r = NameRef::NonUnique)
                .or_insert(NameRef::Unique(i));
        }
        Skeleton { joints, id_index, name_index }
    }

    pub fn joint_by_id(&self, id: i32) -> Option<usize> {
        self.id_index.get(&id).copied()
    }

    pub fn joint_by_name(&self, name: &str) -> Option<usize> {
        match self.name_index.get(name) {
            Some(NameRef::Unique(idx)) => Some(*idx),
            _ => None,
        }
    }

    /// Name lookup first, id fallback.
    pub fn find_joint(&self, name: &str, id: u32) -> Option<usize> {
        self.joint_by_name(name).or_else(|| self.joint_by_id(id as i32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Phong,
    Matcap,
}

/// A material's color slot is a sequence of frames so that the SceneBuilder
/// can subscribe multi-frame (animated) textures to per-frame ticks without
/// the renderable material type itself changing shape.
#[derive(Debug, Clone)]
pub struct ColorSlot {
    pub frames: Vec<Image>,
    pub current_frame: usize,
}

impl ColorSlot {
    pub fn single(image: Image) -> ColorSlot {
        ColorSlot { frames: vec![image], current_frame: 0 }
    }

    pub fn current(&self) -> &Image {
        &self.frames[self.current_frame]
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub kind: MaterialKind,
    pub color: ColorSlot,
    pub normal_map: Option<Image>,
    pub light_map: Option<Image>,
    pub light_map_intensity: f32,
    pub alpha_map: Option<Image>,
    pub transparent: bool,
    pub alpha_test: Option<f32>,
    /// `normalScale.y` is inverted relative to the source convention.
    pub normal_scale: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub start: u32,
    pub count: u32,
    pub material_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub light_uvs: Option<Vec<Vec2>>,
    pub colors: Vec<Vec3>,
    pub alphas: Vec<f32>,
    pub skin_indices: Option<Vec<[u32; 4]>>,
    pub skin_weights: Option<Vec<[f32; 4]>>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default)]
pub struct MeshEffects {
    pub additive_blending: bool,
    pub transparent: bool,
    pub double_sided: bool,
    pub no_edge: bool,
    pub uv_scroll: Option<(f32, f32)>,
}

#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub name: String,
    pub geometry: Geometry,
    /// indices into `Scene::materials`, one per group, same order as `geometry.groups`.
    pub material_indices: Vec<usize>,
    pub effects: MeshEffects,
    pub is_collision_hull: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub skeleton: Option<Skeleton>,
    pub materials: Vec<Material>,
    pub meshes: Vec<SceneMesh>,
}
