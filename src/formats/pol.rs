//! POL — a versioned polygonal model format: a material tree, skinned
//! meshes, and a flat bone list.
//!
//! Parsing is a single forward pass; nothing here looks ahead or seeks
//! backward except the final end-of-file check.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::byte_cursor::ByteCursor;
use crate::error::{ErrorKind, Result};
use crate::math::{convert_direction, convert_position, convert_quaternion, Quat, Vec2, Vec3};

const POL_MAGIC: &[u8; 4] = b"POL\0";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureRole {
    ColorMap = 1,
    SpecularMask = 4,
    Glare = 5,
    AlphaMap = 6,
    LightMap = 7,
    NormalMap = 8,
    HeightMap = 11,
}

impl TextureRole {
    fn from_u32(v: u32) -> Option<TextureRole> {
        match v {
            1 => Some(TextureRole::ColorMap),
            4 => Some(TextureRole::SpecularMask),
            5 => Some(TextureRole::Glare),
            6 => Some(TextureRole::AlphaMap),
            7 => Some(TextureRole::LightMap),
            8 => Some(TextureRole::NormalMap),
            11 => Some(TextureRole::HeightMap),
            _ => None,
        }
    }
}

pub type Attrs = HashSet<String>;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub attrs: Attrs,
    pub textures: HashMap<TextureRole, String>,
    pub children: Vec<Material>,
}

#[derive(Debug, Clone, Copy)]
pub struct BoneWeight {
    pub bone: u32,
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub pos: Vec3,
    /// Almost always 1-4 entries; stack-allocated for the common case.
    pub weights: smallvec::SmallVec<[BoneWeight; 4]>,
}

#[derive(Debug, Clone)]
pub struct Triangle {
    pub vert_index: [u32; 3],
    pub uv_index: [u32; 3],
    pub light_uv_index: Option<[u32; 3]>,
    pub color_index: [u32; 3],
    pub alpha_index: Option<[u32; 3]>,
    pub normals: [Vec3; 3],
    pub submaterial_index: u32,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub attrs: Attrs,
    pub material_index: i32,
    pub vertices: Vec<Vertex>,
    pub uvs: Vec<Vec2>,
    pub light_uvs: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec3>>,
    pub alphas: Option<Vec<f32>>,
    pub triangles: Vec<Triangle>,
    /// Populated later by the scene builder from a sibling OPR file, if any.
    pub opr: Option<crate::formats::opr::OprOverlay>,
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub id: i32,
    pub parent: i32,
    pub pos: Vec3,
    pub rotq: Quat,
}

#[derive(Debug, Clone)]
pub struct Pol {
    pub version: u32,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub bones: Vec<Bone>,
}

fn read_cstr_utf8(cur: &mut ByteCursor) -> Result<String> {
    let bytes = cur.cstr(None)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Scans a name for `(token)` runs; used for both material and mesh attrs.
fn parse_attrs(name: &str) -> Attrs {
    let mut attrs = HashSet::new();
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            if let Some(end) = name[i + 1..].find(')') {
                attrs.insert(name[i + 1..i + 1 + end].to_string());
                i = i + 1 + end + 1;
                continue;
            }
        }
        i += 1;
    }
    attrs
}

fn parse_material(cur: &mut ByteCursor, can_have_children: bool) -> Result<Material> {
    let name = read_cstr_utf8(cur)?;
    let attrs = parse_attrs(&name);

    let nr_textures = cur.u32_le()?;
    let mut textures = HashMap::with_capacity(nr_textures as usize);
    for _ in 0..nr_textures {
        let filename = read_cstr_utf8(cur)?;
        let role_raw = cur.u32_le()?;
        match TextureRole::from_u32(role_raw) {
            Some(role) => {
                if textures.contains_key(&role) {
                    return Err(ErrorKind::DuplicateTextureRole(role_raw).into());
                }
                textures.insert(role, filename);
            }
            None => {
                warn!("pol: material {:?} has unknown texture role {}", name, role_raw);
            }
        }
    }
    if !textures.is_empty() && !textures.contains_key(&TextureRole::ColorMap) {
        return Err(ErrorKind::MissingColorMap.into());
    }

    let mut children = Vec::new();
    if can_have_children {
        let nr_children = cur.u32_le()?;
        if nr_children > 0 && !textures.is_empty() {
            return Err(ErrorKind::MaterialHasBothTexturesAndChildren.into());
        }
        for _ in 0..nr_children {
            children.push(parse_material(cur, false)?);
        }
    }

    Ok(Material { name, attrs, textures, children })
}

fn parse_mesh(
    cur: &mut ByteCursor,
    version: u32,
    nr_materials: u32,
    materials: &[Material],
) -> Result<Option<Mesh>> {
    let type_tag = cur.i32_le()?;
    match type_tag {
        -1 => return Ok(None),
        0 => {}
        other => return Err(ErrorKind::NotImplemented(format!("pol mesh type {}", other)).into()),
    }

    let name = read_cstr_utf8(cur)?;
    let attrs = parse_attrs(&name);

    let material_index = cur.i32_le()?;
    crate::check!(
        material_index >= -1 && material_index < nr_materials as i32,
        ErrorKind::IndexOutOfRange("mesh material_index".into(), material_index as i64, nr_materials as usize)
    );

    let nr_vertices = cur.u32_le()?;
    let mut vertices = Vec::with_capacity(nr_vertices as usize);
    for _ in 0..nr_vertices {
        let x = cur.f32_le()?;
        let y = cur.f32_le()?;
        let z = cur.f32_le()?;
        let pos = convert_position(x, y, z);

        let mut weights: smallvec::SmallVec<[BoneWeight; 4]> = smallvec::SmallVec::new();
        if version == 1 {
            let nr_weights = cur.u32_le()?;
            for _ in 0..nr_weights {
                let bone = cur.u32_le()?;
                let weight = cur.f32_le()?;
                weights.push(BoneWeight { bone, weight });
            }
        } else {
            let nr_weights = cur.u16_le()?;
            for _ in 0..nr_weights {
                let bone = cur.u16_le()? as u32;
                let weight = cur.f32_le()?;
                weights.push(BoneWeight { bone, weight });
            }
        }
        weights.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

        vertices.push(Vertex { pos, weights });
    }

    let nr_uvs = cur.u32_le()?;
    let mut uvs = Vec::with_capacity(nr_uvs as usize);
    for _ in 0..nr_uvs {
        let u = cur.f32_le()?;
        let v = cur.f32_le()?;
        uvs.push(Vec2::new(u, -v));
    }

    let nr_light_uvs = cur.u32_le()?;
    let light_uvs = if nr_light_uvs > 0 {
        let mut t = Vec::with_capacity(nr_light_uvs as usize);
        for _ in 0..nr_light_uvs {
            let u = cur.f32_le()?;
            let v = cur.f32_le()?;
            t.push(Vec2::new(u, -v));
        }
        Some(t)
    } else {
        None
    };

    let nr_colors = cur.u32_le()?;
    let colors = if nr_colors > 0 {
        let mut t = Vec::with_capacity(nr_colors as usize);
        if version == 1 {
            for _ in 0..nr_colors {
                let r = cur.f32_le()?;
                let g = cur.f32_le()?;
                let b = cur.f32_le()?;
                t.push(Vec3::new(r, g, b));
            }
        } else {
            for _ in 0..nr_colors {
                let r = cur.u8()?;
                let g = cur.u8()?;
                let b = cur.u8()?;
                let a = cur.u8()?;
                if a != 255 {
                    warn!("pol: mesh {:?} vertex color alpha {} is not opaque", name, a);
                }
                t.push(Vec3::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0));
            }
        }
        Some(t)
    } else {
        None
    };

    let alphas = if version == 2 {
        let nr_alphas = cur.u32_le()?;
        if nr_alphas > 0 {
            let mut t = Vec::with_capacity(nr_alphas as usize);
            for _ in 0..nr_alphas {
                t.push(cur.u8()? as f32 / 255.0);
            }
            Some(t)
        } else {
            None
        }
    } else {
        None
    };

    let child_count = if material_index >= 0 {
        materials[material_index as usize].children.len()
    } else {
        0
    };

    let nr_triangles = cur.u32_le()?;
    let mut triangles = Vec::with_capacity(nr_triangles as usize);
    for _ in 0..nr_triangles {
        let mut vert_index = [0u32; 3];
        for slot in vert_index.iter_mut() {
            let idx = cur.u32_le()?;
            crate::check!(
                (idx as usize) < vertices.len(),
                ErrorKind::IndexOutOfRange("triangle vert_index".into(), idx as i64, vertices.len())
            );
            *slot = idx;
        }

        let mut uv_index = [0u32; 3];
        for slot in uv_index.iter_mut() {
            let idx = cur.u32_le()?;
            crate::check!(
                (idx as usize) < uvs.len(),
                ErrorKind::IndexOutOfRange("triangle uv_index".into(), idx as i64, uvs.len())
            );
            *slot = idx;
        }

        let light_uv_index = if nr_light_uvs > 0 {
            let mut a = [0u32; 3];
            for slot in a.iter_mut() {
                let raw = cur.u32_le()?;
                let adj = raw.wrapping_sub(nr_uvs);
                crate::check!(
                    (adj as usize) < nr_light_uvs as usize,
                    ErrorKind::IndexOutOfRange("triangle light_uv_index".into(), raw as i64, nr_light_uvs as usize)
                );
                *slot = adj;
            }
            Some(a)
        } else {
            None
        };

        let mut color_index = [0u32; 3];
        for slot in color_index.iter_mut() {
            let idx = cur.u32_le()?;
            crate::check!(
                nr_colors == 0 || (idx as usize) < nr_colors as usize,
                ErrorKind::IndexOutOfRange("triangle color_index".into(), idx as i64, nr_colors as usize)
            );
            *slot = idx;
        }

        let alpha_index = if let Some(ref a) = alphas {
            let mut idxs = [0u32; 3];
            for slot in idxs.iter_mut() {
                let idx = cur.u32_le()?;
                crate::check!(
                    (idx as usize) < a.len(),
                    ErrorKind::IndexOutOfRange("triangle alpha_index".into(), idx as i64, a.len())
                );
                *slot = idx;
            }
            Some(idxs)
        } else {
            None
        };

        let mut normals = [Vec3::new(0.0, 0.0, 0.0); 3];
        for slot in normals.iter_mut() {
            let x = cur.f32_le()?;
            let y = cur.f32_le()?;
            let z = cur.f32_le()?;
            *slot = convert_direction(x, y, z);
        }

        let mut submaterial_index = cur.u32_le()?;
        if submaterial_index as usize >= child_count {
            if submaterial_index != 0 {
                warn!(
                    "pol: mesh {:?} triangle submaterial_index {} clamped ({} children)",
                    name, submaterial_index, child_count
                );
            }
            submaterial_index = 0;
        }

        triangles.push(Triangle {
            vert_index,
            uv_index,
            light_uv_index,
            color_index,
            alpha_index,
            normals,
            submaterial_index,
        });
    }

    if version == 1 {
        let a = cur.u32_le()?;
        let b = cur.u32_le()?;
        if (a, b) != (1, 0) {
            return Err(ErrorKind::UnexpectedFooter(format!("pol mesh {:?}", name)).into());
        }
    }

    Ok(Some(Mesh {
        name,
        attrs,
        material_index,
        vertices,
        uvs,
        light_uvs,
        colors,
        alphas,
        triangles,
        opr: None,
    }))
}

fn parse_bone(cur: &mut ByteCursor) -> Result<Bone> {
    let name = read_cstr_utf8(cur)?;
    let id = cur.i32_le()?;
    let parent = cur.i32_le()?;
    let x = cur.f32_le()?;
    let y = cur.f32_le()?;
    let z = cur.f32_le()?;
    let pos = convert_position(x, y, z);
    let w = cur.f32_le()?;
    let qx = cur.f32_le()?;
    let qy = cur.f32_le()?;
    let qz = cur.f32_le()?;
    let rotq = convert_quaternion(w, qx, qy, qz);
    Ok(Bone { name, id, parent, pos, rotq })
}

pub fn decode(buf: &[u8]) -> Result<Pol> {
    let mut cur = ByteCursor::new(buf);

    let magic = cur.fourcc()?;
    crate::check!(&magic == POL_MAGIC, ErrorKind::BadMagic("pol".into(), "POL\\0".into(), 0));
    let version = cur.u32_le()?;
    crate::check!(
        version == 1 || version == 2,
        ErrorKind::UnsupportedVersion("pol".into(), version as i64)
    );
    debug!("pol: version {}", version);

    let nr_materials = cur.u32_le()?;
    let mut materials = Vec::with_capacity(nr_materials as usize);
    for _ in 0..nr_materials {
        materials.push(parse_material(&mut cur, true)?);
    }
    debug!("pol: {} top-level materials", materials.len());

    let nr_meshes = cur.u32_le()?;
    let mut meshes = Vec::with_capacity(nr_meshes as usize);
    for _ in 0..nr_meshes {
        match parse_mesh(&mut cur, version, nr_materials, &materials)? {
            Some(mesh) => meshes.push(mesh),
            None => debug!("pol: skipping null mesh placeholder"),
        }
    }
    debug!("pol: {} meshes", meshes.len());

    let nr_bones = cur.u32_le()?;
    let mut bones = Vec::with_capacity(nr_bones as usize);
    for _ in 0..nr_bones {
        bones.push(parse_bone(&mut cur)?);
    }
    for bone in &bones {
        crate::check!(
            bone.parent < 0 || bones.iter().any(|b| b.id == bone.parent),
            ErrorKind::IndexOutOfRange("bone parent".into(), bone.parent as i64, bones.len())
        );
    }
    debug!("pol: {} bones", bones.len());

    if cur.offset() != cur.len() {
        warn!("pol: {} trailing bytes after parse", cur.len() - cur.offset());
    }

    Ok(Pol { version, materials, meshes, bones })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32le(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn i32le(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn f32le(v: f32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn cstr(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    struct Writer(Vec<u8>);
    impl Writer {
        fn new() -> Writer {
            Writer(Vec::new())
        }
        fn bytes(&mut self, b: &[u8]) -> &mut Self {
            self.0.extend_from_slice(b);
            self
        }
        fn u32(&mut self, v: u32) -> &mut Self {
            self.bytes(&u32le(v))
        }
        fn i32(&mut self, v: i32) -> &mut Self {
            self.bytes(&i32le(v))
        }
        fn f32(&mut self, v: f32) -> &mut Self {
            self.bytes(&f32le(v))
        }
        fn cstr(&mut self, s: &str) -> &mut Self {
            self.bytes(&cstr(s))
        }
    }

    fn colormap_material(w: &mut Writer) {
        w.cstr("mat").u32(1).cstr("tex.qnt").u32(1).u32(0);
    }

    #[test]
    fn empty_pol_v1() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1).u32(0).u32(0).u32(0);
        let pol = decode(&w.0).unwrap();
        assert_eq!(pol.version, 1);
        assert!(pol.materials.is_empty());
        assert!(pol.meshes.is_empty());
        assert!(pol.bones.is_empty());
    }

    #[test]
    fn v1_one_triangle_mesh() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1);
        w.u32(1); // nr_materials
        colormap_material(&mut w);
        w.u32(1); // nr_meshes
        w.i32(0); // mesh present
        w.cstr("tri");
        w.i32(0); // material_index
        w.u32(3); // nr_vertices
        for i in 0..3 {
            w.f32(i as f32).f32(0.0).f32(0.0);
            w.u32(0); // nr_weights (v1)
        }
        w.u32(3); // nr_uvs
        for _ in 0..3 {
            w.f32(0.0).f32(0.0);
        }
        w.u32(0); // nr_light_uvs
        w.u32(0); // nr_colors
        w.u32(1); // nr_triangles
        w.u32(0).u32(1).u32(2); // vert_index
        w.u32(0).u32(1).u32(2); // uv_index
        // no light uv index (nr_light_uvs == 0)
        w.u32(0).u32(0).u32(0); // color_index (unchecked, nr_colors == 0)
        // no alpha index (v1 has no alpha table)
        for _ in 0..3 {
            w.f32(0.0).f32(1.0).f32(0.0); // normal
        }
        w.u32(0); // submaterial_index
        w.u32(1).u32(0); // v1 footer
        w.u32(0); // nr_bones

        let pol = decode(&w.0).unwrap();
        assert_eq!(pol.meshes.len(), 1);
        let mesh = &pol.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangles.len(), 1);
        assert_eq!(mesh.triangles[0].submaterial_index, 0);
    }

    #[test]
    fn v1_missing_footer_fails() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1);
        w.u32(0); // nr_materials
        w.u32(1); // nr_meshes
        w.i32(0);
        w.cstr("m");
        w.i32(-1); // no material
        w.u32(0); // nr_vertices
        w.u32(0); // nr_uvs
        w.u32(0); // nr_light_uvs
        w.u32(0); // nr_colors
        w.u32(0); // nr_triangles
        w.u32(9).u32(9); // wrong footer
        w.u32(0); // nr_bones

        let err = decode(&w.0).unwrap_err();
        match err.0 {
            ErrorKind::UnexpectedFooter(_) => {}
            other => panic!("expected UnexpectedFooter, got {:?}", other),
        }
    }

    #[test]
    fn null_mesh_placeholder_is_skipped() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1);
        w.u32(0); // nr_materials
        w.u32(1); // nr_meshes
        w.i32(-1); // null placeholder
        w.u32(0); // nr_bones

        let pol = decode(&w.0).unwrap();
        assert!(pol.meshes.is_empty());
    }

    #[test]
    fn duplicate_texture_role_fails() {
        let mut w = Writer::new();
        w.cstr("mat").u32(2);
        w.cstr("a.qnt").u32(1);
        w.cstr("b.qnt").u32(1);
        w.u32(0); // nr_children
        let mut cur = ByteCursor::new(&w.0);
        let err = parse_material(&mut cur, true).unwrap_err();
        match err.0 {
            ErrorKind::DuplicateTextureRole(1) => {}
            other => panic!("expected DuplicateTextureRole, got {:?}", other),
        }
    }

    #[test]
    fn material_with_textures_and_children_fails() {
        let mut w = Writer::new();
        w.cstr("mat").u32(1);
        w.cstr("a.qnt").u32(1);
        w.u32(1); // nr_children
        colormap_material(&mut w);
        let mut cur = ByteCursor::new(&w.0);
        let err = parse_material(&mut cur, true).unwrap_err();
        match err.0 {
            ErrorKind::MaterialHasBothTexturesAndChildren => {}
            other => panic!("expected MaterialHasBothTexturesAndChildren, got {:?}", other),
        }
    }

    #[test]
    fn material_without_colormap_fails() {
        let mut w = Writer::new();
        w.cstr("mat").u32(1);
        w.cstr("spec.qnt").u32(4); // SpecularMask only
        w.u32(0);
        let mut cur = ByteCursor::new(&w.0);
        let err = parse_material(&mut cur, true).unwrap_err();
        match err.0 {
            ErrorKind::MissingColorMap => {}
            other => panic!("expected MissingColorMap, got {:?}", other),
        }
    }

    #[test]
    fn material_attrs_parsed_from_name_tokens() {
        let m = parse_attrs("body (alpha) (env)");
        assert!(m.contains("alpha"));
        assert!(m.contains("env"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn bone_with_unknown_parent_fails() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1);
        w.u32(0).u32(0); // no materials, no meshes
        w.u32(1); // nr_bones
        w.cstr("hip").i32(0).i32(5); // parent 5 doesn't exist
        w.f32(0.0).f32(0.0).f32(0.0);
        w.f32(1.0).f32(0.0).f32(0.0).f32(0.0);

        let err = decode(&w.0).unwrap_err();
        match err.0 {
            ErrorKind::IndexOutOfRange(ref what, 5, _) if what == "bone parent" => {}
            other => panic!("expected IndexOutOfRange for bone parent, got {:?}", other),
        }
    }

    #[test]
    fn v2_weight_counts_use_u16() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(2);
        w.u32(1); // nr_materials
        colormap_material(&mut w);
        w.u32(1); // nr_meshes
        w.i32(0);
        w.cstr("skinned");
        w.i32(0);
        w.u32(1); // nr_vertices
        w.f32(0.0).f32(0.0).f32(0.0);
        w.bytes(&(2u16).to_le_bytes()); // nr_weights (v2, u16)
        w.bytes(&(0u16).to_le_bytes()).f32(0.6);
        w.bytes(&(1u16).to_le_bytes()).f32(0.4);
        w.u32(0); // nr_uvs
        w.u32(0); // nr_light_uvs
        w.u32(0); // nr_colors
        w.u32(0); // nr_alphas (v2 only)
        w.u32(0); // nr_triangles
        w.u32(0); // nr_bones

        let pol = decode(&w.0).unwrap();
        let mesh = &pol.meshes[0];
        assert_eq!(mesh.vertices[0].weights.len(), 2);
        assert_eq!(mesh.vertices[0].weights[0].weight, 0.6);
    }

    #[test]
    fn mesh_material_index_out_of_range_fails() {
        let mut w = Writer::new();
        w.bytes(POL_MAGIC).u32(1);
        w.u32(0); // nr_materials
        w.u32(1); // nr_meshes
        w.i32(0);
        w.cstr("bad");
        w.i32(0); // material_index 0, but nr_materials == 0
        let err = decode(&w.0).unwrap_err();
        match err.0 {
            ErrorKind::IndexOutOfRange(ref what, 0, 0) if what == "mesh material_index" => {}
            other => panic!("expected IndexOutOfRange, got {:?}", other),
        }
    }
}
