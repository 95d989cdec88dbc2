//! Skeleton construction, material resolution, mesh flattening, and motion
//! playback. These are free functions rather than a stateful builder
//! object: nothing here needs to survive between calls except the
//! `Scene`/`Skeleton` the caller already owns.

use cgmath::{Matrix, SquareMatrix};
use log::warn;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{ErrorKind, Result};
use crate::formats::mot::Mot;
use crate::formats::opr::{OprFile, OprOverlay};
use crate::formats::pol;
use crate::io::{BlobSource, SceneSink};
use crate::math::{Mat4, Quat, Vec2, Vec3};

use super::types::{
    ColorSlot, Geometry, Group, Joint, Material, MaterialKind, MeshEffects, Scene, SceneMesh, Skeleton,
};

fn joint_local_matrix(pos: Vec3, rot: Quat) -> Mat4 {
    Mat4::from(rot) * Mat4::from_translation(pos)
}

/// Inverts `joint_local_matrix`: `m` is `R * T(pos)`, so the translation
/// column holds `R * pos`, not `pos` itself; un-rotate it by `R^T` (valid
/// since `R` is orthonormal) to recover `pos`.
fn decompose(m: Mat4) -> (Vec3, Quat) {
    let rot3 = cgmath::Matrix3::new(
        m.x.x, m.x.y, m.x.z, //
        m.y.x, m.y.y, m.y.z, //
        m.z.x, m.z.y, m.z.z,
    );
    let translation = Vec3::new(m.w.x, m.w.y, m.w.z);
    let pos = rot3.transpose() * translation;
    (pos, Quat::from(rot3))
}

/// Builds a bind-pose skeleton from a POL bone list. Detects cyclic parent
/// references by topological sort rather than risking unbounded recursion
/// on malformed input.
pub fn build_skeleton(bones: &[pol::Bone]) -> Result<Skeleton> {
    let mut id_index = std::collections::HashMap::with_capacity(bones.len());
    for (i, b) in bones.iter().enumerate() {
        id_index.insert(b.id, i);
    }

    let mut parent_of = vec![None; bones.len()];
    for (i, b) in bones.iter().enumerate() {
        if b.parent >= 0 {
            let p = *id_index
                .get(&b.parent)
                .ok_or_else(|| ErrorKind::IndexOutOfRange("bone parent".into(), b.parent as i64, bones.len()))?;
            parent_of[i] = Some(p);
        }
    }

    let mut graph = DiGraph::<(), ()>::with_capacity(bones.len(), bones.len());
    let nodes: Vec<_> = (0..bones.len()).map(|_| graph.add_node(())).collect();
    for (i, p) in parent_of.iter().enumerate() {
        if let Some(p) = p {
            graph.add_edge(nodes[*p], nodes[i], ());
        }
    }
    let order = toposort(&graph, None)
        .map_err(|_| ErrorKind::NotImplemented("cyclic bone hierarchy".into()))?;

    let mut world = vec![Mat4::identity(); bones.len()];
    for node in order {
        let i = node.index();
        let local = joint_local_matrix(bones[i].pos, bones[i].rotq);
        world[i] = match parent_of[i] {
            Some(p) => world[p] * local,
            None => local,
        };
    }

    let mut joints = Vec::with_capacity(bones.len());
    for (i, b) in bones.iter().enumerate() {
        let inverse_bind = world[i]
            .invert()
            .ok_or_else(|| ErrorKind::NotImplemented(format!("singular bind matrix for bone {:?}", b.name)))?;

        let parent_world = match parent_of[i] {
            Some(p) => world[p],
            None => Mat4::identity(),
        };
        let parent_world_inv = parent_world
            .invert()
            .ok_or_else(|| ErrorKind::NotImplemented(format!("singular bind matrix for bone {:?}", b.name)))?;
        let (local_pos, local_rot) = decompose(parent_world_inv * world[i]);

        joints.push(Joint {
            name: b.name.clone(),
            id: b.id,
            parent: parent_of[i],
            local_pos,
            local_rot,
            inverse_bind,
        });
    }

    Ok(Skeleton::new(joints))
}

/// Resolves one POL material (and, if it has children, each child) into
/// renderable materials for a mesh that uses it. Whether a color map
/// becomes `map` or `matcap` depends on the *mesh*'s `env` attribute, so
/// this is evaluated per mesh usage rather than cached globally.
pub fn resolve_materials_for_mesh(
    pol_material: &pol::Material,
    mesh_attrs: &pol::Attrs,
    blob: &dyn BlobSource,
) -> Result<Vec<Material>> {
    if !pol_material.children.is_empty() {
        pol_material
            .children
            .iter()
            .map(|child| resolve_one_material(child, mesh_attrs, blob))
            .collect()
    } else {
        Ok(vec![resolve_one_material(pol_material, mesh_attrs, blob)?])
    }
}

fn resolve_one_material(m: &pol::Material, mesh_attrs: &pol::Attrs, blob: &dyn BlobSource) -> Result<Material> {
    let is_env = mesh_attrs.contains("env");

    let color_name = m.textures.get(&pol::TextureRole::ColorMap);
    let color = match color_name {
        Some(name) => {
            let base = name.trim_end_matches(".qnt");
            let frames = blob.load_image_list(base)?;
            if frames.is_empty() {
                ColorSlot::single(blob.load_image(name)?)
            } else {
                ColorSlot { frames, current_frame: 0 }
            }
        }
        None => {
            warn!("pol: material {:?} has no ColorMap texture", m.name);
            ColorSlot { frames: Vec::new(), current_frame: 0 }
        }
    };

    let normal_map = match m.textures.get(&pol::TextureRole::NormalMap) {
        Some(name) => Some(blob.load_image(name)?),
        None => None,
    };
    let light_map = match m.textures.get(&pol::TextureRole::LightMap) {
        Some(name) => Some(blob.load_image(name)?),
        None => None,
    };

    let alpha_map_name = m.textures.get(&pol::TextureRole::AlphaMap);
    let alpha_map = match (alpha_map_name, color_name) {
        (Some(alpha_name), Some(color_name)) if alpha_name != color_name => Some(blob.load_image(alpha_name)?),
        (Some(alpha_name), None) => Some(blob.load_image(alpha_name)?),
        _ => None,
    };

    let transparent = alpha_map.is_some();
    let alpha_test = if !transparent && color.frames.first().map(|i| i.has_alpha).unwrap_or(false) {
        Some(0.1)
    } else {
        None
    };

    Ok(Material {
        kind: if is_env { MaterialKind::Matcap } else { MaterialKind::Phong },
        color,
        normal_map,
        light_map,
        light_map_intensity: 0.5,
        alpha_map,
        transparent,
        alpha_test,
        normal_scale: Vec2::new(1.0, -1.0),
    })
}

/// Flattens a mesh's indexed triangle soup into per-corner attribute
/// buffers, grouped by submaterial.
pub fn flatten_mesh(mesh: &pol::Mesh, nr_submaterials: usize, has_skeleton: bool) -> Geometry {
    let nr_groups = nr_submaterials.max(1);

    let mut order: Vec<usize> = (0..mesh.triangles.len()).collect();
    order.sort_by_key(|&i| mesh.triangles[i].submaterial_index);

    let mut geo = Geometry::default();
    if mesh.light_uvs.is_some() {
        geo.light_uvs = Some(Vec::with_capacity(order.len() * 3));
    }
    if has_skeleton {
        geo.skin_indices = Some(Vec::with_capacity(order.len() * 3));
        geo.skin_weights = Some(Vec::with_capacity(order.len() * 3));
    }

    let mut counts = vec![0u32; nr_groups];
    for &ti in &order {
        let tri = &mesh.triangles[ti];
        counts[tri.submaterial_index as usize] += 1;

        for corner in 0..3 {
            let vi = tri.vert_index[corner] as usize;
            geo.positions.push(mesh.vertices[vi].pos);
            geo.normals.push(tri.normals[corner]);
            geo.uvs.push(mesh.uvs[tri.uv_index[corner] as usize]);

            if let (Some(light_uvs), Some(light_idx)) = (&mesh.light_uvs, &tri.light_uv_index) {
                geo.light_uvs.as_mut().unwrap().push(light_uvs[light_idx[corner] as usize]);
            }

            let color = mesh
                .colors
                .as_ref()
                .map(|colors| colors[tri.color_index[corner] as usize])
                .unwrap_or(Vec3::new(1.0, 1.0, 1.0));
            geo.colors.push(color);

            let alpha = match (&mesh.alphas, &tri.alpha_index) {
                (Some(alphas), Some(idx)) => alphas[idx[corner] as usize],
                _ => 1.0,
            };
            geo.alphas.push(alpha);

            if has_skeleton {
                let mut idx = [0u32; 4];
                let mut w = [0f32; 4];
                for (k, bw) in mesh.vertices[vi].weights.iter().take(4).enumerate() {
                    idx[k] = bw.bone;
                    w[k] = bw.weight;
                }
                normalize_weights(&mut w);
                geo.skin_indices.as_mut().unwrap().push(idx);
                geo.skin_weights.as_mut().unwrap().push(w);
            }
        }
    }

    let mut start = 0u32;
    for sub in 0..nr_groups {
        let count = counts[sub] * 3;
        geo.groups.push(Group { start, count, material_index: sub as u32 });
        start += count;
    }

    geo
}

fn normalize_weights(w: &mut [f32; 4]) {
    let sum: f32 = w.iter().sum();
    if sum > 0.0 {
        for v in w.iter_mut() {
            *v /= sum;
        }
    }
}

/// Derives per-mesh rendering flags from its name tokens and its OPR
/// overlay, if any.
pub fn apply_opr_effects(mesh_name: &str, mesh_attrs: &pol::Attrs, opr: Option<&OprOverlay>, nr_submaterials: usize) -> MeshEffects {
    let mut effects = MeshEffects::default();
    if mesh_attrs.contains("alpha") {
        effects.transparent = true;
    }
    if mesh_attrs.contains("both") {
        effects.double_sided = true;
    }

    if let Some(opr) = opr {
        effects.additive_blending = opr.additive_blending;
        effects.no_edge = opr.no_edge;
        if let Some(uv) = opr.uv_scroll {
            if nr_submaterials <= 1 {
                effects.uv_scroll = Some(uv);
            } else {
                warn!("pol: mesh {:?} has uv_scroll but more than one submaterial; ignoring", mesh_name);
            }
        }
    }

    effects
}

/// Applies a single frame of motion to a skeleton's local joint transforms.
/// `frame_count <= 1` means no real animation data; hold the bind pose.
pub fn apply_motion(skeleton: &mut Skeleton, mot: &Mot, frame_counter: u32) {
    if mot.frame_count <= 1 {
        return;
    }
    let i = (frame_counter % (mot.frame_count - 1)) + 1;

    for bm in &mot.bones {
        match skeleton.find_joint(&bm.name, bm.id) {
            Some(joint_index) => {
                let frame = &bm.frames[i as usize];
                skeleton.joints[joint_index].local_pos = frame.pos;
                skeleton.joints[joint_index].local_rot = frame.rotq;
            }
            None => warn!("mot: no joint matches bone {:?} (id {})", bm.name, bm.id),
        }
    }
}

/// Picks this frame's texture-animation index for a `loadTxa` table and
/// returns it, clamped to the table if out of range, or `None` for an
/// empty table.
pub fn texture_animation_index(txa: &[i64], frame_counter: u32) -> Option<usize> {
    if txa.is_empty() {
        return None;
    }
    let raw = txa[frame_counter as usize % txa.len()];
    Some(raw.clamp(0, txa.len() as i64 - 1) as usize)
}

/// Drives the two per-frame motion-application effects that aren't joint
/// poses: UV scroll (step 1) and texture-animation-table swaps (step 3).
/// Step 2, bone motion, is `apply_motion`. `material_handles` must be
/// indexed the same way as `scene.materials` (the order `build_scene`
/// appended them in).
pub fn apply_frame_effects<S: SceneSink>(
    scene: &mut Scene,
    sink: &mut S,
    material_handles: &[S::Material],
    txa: &[i64],
    frame_counter: u32,
) {
    let t = frame_counter as f32 / 30.0;
    for mesh in &scene.meshes {
        if let Some((u, v)) = mesh.effects.uv_scroll {
            if let [mi] = mesh.material_indices[..] {
                sink.set_material_texture_offset(&material_handles[mi], (u * t, v * t));
            }
        }
    }

    if let Some(index) = texture_animation_index(txa, frame_counter) {
        for (mi, material) in scene.materials.iter_mut().enumerate() {
            if material.color.frames.len() > 1 {
                let clamped = index.min(material.color.frames.len() - 1);
                material.color.current_frame = clamped;
                let texture = sink.create_texture(&material.color.frames[clamped]);
                sink.set_material_texture(&material_handles[mi], &texture);
            }
        }
    }
}

/// Matches each mesh's OPR overlay by name and stores it on the mesh, so
/// that a later `build_scene` call can read it without taking the OPR
/// file as a separate argument. A mesh with no matching entry keeps `None`.
pub fn attach_opr_overlays(pol: &mut pol::Pol, opr_file: &OprFile) {
    for mesh in &mut pol.meshes {
        mesh.opr = opr_file.get(&mesh.name).cloned();
    }
}

/// Top-level entry point: turns a parsed POL into a renderer-neutral
/// [`Scene`], resolving and loading every texture it references along the
/// way. Call [`attach_opr_overlays`] first if the model has an OPR side
/// file; otherwise every mesh falls back to its bare name-token attributes.
pub fn build_scene(pol: &pol::Pol, blob: &dyn BlobSource) -> Result<Scene> {
    let skeleton = if pol.bones.is_empty() { None } else { Some(build_skeleton(&pol.bones)?) };
    let has_skeleton = skeleton.is_some();

    let mut scene = Scene { skeleton, materials: Vec::new(), meshes: Vec::new() };

    for mesh in &pol.meshes {
        let is_collision_hull = mesh.name == "collision";

        if mesh.material_index < 0 {
            if is_collision_hull {
                let geo = flatten_mesh(mesh, 1, has_skeleton);
                let effects = apply_opr_effects(&mesh.name, &mesh.attrs, mesh.opr.as_ref(), 1);
                scene.meshes.push(SceneMesh {
                    name: mesh.name.clone(),
                    geometry: geo,
                    material_indices: Vec::new(),
                    effects,
                    is_collision_hull,
                });
            } else {
                warn!("pol: mesh {:?} has no material; skipping", mesh.name);
            }
            continue;
        }

        let pol_material = &pol.materials[mesh.material_index as usize];
        let resolved = resolve_materials_for_mesh(pol_material, &mesh.attrs, blob)?;
        let nr_submaterials = resolved.len();

        let base_index = scene.materials.len();
        scene.materials.extend(resolved);
        let material_indices: Vec<usize> = (base_index..base_index + nr_submaterials).collect();

        let geo = flatten_mesh(mesh, nr_submaterials, has_skeleton);
        let effects = apply_opr_effects(&mesh.name, &mesh.attrs, mesh.opr.as_ref(), nr_submaterials);

        scene.meshes.push(SceneMesh {
            name: mesh.name.clone(),
            geometry: geo,
            material_indices,
            effects,
            is_collision_hull,
        });
    }

    Ok(scene)
}
