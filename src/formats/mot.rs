//! MOT — per-bone keyframe animation.
//!
//! A motion file carries no reference to the POL it animates; matching
//! bones by name or id, and tolerating a mismatched skeleton, is the
//! scene builder's job, not this parser's.

use log::debug;

use crate::byte_cursor::ByteCursor;
use crate::error::{ErrorKind, Result};
use crate::math::{convert_position, convert_quaternion, Quat, Vec3};

const MOT_MAGIC: &[u8; 4] = b"MOT\0";

#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub pos: Vec3,
    pub rotq: Quat,
    /// Present in every frame, semantics unestablished; preserved verbatim.
    pub aux_rotq: Quat,
}

#[derive(Debug, Clone)]
pub struct BoneMotion {
    pub name: String,
    pub id: u32,
    pub parent: u32,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone)]
pub struct Mot {
    pub frame_count: u32,
    pub bones: Vec<BoneMotion>,
}

fn read_quat(cur: &mut ByteCursor) -> Result<Quat> {
    let w = cur.f32_le()?;
    let x = cur.f32_le()?;
    let y = cur.f32_le()?;
    let z = cur.f32_le()?;
    Ok(convert_quaternion(w, x, y, z))
}

pub fn decode(buf: &[u8]) -> Result<Mot> {
    let mut cur = ByteCursor::new(buf);

    let magic = cur.fourcc()?;
    crate::check!(&magic == MOT_MAGIC, ErrorKind::BadMagic("mot".into(), "MOT\\0".into(), 0));
    let version = cur.u32_le()?;
    crate::check!(version == 0, ErrorKind::UnsupportedVersion("mot".into(), version as i64));
    let frame_count = cur.u32_le()?;
    let bone_count = cur.u32_le()?;
    debug!("mot: frame_count={} bone_count={}", frame_count, bone_count);

    let mut bones = Vec::with_capacity(bone_count as usize);
    for _ in 0..bone_count {
        let name = {
            let bytes = cur.cstr(None)?;
            String::from_utf8_lossy(&bytes).into_owned()
        };
        let id = cur.u32_le()?;
        let parent = cur.u32_le()?;

        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let x = cur.f32_le()?;
            let y = cur.f32_le()?;
            let z = cur.f32_le()?;
            let pos = convert_position(x, y, z);
            let rotq = read_quat(&mut cur)?;
            let aux_rotq = read_quat(&mut cur)?;
            frames.push(Frame { pos, rotq, aux_rotq });
        }

        bones.push(BoneMotion { name, id, parent, frames });
    }

    Ok(Mot { frame_count, bones })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32le(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }
    fn f32le(v: f32) -> [u8; 4] {
        v.to_le_bytes()
    }

    #[test]
    fn two_bones_three_frames() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MOT_MAGIC);
        buf.extend_from_slice(&u32le(0)); // version
        buf.extend_from_slice(&u32le(3)); // frame_count
        buf.extend_from_slice(&u32le(2)); // bone_count

        for (name, id) in [("hip", 0u32), ("knee", 1u32)] {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(&u32le(id));
            buf.extend_from_slice(&u32le(if id == 0 { u32::MAX } else { 0 })); // parent (-1 for hip)
            for _ in 0..3 {
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(1.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(1.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
                buf.extend_from_slice(&f32le(0.0));
            }
        }

        let mot = decode(&buf).unwrap();
        assert_eq!(mot.frame_count, 3);
        assert_eq!(mot.bones.len(), 2);
        assert_eq!(mot.bones[0].name, "hip");
        assert_eq!(mot.bones[0].frames.len(), 3);
        assert_eq!(mot.bones[1].name, "knee");
    }

    #[test]
    fn bad_magic_fails() {
        let buf = b"XXXX".to_vec();
        assert!(decode(&buf).is_err());
    }
}
