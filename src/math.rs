//! Scalar/vector/matrix aliases shared by every decoder and the scene builder.
//!
//! A renderer-neutral scene hands off plain `f32` data (the lingua franca of
//! GPU vertex buffers), so all the parsing layers in this crate convert down
//! to `f32` at read time rather than carrying `f64` through to the sink.

pub type Vec2 = cgmath::Vector2<f32>;
pub type Vec3 = cgmath::Vector3<f32>;
pub type Vec4 = cgmath::Vector4<f32>;
pub type Quat = cgmath::Quaternion<f32>;
pub type Mat4 = cgmath::Matrix4<f32>;

/// Reads a position in the source's left-handed, inch-scaled coordinate
/// system and returns it in this crate's right-handed, meter-scaled one.
///
/// Flips the z axis and scales by the inches-to-meters constant. Applied
/// uniformly at the parsing layer so nothing downstream ever needs to know
/// the source convention existed.
pub const INCHES_TO_METERS: f32 = 0.0254;

pub fn convert_position(x: f32, y: f32, z: f32) -> Vec3 {
    cgmath::vec3(x, y, -z) * INCHES_TO_METERS
}

pub fn convert_direction(x: f32, y: f32, z: f32) -> Vec3 {
    cgmath::vec3(x, y, -z)
}

pub fn convert_quaternion(w: f32, x: f32, y: f32, z: f32) -> Quat {
    cgmath::Quaternion::new(w, -x, -y, z)
}
