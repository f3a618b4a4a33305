//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the few helpers the sprite pipeline needs.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Orthographic projection covering `[0, width] x [0, height]` with the origin
/// at the bottom-left corner.
pub fn orthographic(width: f32, height: f32) -> Mat4 {
    Mat4::new_orthographic(0.0, width, 0.0, height, -1.0, 1.0)
}

/// Column-major array form of a matrix, as laid out in push constants.
pub fn mat4_to_cols(m: &Mat4) -> [[f32; 4]; 4] {
    let mut out = [[0.0; 4]; 4];
    for (c, column) in out.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    out
}

/// Rotate `point` around `center` by `radians` (counter-clockwise).
pub fn rotate_about(point: Vec2, center: Vec2, radians: f32) -> Vec2 {
    let (sin, cos) = radians.sin_cos();
    let d = point - center;
    Vec2::new(center.x + d.x * cos - d.y * sin, center.y + d.x * sin + d.y * cos)
}
