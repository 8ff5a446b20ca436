use glam::{UVec3, Vec2, Vec3};

use crate::components::mesh::MeshData;

/// 坐标系：RightHand, X-Right, Y-Up
///
/// 面片位于 XY 平面上，朝向 +Z，边长为 2
///
/// 三角形绕序 CCW: ABC, ACD
///
/// ```text
///             y^
///             |
///      D-------------C
///       |     |     |
/// ------|-----|-----|------>x
///       |     |     |
///      A-------------B
///             |
/// ```
pub struct Quad;
impl Quad {
    const POSITIONS: [Vec3; 4] = [
        glam::vec3(-1.0, -1.0, 0.0), // A
        glam::vec3(1.0, -1.0, 0.0),  // B
        glam::vec3(1.0, 1.0, 0.0),   // C
        glam::vec3(-1.0, 1.0, 0.0),  // D
    ];
    const UVS: [Vec2; 4] = [
        glam::vec2(0.0, 1.0), // A
        glam::vec2(1.0, 1.0), // B
        glam::vec2(1.0, 0.0), // C
        glam::vec2(0.0, 0.0), // D
    ];
    const TRIANGLES: [UVec3; 2] = [
        glam::uvec3(0, 1, 2), // ABC
        glam::uvec3(0, 2, 3), // ACD
    ];

    pub fn mesh_data() -> MeshData {
        MeshData::new(Self::POSITIONS.to_vec(), Self::TRIANGLES.to_vec())
            .with_normals(vec![Vec3::Z; 4])
            .with_uvs(Self::UVS.to_vec())
    }

    /// 位于 XZ 平面上，朝向 -Y，用作矩形光源的几何体
    ///
    /// 与 `LightShape::Rect { size: (2, 2) }` 的局部形状一致
    pub fn light_mesh_data() -> MeshData {
        let positions = Self::POSITIONS.map(|p| glam::vec3(p.x, 0.0, p.y)).to_vec();
        MeshData::new(positions, Self::TRIANGLES.to_vec())
            .with_normals(vec![Vec3::NEG_Y; 4])
            .with_uvs(Self::UVS.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winding_matches_normals() {
        for data in [Quad::mesh_data(), Quad::light_mesh_data()] {
            assert!(data.validate().is_ok());
            let flat = data.corner_normals_or_flat();
            for (flat, normal) in flat.iter().zip(data.triangles.iter().flat_map(|t| [t.x, t.y, t.z])) {
                assert!(flat.abs_diff_eq(data.normals[normal as usize], 1e-6));
            }
        }
    }
}
