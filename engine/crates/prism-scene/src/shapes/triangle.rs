use glam::{UVec3, Vec2, Vec3};

use crate::components::mesh::MeshData;

/// 坐标系：RightHand, X-Right, Y-Up
///
/// 位于 XY 平面上的正立三角形，法线 +Z
///
/// 三角形绕序: CCW
///
/// ```text
///          y^
///           |
///           C
///          /|\
///         / | \
///        /  |  \
///       /   |   \
///      /    |    \
///     /     |     \
///    A------+------B---->x
///           |
/// ```
pub struct Triangle;
impl Triangle {
    const POSITIONS: [Vec3; 3] = [
        glam::vec3(-1.0, -1.0, 0.0), // A
        glam::vec3(1.0, -1.0, 0.0),  // B
        glam::vec3(0.0, 1.0, 0.0),   // C
    ];

    const NORMALS: [Vec3; 3] = [glam::vec3(0.0, 0.0, 1.0); 3];

    const UVS: [Vec2; 3] = [
        glam::vec2(0.0, 1.0), // A
        glam::vec2(1.0, 1.0), // B
        glam::vec2(0.5, 0.0), // C
    ];

    pub fn mesh_data() -> MeshData {
        MeshData::new(Self::POSITIONS.to_vec(), vec![UVec3::new(0, 1, 2)])
            .with_normals(Self::NORMALS.to_vec())
            .with_uvs(Self::UVS.to_vec())
    }
}
