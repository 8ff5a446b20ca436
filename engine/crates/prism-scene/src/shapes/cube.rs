use glam::{UVec3, Vec2, Vec3};

use crate::components::mesh::MeshData;

/// 坐标系：RightHand, X-Right, Y-Up
///
/// 以原点为中心、边长为 2 的立方体，每个面 4 个独立顶点，法线朝外
///
/// 每个面的三角形绕序 CCW（从外侧看）
pub struct Cube;
impl Cube {
    /// (法线, 面内的 u 轴, 面内的 v 轴)，满足 u x v = normal
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    pub fn mesh_data() -> MeshData {
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut triangles = Vec::with_capacity(12);

        for (normal, u, v) in Self::FACES {
            let base = positions.len() as u32;
            for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                positions.push(normal + u * du + v * dv);
                normals.push(normal);
                uvs.push(Vec2::new((du + 1.0) * 0.5, (1.0 - dv) * 0.5));
            }
            triangles.push(UVec3::new(base, base + 1, base + 2));
            triangles.push(UVec3::new(base, base + 2, base + 3));
        }

        MeshData::new(positions, triangles).with_normals(normals).with_uvs(uvs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faces_point_outward() {
        let data = Cube::mesh_data();
        assert!(data.validate().is_ok());
        assert_eq!(data.triangle_count(), 12);
        for (tri, flat) in data.triangles.iter().zip(data.corner_normals_or_flat().chunks(3)) {
            let center = (data.positions[tri.x as usize] + data.positions[tri.y as usize] + data.positions[tri.z as usize]) / 3.0;
            assert!(flat[0].dot(center) > 0.0);
            assert!(flat[0].abs_diff_eq(data.normals[tri.x as usize], 1e-6));
        }
    }
}
