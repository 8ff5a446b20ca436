use glam::{UVec3, Vec2, Vec3};
use itertools::Itertools;
use prism_shader_binding::prismsl;

/// CPU 侧的三角形网格
///
/// 法线、uv、角点法线都是可选的，缺失时在上传前自动补全。
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    /// 为空或与 positions 等长
    pub normals: Vec<Vec3>,
    /// 为空或与 positions 等长
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<UVec3>,
    /// 为空或长度为 `3 * triangles.len()`
    pub corner_normals: Vec<Vec3>,
}
// new & init
impl MeshData {
    pub fn new(positions: Vec<Vec3>, triangles: Vec<UVec3>) -> Self {
        Self {
            positions,
            triangles,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn with_corner_normals(mut self, corner_normals: Vec<Vec3>) -> Self {
        self.corner_normals = corner_normals;
        self
    }
}
// getter
impl MeshData {
    /// 没有顶点或没有三角形
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.triangles.is_empty()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.is_empty() {
            anyhow::bail!(
                "mesh is empty: {} vertices, {} triangles",
                self.positions.len(),
                self.triangles.len()
            );
        }
        if self.positions.len() < 3 {
            anyhow::bail!("mesh needs at least 3 vertices, got {}", self.positions.len());
        }
        if !self.normals.is_empty() && self.normals.len() != self.positions.len() {
            anyhow::bail!("normal count {} != vertex count {}", self.normals.len(), self.positions.len());
        }
        if !self.uvs.is_empty() && self.uvs.len() != self.positions.len() {
            anyhow::bail!("uv count {} != vertex count {}", self.uvs.len(), self.positions.len());
        }
        if !self.corner_normals.is_empty() && self.corner_normals.len() != self.triangles.len() * 3 {
            anyhow::bail!(
                "corner normal count {} != 3 * triangle count {}",
                self.corner_normals.len(),
                self.triangles.len()
            );
        }
        let vertex_count = self.positions.len() as u32;
        if let Some((idx, tri)) = self.triangles.iter().find_position(|tri| tri.x.max(tri.y).max(tri.z) >= vertex_count) {
            anyhow::bail!("triangle {idx} {tri:?} references a vertex out of range ({vertex_count} vertices)");
        }
        if let Some(idx) = self.positions.iter().position(|p| !p.is_finite()) {
            anyhow::bail!("vertex {idx} is not finite");
        }
        Ok(())
    }
}
// tools
impl MeshData {
    #[inline]
    fn face_normal(&self, tri: UVec3) -> Vec3 {
        let [a, b, c] = [tri.x, tri.y, tri.z].map(|i| self.positions[i as usize]);
        (b - a).cross(c - a)
    }

    /// 缺失的顶点法线使用面积加权的面法线
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        if !self.normals.is_empty() {
            return self.normals.iter().map(|n| n.normalize_or_zero()).collect();
        }
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in &self.triangles {
            let n = self.face_normal(*tri);
            for i in [tri.x, tri.y, tri.z] {
                normals[i as usize] += n;
            }
        }
        normals.into_iter().map(|n| n.normalize_or_zero()).collect()
    }

    /// 缺失的角点法线使用平面法线
    pub fn corner_normals_or_flat(&self) -> Vec<Vec3> {
        if !self.corner_normals.is_empty() {
            return self.corner_normals.iter().map(|n| n.normalize_or_zero()).collect();
        }
        self.triangles
            .iter()
            .flat_map(|tri| {
                let n = self.face_normal(*tri).normalize_or_zero();
                [n, n, n]
            })
            .collect()
    }

    pub fn to_vertices(&self) -> Vec<prismsl::Vertex> {
        let normals = self.vertex_normals();
        self.positions
            .iter()
            .enumerate()
            .map(|(i, p)| prismsl::Vertex::new(*p, normals[i], self.uvs.get(i).copied().unwrap_or(Vec2::ZERO)))
            .collect()
    }
}
