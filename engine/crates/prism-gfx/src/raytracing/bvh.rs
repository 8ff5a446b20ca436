//! 通用 BVH：BLAS（三角形）与 TLAS（instance）共用
//!
//! 节点按扁平数组存储：
//! - 内部节点：`left_or_first` 为左孩子下标，右孩子紧随其后，`count == 0`
//! - 叶子节点：`left_or_first` 为 `indices` 中的起始位置，`count > 0`

use glam::{Mat4, Vec2, Vec3};

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}
impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::EMPTY;
        points.iter().for_each(|p| aabb.grow_point(*p));
        aabb
    }

    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// 0=x, 1=y, 2=z
    #[inline]
    pub fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// 变换 8 个角点后重新求包围盒
    pub fn transform(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut aabb = Self::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            aabb.grow_point(matrix.transform_point3(corner));
        }
        aabb
    }

    /// slab test，返回进入距离
    ///
    /// `inv_dir` 中的无穷大分量会产生 NaN，`f32::min/max` 会忽略 NaN，因此平面包围盒不会被误剔除
    #[inline]
    pub fn intersect_ray(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let mut t_enter = t_min;
        let mut t_exit = t_max;
        for axis in 0..3 {
            t_enter = t_enter.max(t0[axis].min(t1[axis]));
            t_exit = t_exit.min(t0[axis].max(t1[axis]));
        }
        (t_enter <= t_exit).then_some(t_enter)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BvhNode {
    pub aabb_min: Vec3,
    pub left_or_first: u32,
    pub aabb_max: Vec3,
    pub count: u32,
}
impl BvhNode {
    #[inline]
    fn aabb(&self) -> Aabb {
        Aabb {
            min: self.aabb_min,
            max: self.aabb_max,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    /// 叶子节点引用的图元下标
    indices: Vec<u32>,
}
// new & init
impl Bvh {
    const MAX_LEAF_SIZE: usize = 2;
    const MAX_STACK_DEPTH: usize = 64;

    /// 以每个图元的包围盒构建，中位数划分最长轴
    pub fn build(bounds: &[Aabb]) -> Self {
        let _span = tracy_client::span!("Bvh::build");

        let mut indices: Vec<u32> = (0..bounds.len() as u32).filter(|i| !bounds[*i as usize].is_empty()).collect();
        if indices.is_empty() {
            return Self::default();
        }

        let mut nodes = Vec::with_capacity(indices.len() * 2);
        nodes.push(BvhNode {
            aabb_min: Vec3::ZERO,
            left_or_first: 0,
            aabb_max: Vec3::ZERO,
            count: 0,
        });
        let count = indices.len();
        Self::subdivide(bounds, &mut indices, &mut nodes, 0, 0, count, 0);
        Self { nodes, indices }
    }

    fn subdivide(
        bounds: &[Aabb],
        indices: &mut [u32],
        nodes: &mut Vec<BvhNode>,
        node_idx: usize,
        first: usize,
        count: usize,
        depth: usize,
    ) {
        let mut node_bounds = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for &prim in &indices[first..first + count] {
            node_bounds.grow(&bounds[prim as usize]);
            centroid_bounds.grow_point(bounds[prim as usize].centroid());
        }
        nodes[node_idx].aabb_min = node_bounds.min;
        nodes[node_idx].aabb_max = node_bounds.max;

        // 栈深度有限，过深时直接做成叶子
        if count <= Self::MAX_LEAF_SIZE || depth + 2 >= Self::MAX_STACK_DEPTH {
            nodes[node_idx].left_or_first = first as u32;
            nodes[node_idx].count = count as u32;
            return;
        }

        let axis = centroid_bounds.longest_axis();
        let mid = count / 2;
        indices[first..first + count].select_nth_unstable_by(mid, |a, b| {
            let ca = bounds[*a as usize].centroid()[axis];
            let cb = bounds[*b as usize].centroid()[axis];
            ca.total_cmp(&cb)
        });

        let left = nodes.len();
        let empty = BvhNode {
            aabb_min: Vec3::ZERO,
            left_or_first: 0,
            aabb_max: Vec3::ZERO,
            count: 0,
        };
        nodes.push(empty);
        nodes.push(empty);
        nodes[node_idx].left_or_first = left as u32;
        nodes[node_idx].count = 0;

        Self::subdivide(bounds, indices, nodes, left, first, mid, depth + 1);
        Self::subdivide(bounds, indices, nodes, left + 1, first + mid, count - mid, depth + 1);
    }
}
// getter
impl Bvh {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map(BvhNode::aabb).unwrap_or(Aabb::EMPTY)
    }
}
// traverse
impl Bvh {
    /// 遍历与光线相交的叶子
    ///
    /// `intersect(prim, t_max)` 在命中且距离小于 `t_max` 时返回新的距离；
    /// `any_hit` 为 true 时，第一次命中即返回。返回值表示是否命中过。
    pub fn traverse<F>(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32, any_hit: bool, mut intersect: F) -> bool
    where
        F: FnMut(u32, f32) -> Option<f32>,
    {
        if self.nodes.is_empty() {
            return false;
        }

        let inv_dir = dir.recip();
        let mut closest = t_max;
        let mut hit = false;

        let mut stack = [0u32; Self::MAX_STACK_DEPTH];
        let mut stack_len = 1;
        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if node.aabb().intersect_ray(origin, inv_dir, t_min, closest).is_none() {
                continue;
            }

            if node.is_leaf() {
                let first = node.left_or_first as usize;
                for &prim in &self.indices[first..first + node.count as usize] {
                    if let Some(t) = intersect(prim, closest) {
                        hit = true;
                        closest = t;
                        if any_hit {
                            return true;
                        }
                    }
                }
                continue;
            }

            // 先访问较近的孩子
            let left = node.left_or_first;
            let right = left + 1;
            let t_left = self.nodes[left as usize].aabb().intersect_ray(origin, inv_dir, t_min, closest);
            let t_right = self.nodes[right as usize].aabb().intersect_ray(origin, inv_dir, t_min, closest);
            let (near, far) = match (t_left, t_right) {
                (Some(l), Some(r)) if r < l => (Some(right), Some(left)),
                (Some(_), Some(_)) => (Some(left), Some(right)),
                (Some(_), None) => (Some(left), None),
                (None, Some(_)) => (Some(right), None),
                (None, None) => (None, None),
            };
            for child in [far, near].into_iter().flatten() {
                stack[stack_len] = child;
                stack_len += 1;
            }
        }
        hit
    }
}

/// 三角形求交容差，保证共享边上的光线不会从两个三角形之间漏过
const BARYCENTRIC_EPSILON: f32 = 1e-6;

/// Möller–Trumbore，双面
///
/// 返回 `(t, (u, v))`，其中 u/v 为 v1/v2 的权重
#[inline]
pub fn intersect_triangle(
    origin: Vec3,
    dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    t_min: f32,
    t_max: f32,
) -> Option<(f32, Vec2)> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(-BARYCENTRIC_EPSILON..=1.0 + BARYCENTRIC_EPSILON).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < -BARYCENTRIC_EPSILON || u + v > 1.0 + BARYCENTRIC_EPSILON {
        return None;
    }

    let t = e2.dot(q) * inv_det;
    (t > t_min && t < t_max).then(|| (t, Vec2::new(u, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_soup() -> Vec<[Vec3; 3]> {
        let mut tris = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                let base = Vec3::new(i as f32 * 1.5, j as f32 * 1.5, (i * j) as f32 * 0.1 - 2.0);
                tris.push([base, base + Vec3::X, base + Vec3::Y]);
            }
        }
        tris
    }

    fn brute_force(tris: &[[Vec3; 3]], origin: Vec3, dir: Vec3) -> Option<(u32, f32)> {
        let mut best: Option<(u32, f32)> = None;
        for (i, t) in tris.iter().enumerate() {
            let t_max = best.map(|b| b.1).unwrap_or(f32::INFINITY);
            if let Some((dist, _)) = intersect_triangle(origin, dir, t[0], t[1], t[2], 0.0, t_max) {
                best = Some((i as u32, dist));
            }
        }
        best
    }

    #[test]
    fn test_bvh_matches_brute_force() {
        let tris = triangle_soup();
        let bounds = tris.iter().map(|t| Aabb::from_points(t)).collect::<Vec<_>>();
        let bvh = Bvh::build(&bounds);
        assert!(!bvh.is_empty());

        for i in 0..40 {
            let origin = Vec3::new(i as f32 * 0.31, (i % 7) as f32 * 1.7 + 0.2, 10.0);
            let dir = Vec3::new(0.01 * i as f32, -0.02, -1.0).normalize();

            let mut closest = None;
            bvh.traverse(origin, dir, 0.0, f32::INFINITY, false, |prim, t_max| {
                let t = &tris[prim as usize];
                let (dist, _) = intersect_triangle(origin, dir, t[0], t[1], t[2], 0.0, t_max)?;
                closest = Some((prim, dist));
                Some(dist)
            });

            let expected = brute_force(&tris, origin, dir);
            assert_eq!(closest.map(|c| c.0), expected.map(|e| e.0), "ray {i}");
        }
    }

    #[test]
    fn test_any_hit_stops_early() {
        let tris = triangle_soup();
        let bounds = tris.iter().map(|t| Aabb::from_points(t)).collect::<Vec<_>>();
        let bvh = Bvh::build(&bounds);

        let mut visited = 0;
        let hit = bvh.traverse(Vec3::new(0.2, 0.2, 10.0), Vec3::NEG_Z, 0.0, f32::INFINITY, true, |_, _| {
            visited += 1;
            Some(1.0)
        });
        assert!(hit);
        assert_eq!(visited, 1);

        let miss = bvh.traverse(Vec3::new(-50.0, 0.0, 10.0), Vec3::NEG_Z, 0.0, f32::INFINITY, true, |_, _| Some(1.0));
        assert!(!miss);
    }

    #[test]
    fn test_triangle_two_sided_and_shared_edge() {
        let v0 = Vec3::new(-1.0, -1.0, 0.0);
        let v1 = Vec3::new(1.0, -1.0, 0.0);
        let v2 = Vec3::new(1.0, 1.0, 0.0);
        let v3 = Vec3::new(-1.0, 1.0, 0.0);

        // 从背面也能命中
        let back = intersect_triangle(Vec3::new(0.5, -0.5, -2.0), Vec3::Z, v0, v1, v2, 0.0, f32::INFINITY);
        assert!(back.is_some());

        // 正好穿过对角线
        let a = intersect_triangle(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, v0, v1, v2, 0.0, f32::INFINITY);
        let b = intersect_triangle(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, v0, v2, v3, 0.0, f32::INFINITY);
        assert!(a.is_some() || b.is_some());
        let (t, _) = a.or(b).unwrap();
        assert!((t - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_flat_aabb_is_hit() {
        let aabb = Aabb {
            min: Vec3::new(-1.0, -1.0, 0.0),
            max: Vec3::new(1.0, 1.0, 0.0),
        };
        let dir = Vec3::NEG_Z;
        assert!(aabb.intersect_ray(Vec3::new(0.0, 0.0, 3.0), dir.recip(), 0.0, f32::INFINITY).is_some());
        assert!(aabb.intersect_ray(Vec3::new(2.0, 0.0, 3.0), dir.recip(), 0.0, f32::INFINITY).is_none());
    }
}
