use glam::{Mat4, UVec3, Vec2, Vec3};
use itertools::Itertools;
use slotmap::SlotMap;

use crate::raytracing::bvh::{Aabb, Bvh, intersect_triangle};
use crate::resources::resource::GfxResource;

slotmap::new_key_type! {
    pub struct GfxBlasHandle;
}

#[derive(Debug, Clone, Copy)]
pub struct GfxRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}
impl GfxRay {
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            t_min: 0.0,
            t_max: f32::INFINITY,
        }
    }

    #[inline]
    pub fn with_range(mut self, t_min: f32, t_max: f32) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// trace 的命中结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GfxHit {
    pub instance_index: u32,
    pub primitive_index: u32,
    /// v1 / v2 的权重
    pub barycentrics: Vec2,
    pub t: f32,
}

/// 底层加速结构：一个 mesh 的三角形
pub struct GfxBlas {
    positions: Vec<Vec3>,
    triangles: Vec<UVec3>,
    bvh: Bvh,

    name: String,
}
impl GfxBlas {
    pub fn new(positions: Vec<Vec3>, triangles: Vec<UVec3>, name: impl AsRef<str>) -> Self {
        let bounds = triangles
            .iter()
            .map(|tri| {
                Aabb::from_points(&[
                    positions[tri.x as usize],
                    positions[tri.y as usize],
                    positions[tri.z as usize],
                ])
            })
            .collect_vec();
        Self {
            bvh: Bvh::build(&bounds),
            positions,
            triangles,
            name: name.as_ref().to_string(),
        }
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bvh.bounds()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 局部空间求交
    fn trace(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32, any_hit: bool) -> Option<(u32, f32, Vec2)> {
        let mut hit = None;
        self.bvh.traverse(origin, dir, t_min, t_max, any_hit, |prim, t_max| {
            let tri = self.triangles[prim as usize];
            let (t, bary) = intersect_triangle(
                origin,
                dir,
                self.positions[tri.x as usize],
                self.positions[tri.y as usize],
                self.positions[tri.z as usize],
                t_min,
                t_max,
            )?;
            hit = Some((prim, t, bary));
            Some(t)
        });
        hit
    }
}
impl GfxResource for GfxBlas {
    fn name(&self) -> &str {
        &self.name
    }

    fn size_bytes(&self) -> usize {
        self.positions.len() * size_of::<Vec3>()
            + self.triangles.len() * size_of::<UVec3>()
            + std::mem::size_of_val(self.bvh.nodes())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GfxInstance {
    pub transform: Mat4,
    pub inverse_transform: Mat4,
    pub blas: Option<GfxBlasHandle>,
    /// 0 表示不可见
    pub mask: u8,
}
impl GfxInstance {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.mask != 0 && self.blas.is_some()
    }
}

/// 两级加速结构
///
/// BLAS 存放在 pool 中，instance 通过 handle 引用 BLAS；
/// instance 的任何修改只标记 dirty，需要调用 `build_tlas` 后才会反映到 TLAS 的包围盒上。
pub struct GfxAccelerationStructure {
    blas_pool: SlotMap<GfxBlasHandle, GfxBlas>,
    instances: Vec<GfxInstance>,

    tlas: Bvh,
    /// TLAS 图元下标 -> instance 下标
    tlas_instances: Vec<u32>,
    dirty: bool,
    build_count: u64,

    name: String,
}
// new & init
impl GfxAccelerationStructure {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            blas_pool: SlotMap::with_key(),
            instances: Vec::new(),
            tlas: Bvh::default(),
            tlas_instances: Vec::new(),
            dirty: false,
            build_count: 0,
            name: name.as_ref().to_string(),
        }
    }
}
impl Drop for GfxAccelerationStructure {
    fn drop(&mut self) {
        log::info!("Dropping GfxAccelerationStructure {}", self.name);
    }
}
// getter
impl GfxAccelerationStructure {
    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    #[inline]
    pub fn instance(&self, instance_index: u32) -> Option<&GfxInstance> {
        self.instances.get(instance_index as usize)
    }

    #[inline]
    pub fn blas(&self, handle: GfxBlasHandle) -> Option<&GfxBlas> {
        self.blas_pool.get(handle)
    }

    #[inline]
    pub fn blas_count(&self) -> usize {
        self.blas_pool.len()
    }

    /// 有多少个 instance 正在引用该 BLAS
    pub fn blas_reference_count(&self, handle: GfxBlasHandle) -> usize {
        self.instances.iter().filter(|inst| inst.blas == Some(handle)).count()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn build_count(&self) -> u64 {
        self.build_count
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// instance
impl GfxAccelerationStructure {
    /// 新增一个不可见、未绑定 BLAS 的 instance
    pub fn push_instance(&mut self) -> u32 {
        self.instances.push(GfxInstance {
            transform: Mat4::IDENTITY,
            inverse_transform: Mat4::IDENTITY,
            blas: None,
            mask: 0,
        });
        self.dirty = true;
        self.instances.len() as u32 - 1
    }

    fn instance_mut(&mut self, instance_index: u32) -> Option<&mut GfxInstance> {
        let instance = self.instances.get_mut(instance_index as usize);
        if instance.is_none() {
            log::error!("{}: instance {instance_index} does not exist", self.name);
        }
        instance
    }

    pub fn set_instance_blas(&mut self, instance_index: u32, blas: Option<GfxBlasHandle>) {
        if let Some(instance) = self.instance_mut(instance_index) {
            instance.blas = blas;
            self.dirty = true;
        }
    }

    pub fn set_instance_transform(&mut self, instance_index: u32, transform: Mat4) {
        if let Some(instance) = self.instance_mut(instance_index) {
            instance.transform = transform;
            instance.inverse_transform = transform.inverse();
            self.dirty = true;
        }
    }

    pub fn set_instance_mask(&mut self, instance_index: u32, mask: u8) {
        if let Some(instance) = self.instance_mut(instance_index) {
            instance.mask = mask;
            self.dirty = true;
        }
    }
}
// blas
impl GfxAccelerationStructure {
    pub fn add_blas(&mut self, blas: GfxBlas) -> GfxBlasHandle {
        self.blas_pool.insert(blas)
    }

    /// 从 pool 中移除，返回的 BLAS 由调用者负责延迟销毁
    pub fn remove_blas(&mut self, handle: GfxBlasHandle) -> Option<GfxBlas> {
        let refs = self.blas_reference_count(handle);
        if refs > 0 {
            log::warn!("{}: removing blas still referenced by {refs} instances", self.name);
        }
        self.blas_pool.remove(handle)
    }
}
// tlas
impl GfxAccelerationStructure {
    /// 只在 dirty 时重新构建，返回是否真正构建了
    pub fn build_tlas(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        let _span = tracy_client::span!("GfxAccelerationStructure::build_tlas");

        let (tlas_instances, bounds): (Vec<u32>, Vec<Aabb>) = self
            .instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.is_active())
            .filter_map(|(idx, inst)| {
                let blas = self.blas_pool.get(inst.blas?)?;
                Some((idx as u32, blas.bounds().transform(&inst.transform)))
            })
            .unzip();

        self.tlas = Bvh::build(&bounds);
        self.tlas_instances = tlas_instances;
        self.dirty = false;
        self.build_count += 1;
        log::trace!("{}: tlas rebuilt with {} instances", self.name, self.tlas_instances.len());
        true
    }

    fn trace(&self, ray: &GfxRay, any_hit: bool) -> Option<GfxHit> {
        debug_assert!(!self.dirty, "{}: tracing against a dirty tlas", self.name);

        let mut closest: Option<GfxHit> = None;
        self.tlas.traverse(ray.origin, ray.direction, ray.t_min, ray.t_max, any_hit, |prim, t_max| {
            let instance_index = self.tlas_instances[prim as usize];
            let instance = &self.instances[instance_index as usize];
            if !instance.is_active() {
                return None;
            }
            let blas = self.blas_pool.get(instance.blas?)?;

            // 方向不归一化，局部空间中的 t 与世界空间相同
            let local_origin = instance.inverse_transform.transform_point3(ray.origin);
            let local_dir = instance.inverse_transform.transform_vector3(ray.direction);
            let (primitive_index, t, barycentrics) = blas.trace(local_origin, local_dir, ray.t_min, t_max, any_hit)?;
            closest = Some(GfxHit {
                instance_index,
                primitive_index,
                barycentrics,
                t,
            });
            Some(t)
        });
        closest
    }

    pub fn trace_closest(&self, ray: &GfxRay) -> Option<GfxHit> {
        self.trace(ray, false)
    }

    /// 只关心是否有遮挡
    pub fn has_hit(&self, ray: &GfxRay) -> bool {
        self.trace(ray, true).is_some()
    }
}
