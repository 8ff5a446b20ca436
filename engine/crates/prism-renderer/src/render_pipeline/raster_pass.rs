use std::sync::atomic::{AtomicU64, Ordering};

use glam::{UVec2, UVec3, Vec2, Vec3, Vec4};
use itertools::Itertools;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::resources::image::GfxImage2D;
use prism_scene::gpu_scene::GpuScene;

use crate::resources::frame_buffers::VisibilityTexel;

/// 光栅化的阶段，只能按顺序推进
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RasterStage {
    Idle,
    Clear,
    VertexTransform,
    TriangleCull,
    Raster,
    Resolve,
}
impl RasterStage {
    fn next(self) -> Self {
        match self {
            Self::Idle => Self::Clear,
            Self::Clear => Self::VertexTransform,
            Self::VertexTransform => Self::TriangleCull,
            Self::TriangleCull => Self::Raster,
            Self::Raster => Self::Resolve,
            Self::Resolve => Self::Idle,
        }
    }
}

/// 一个可见 instance 在 clip space 下的几何
struct RasterInstance {
    instance_id: u32,
    clip_positions: Vec<Vec4>,
    triangles: Vec<UVec3>,
}

/// 一个三角形的光栅化任务，被剔除的三角形包围盒为空
#[derive(Copy, Clone, Debug)]
struct TriangleWork {
    raster_instance: u32,
    triangle: u32,
    /// 包含
    box_min: UVec2,
    /// 不包含
    box_max: UVec2,
}
impl TriangleWork {
    #[inline]
    fn is_empty(&self) -> bool {
        self.box_min.x >= self.box_max.x || self.box_min.y >= self.box_max.y
    }
}

/// clip space 下的顶点，`bary` 是它在原三角形上的重心坐标
#[derive(Copy, Clone, Debug)]
struct ClipVertex {
    clip: Vec4,
    bary: Vec3,
}

/// 屏幕空间的三角形，`w` 用于透视校正
struct ScreenTriangle {
    screen: [Vec2; 3],
    depth: [f32; 3],
    w: [f32; 3],
    /// 三个顶点在原三角形上的重心坐标
    bary: [Vec3; 3],
}
impl ScreenTriangle {
    fn new(vertices: [ClipVertex; 3], extent: Vec2) -> Option<Self> {
        if vertices.iter().any(|v| v.clip.w <= 0.0) {
            return None;
        }
        let ndc = vertices.map(|v| v.clip.truncate() / v.clip.w);
        Some(Self {
            screen: ndc.map(|n| Vec2::new((n.x * 0.5 + 0.5) * extent.x, (0.5 - n.y * 0.5) * extent.y)),
            depth: ndc.map(|n| n.z),
            w: vertices.map(|v| v.clip.w),
            bary: vertices.map(|v| v.bary),
        })
    }

    /// 屏幕空间（y 向下）的有向面积，正面三角形为负
    #[inline]
    fn signed_area(&self) -> f32 {
        (self.screen[1] - self.screen[0]).perp_dot(self.screen[2] - self.screen[0])
    }

    /// 屏幕空间的线性重心坐标；点在三角形外时返回 None
    fn barycentrics(&self, p: Vec2) -> Option<Vec3> {
        let area = self.signed_area();
        if area == 0.0 {
            return None;
        }
        let [a, b, c] = self.screen;
        let b0 = (b - p).perp_dot(c - p) / area;
        let b1 = (c - p).perp_dot(a - p) / area;
        let b2 = 1.0 - b0 - b1;
        (b0 >= 0.0 && b1 >= 0.0 && b2 >= 0.0).then_some(Vec3::new(b0, b1, b2))
    }

    #[inline]
    fn depth_at(&self, bary: Vec3) -> f32 {
        self.depth[0] * bary.x + self.depth[1] * bary.y + self.depth[2] * bary.z
    }

    /// 屏幕空间重心坐标 -> 原三角形上的重心坐标
    fn perspective_correct(&self, bary: Vec3) -> Vec3 {
        let b = bary / Vec3::from(self.w);
        let b = b / (b.x + b.y + b.z);
        self.bary[0] * b.x + self.bary[1] * b.y + self.bary[2] * b.z
    }
}

/// 经过近平面裁剪的三角形，最多拆成两个屏幕三角形
struct ClippedTriangle {
    parts: [Option<ScreenTriangle>; 2],
}
impl ClippedTriangle {
    fn new(clip: [Vec4; 3], extent: Vec2) -> Self {
        let corners = [Vec3::X, Vec3::Y, Vec3::Z];
        let (polygon, count) = helper::clip_near([0, 1, 2].map(|i| ClipVertex {
            clip: clip[i],
            bary: corners[i],
        }));

        // 扇形三角化保持原来的环绕方向
        let part = |i: usize| {
            (i + 2 < count).then(|| ScreenTriangle::new([polygon[0], polygon[i + 1], polygon[i + 2]], extent)).flatten()
        };
        Self {
            parts: [part(0), part(1)],
        }
    }

    fn parts(&self) -> impl Iterator<Item = &ScreenTriangle> {
        self.parts.iter().flatten()
    }

    /// 所有部分的有向面积之和，完全在近平面之后时为 None
    fn signed_area(&self) -> Option<f32> {
        self.parts().map(ScreenTriangle::signed_area).reduce(|a, b| a + b)
    }

    fn screen_bounds(&self) -> Option<(Vec2, Vec2)> {
        self.parts().flat_map(|part| part.screen).fold(None, |bounds, p| match bounds {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
    }

    /// 覆盖像素 `p` 的部分以及它的屏幕重心坐标
    fn cover(&self, p: Vec2) -> Option<(&ScreenTriangle, Vec3)> {
        self.parts().find_map(|part| part.barycentrics(p).map(|bary| (part, bary)))
    }
}

/// Visibility buffer 光栅化
///
/// 每个三角形一个 work item，像素上的写冲突由 64 位 atomic min 解决：
/// 高 32 位是深度，低 32 位是三角形的全局 slot，更近的三角形总是胜出。
///
/// # 阶段
/// Clear -> VertexTransform -> TriangleCull -> Raster -> Resolve
pub struct RasterPass {
    stage: RasterStage,

    extent: UVec2,
    instances: Vec<RasterInstance>,
    works: Vec<TriangleWork>,
    depth_slots: Vec<AtomicU64>,
}
// new & init
impl RasterPass {
    pub fn new() -> Self {
        Self {
            stage: RasterStage::Idle,
            extent: UVec2::ZERO,
            instances: Vec::new(),
            works: Vec::new(),
            depth_slots: Vec::new(),
        }
    }
}
impl Default for RasterPass {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl RasterPass {
    #[inline]
    pub fn stage(&self) -> RasterStage {
        self.stage
    }

    /// 上一次光栅化中没有被剔除的三角形数量
    pub fn surviving_triangle_count(&self) -> usize {
        self.works.iter().filter(|w| !w.is_empty()).count()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.works.len()
    }
}
// stages
impl RasterPass {
    fn enter(&mut self, stage: RasterStage) {
        debug_assert_eq!(self.stage.next(), stage, "raster stage out of order: {:?} -> {stage:?}", self.stage);
        self.stage = stage;
    }

    /// 依次执行所有阶段，结果写入 `visibility`
    pub fn exec(&mut self, cmd: &mut GfxCommandBuffer, scene: &GpuScene, visibility: &mut GfxImage2D<VisibilityTexel>) {
        let _span = tracy_client::span!("RasterPass::exec");

        self.clear(visibility.extent());
        self.vertex_transform(scene);
        self.triangle_cull(cmd);
        self.raster(cmd);
        self.resolve(cmd, visibility);
        self.stage = RasterStage::Idle;
    }

    fn clear(&mut self, extent: UVec2) {
        self.enter(RasterStage::Clear);
        let pixel_count = (extent.x * extent.y) as usize;
        if self.extent != extent {
            self.depth_slots = (0..pixel_count).map(|_| AtomicU64::new(u64::MAX)).collect();
            self.extent = extent;
        } else {
            self.depth_slots.iter().for_each(|slot| slot.store(u64::MAX, Ordering::Relaxed));
        }
        self.instances.clear();
        self.works.clear();
    }

    fn vertex_transform(&mut self, scene: &GpuScene) {
        self.enter(RasterStage::VertexTransform);
        let _span = tracy_client::span!("RasterPass::vertex_transform");

        let view_proj = scene.view().view_proj;
        let bindless = scene.bindless();
        self.instances = (0..scene.instance_count())
            .filter_map(|instance_id| {
                let shape = scene.shape(instance_id)?;
                let instance = scene.acceleration().instance(instance_id)?;
                if shape.visible == 0 || !instance.is_active() {
                    return None;
                }
                let mesh = scene.mesh_proxy().buffer().device_record(shape.mesh_id)?;
                let vertices = bindless.vertex_buffers.get(mesh.vertex_buffer)?;
                let triangles = bindless.index_buffers.get(mesh.index_buffer)?;
                let mvp = view_proj * instance.transform;
                Some(RasterInstance {
                    instance_id,
                    clip_positions: vertices.as_slice().iter().map(|v| mvp * v.position.extend(1.0)).collect(),
                    triangles: triangles.as_slice().to_vec(),
                })
            })
            .collect();
    }

    fn triangle_cull(&mut self, cmd: &mut GfxCommandBuffer) {
        self.enter(RasterStage::TriangleCull);

        let extent = self.extent.as_vec2();
        let jobs = self
            .instances
            .iter()
            .enumerate()
            .flat_map(|(raster_instance, inst)| {
                (0..inst.triangles.len() as u32).map(move |triangle| (raster_instance as u32, triangle))
            })
            .collect_vec();

        let instances = &self.instances;
        let max = self.extent;
        self.works = cmd.dispatch_map("triangle-cull", jobs.len(), |job| {
            let (raster_instance, triangle) = jobs[job];
            let mut work = TriangleWork {
                raster_instance,
                triangle,
                box_min: UVec2::ZERO,
                box_max: UVec2::ZERO,
            };
            let inst = &instances[raster_instance as usize];
            let Some(clipped) = helper::clipped_triangle(inst, triangle, extent) else {
                return work;
            };
            if clipped.signed_area().is_none_or(|area| area >= 0.0) {
                // 背面、退化或者完全在近平面之后
                return work;
            }
            let Some((lo, hi)) = clipped.screen_bounds() else {
                return work;
            };
            // 覆盖像素中心 [lo, hi] 的像素范围
            let box_min = (lo - 0.5).ceil().max(Vec2::ZERO);
            let box_max = ((hi - 0.5).floor() + 1.0).min(extent);
            if box_min.x < box_max.x && box_min.y < box_max.y {
                work.box_min = box_min.as_uvec2();
                work.box_max = box_max.as_uvec2().min(max);
            }
            work
        });
    }

    fn raster(&mut self, cmd: &mut GfxCommandBuffer) {
        self.enter(RasterStage::Raster);

        let extent = self.extent;
        let instances = &self.instances;
        let works = &self.works;
        let depth_slots = &self.depth_slots;
        cmd.dispatch("raster", works.len(), |slot| {
            let work = works[slot];
            if work.is_empty() {
                return;
            }
            let inst = &instances[work.raster_instance as usize];
            let Some(clipped) = helper::clipped_triangle(inst, work.triangle, extent.as_vec2()) else {
                return;
            };
            for y in work.box_min.y..work.box_max.y {
                for x in work.box_min.x..work.box_max.x {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let Some((screen, bary)) = clipped.cover(p) else {
                        continue;
                    };
                    let depth = screen.depth_at(bary);
                    if !(0.0..=1.0).contains(&depth) {
                        continue;
                    }
                    let packed = ((depth.to_bits() as u64) << 32) | slot as u64;
                    depth_slots[(y * extent.x + x) as usize].fetch_min(packed, Ordering::Relaxed);
                }
            }
        });
    }

    fn resolve(&mut self, cmd: &mut GfxCommandBuffer, visibility: &mut GfxImage2D<VisibilityTexel>) {
        self.enter(RasterStage::Resolve);

        let extent = self.extent;
        let instances = &self.instances;
        let works = &self.works;
        let depth_slots = &self.depth_slots;
        let texels = cmd.dispatch_2d("raster-resolve", extent, |pixel| {
            let packed = depth_slots[(pixel.y * extent.x + pixel.x) as usize].load(Ordering::Relaxed);
            if packed == u64::MAX {
                return VisibilityTexel::EMPTY;
            }
            let work = works[(packed & 0xffff_ffff) as usize];
            let inst = &instances[work.raster_instance as usize];
            let Some(clipped) = helper::clipped_triangle(inst, work.triangle, extent.as_vec2()) else {
                return VisibilityTexel::EMPTY;
            };
            let Some((screen, bary)) = clipped.cover(pixel.as_vec2() + 0.5) else {
                return VisibilityTexel::EMPTY;
            };
            let bary = screen.perspective_correct(bary);
            VisibilityTexel {
                instance_id: inst.instance_id,
                primitive_id: work.triangle,
                barycentrics: Vec2::new(bary.y, bary.z),
            }
        });
        visibility.texels_mut().copy_from_slice(&texels);
    }
}

mod helper {
    use super::*;

    pub(super) fn clipped_triangle(inst: &RasterInstance, triangle: u32, extent: Vec2) -> Option<ClippedTriangle> {
        let tri = inst.triangles.get(triangle as usize)?;
        let clip = [tri.x, tri.y, tri.z].map(|i| inst.clip_positions.get(i as usize).copied());
        Some(ClippedTriangle::new([clip[0]?, clip[1]?, clip[2]?], extent))
    }

    /// Sutherland-Hodgman：用近平面 `z >= 0` 裁剪，得到至多 4 个顶点的凸多边形
    pub(super) fn clip_near(vertices: [ClipVertex; 3]) -> ([ClipVertex; 4], usize) {
        let mut polygon = [vertices[0]; 4];
        let mut count = 0;
        for i in 0..3 {
            let a = vertices[i];
            let b = vertices[(i + 1) % 3];
            let (da, db) = (a.clip.z, b.clip.z);
            if da >= 0.0 {
                polygon[count] = a;
                count += 1;
            }
            if (da >= 0.0) != (db >= 0.0) {
                let t = da / (da - db);
                polygon[count] = ClipVertex {
                    clip: a.clip.lerp(b.clip, t),
                    bary: a.bary.lerp(b.bary, t),
                };
                count += 1;
            }
        }
        (polygon, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render_interface::gfx_resource_manager::GfxResourceManager;
    use prism_scene::components::camera::CameraComponent;
    use prism_scene::components::transform::TransformComponent;
    use prism_scene::shapes::cube::Cube;
    use prism_scene::shapes::quad::Quad;
    use prism_shader_binding::prismsl;

    fn scene_with(extent: UVec2, camera: CameraComponent, setup: impl FnOnce(&mut GpuScene)) -> GpuScene {
        let mut scene = GpuScene::new(extent);
        scene.add_camera(camera);
        setup(&mut scene);
        let mut cmd = GfxCommandBuffer::new("upload");
        cmd.begin();
        let mut resource_manager = GfxResourceManager::new();
        scene.upload_render_data(&mut cmd, &mut resource_manager, 1);
        scene
    }

    fn add(scene: &mut GpuScene, mesh: u32, transform: TransformComponent) -> u32 {
        let instance = scene.register_instance();
        scene.set_instance_mesh_id(instance, mesh);
        let t = scene.add_transform(&transform);
        scene.bind_transform(instance, t);
        instance
    }

    fn rasterize(scene: &GpuScene, extent: UVec2) -> (RasterPass, GfxImage2D<VisibilityTexel>) {
        let mut pass = RasterPass::new();
        let mut visibility = GfxImage2D::new(extent, VisibilityTexel::EMPTY, "visibility");
        let mut cmd = GfxCommandBuffer::new("raster");
        cmd.begin();
        pass.exec(&mut cmd, scene, &mut visibility);
        (pass, visibility)
    }

    #[test]
    fn test_stage_order() {
        let mut stage = RasterStage::Idle;
        let mut order = Vec::new();
        for _ in 0..6 {
            stage = stage.next();
            order.push(stage);
        }
        assert_eq!(order.last(), Some(&RasterStage::Idle));
        assert_eq!(order[3], RasterStage::Raster);
    }

    #[test]
    fn test_matches_ray_traced_visibility() {
        let extent = UVec2::new(24, 24);
        let camera = CameraComponent::look_at(Vec3::new(1.5, 2.0, 4.0), Vec3::ZERO);
        let scene = scene_with(extent, camera, |scene| {
            let cube = scene.add_static_mesh(Cube::mesh_data());
            let quad = scene.add_static_mesh(Quad::mesh_data());
            add(scene, cube, TransformComponent::from_translation(Vec3::new(0.0, 0.0, -0.5)));
            add(scene, quad, TransformComponent::from_translation(Vec3::new(0.5, 0.2, -2.0)));
        });
        let (pass, visibility) = rasterize(&scene, extent);
        assert!(pass.surviving_triangle_count() > 0);
        assert!(pass.surviving_triangle_count() < pass.triangle_count());

        let mut agree = 0;
        let mut covered = 0;
        for y in 0..extent.y {
            for x in 0..extent.x {
                let pixel = UVec2::new(x, y);
                let texel = visibility.load(pixel);
                let traced = scene.intersect(&scene.primary_ray(pixel.as_vec2() + 0.5));
                if traced.valid() {
                    covered += 1;
                }
                if texel.instance_id == traced.instance_id {
                    agree += 1;
                }
                if !texel.is_empty() && texel.instance_id == traced.instance_id && texel.primitive_id == traced.primitive_id {
                    let bary = Vec2::new(traced.barycentrics.y, traced.barycentrics.z);
                    assert!(texel.barycentrics.abs_diff_eq(bary, 1e-3), "{pixel}: {texel:?} vs {bary}");
                }
            }
        }
        assert!(covered > 0);
        // 只允许三角形边缘上的少量分歧
        assert!(agree as f32 >= 0.97 * (extent.x * extent.y) as f32, "agree {agree}");
    }

    #[test]
    fn test_clip_near() {
        let vertex = |z: f32, bary: Vec3| ClipVertex {
            clip: Vec4::new(0.0, 0.0, z, 1.0),
            bary,
        };
        // 一个顶点在近平面之后：四边形
        let (polygon, count) = helper::clip_near([vertex(1.0, Vec3::X), vertex(1.0, Vec3::Y), vertex(-1.0, Vec3::Z)]);
        assert_eq!(count, 4);
        assert!(polygon[..count].iter().all(|v| v.clip.z >= 0.0));
        assert!(polygon[2].bary.abs_diff_eq(Vec3::new(0.0, 0.5, 0.5), 1e-6));
        assert!(polygon[3].bary.abs_diff_eq(Vec3::new(0.5, 0.0, 0.5), 1e-6));

        // 两个顶点在近平面之后：三角形
        let (_, count) = helper::clip_near([vertex(1.0, Vec3::X), vertex(-1.0, Vec3::Y), vertex(-1.0, Vec3::Z)]);
        assert_eq!(count, 3);

        let (_, count) = helper::clip_near([vertex(-1.0, Vec3::X), vertex(-1.0, Vec3::Y), vertex(-1.0, Vec3::Z)]);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_floor_crossing_near_plane() {
        // 相机贴近地面，地面的两个三角形都有顶点在相机背后
        let extent = UVec2::new(16, 16);
        let camera = CameraComponent::look_at(Vec3::new(0.0, 0.3, 0.0), Vec3::new(0.0, 0.3, -1.0));
        let mut floor = prismsl::INVALID_ID;
        let scene = scene_with(extent, camera, |scene| {
            let quad = scene.add_static_mesh(Quad::mesh_data());
            floor = add(
                scene,
                quad,
                TransformComponent::from_trs(
                    Vec3::ZERO,
                    glam::Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
                    Vec3::splat(10.0),
                ),
            );
        });
        let (pass, visibility) = rasterize(&scene, extent);
        assert_eq!(pass.surviving_triangle_count(), 2);

        let mut agree = 0;
        for y in 0..extent.y {
            for x in 0..extent.x {
                let pixel = UVec2::new(x, y);
                let texel = visibility.load(pixel);
                let traced = scene.intersect(&scene.primary_ray(pixel.as_vec2() + 0.5));
                if texel.instance_id == traced.instance_id {
                    agree += 1;
                }
                if !texel.is_empty() && texel.primitive_id == traced.primitive_id {
                    let bary = Vec2::new(traced.barycentrics.y, traced.barycentrics.z);
                    assert!(texel.barycentrics.abs_diff_eq(bary, 1e-3), "{pixel}: {texel:?} vs {bary}");
                }
            }
        }
        assert!(agree as f32 >= 0.97 * (extent.x * extent.y) as f32, "agree {agree}");
        // 画面下方全部是地面
        for y in 12..extent.y {
            for x in 0..extent.x {
                assert_eq!(visibility.load(UVec2::new(x, y)).instance_id, floor);
            }
        }
    }

    #[test]
    fn test_back_face_is_culled() {
        let extent = UVec2::new(8, 8);
        let camera = CameraComponent::look_at(Vec3::new(0.0, 0.0, -3.0), Vec3::ZERO);
        // 相机在 quad 的背面
        let scene = scene_with(extent, camera, |scene| {
            let quad = scene.add_static_mesh(Quad::mesh_data());
            add(scene, quad, TransformComponent::default());
        });
        let (pass, visibility) = rasterize(&scene, extent);
        assert_eq!(pass.triangle_count(), 2);
        assert_eq!(pass.surviving_triangle_count(), 0);
        assert!(visibility.texels().iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_closer_triangle_wins() {
        let extent = UVec2::new(8, 8);
        let camera = CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        let mut near = prismsl::INVALID_ID;
        let scene = scene_with(extent, camera, |scene| {
            let quad = scene.add_static_mesh(Quad::mesh_data());
            add(scene, quad, TransformComponent::from_translation(Vec3::NEG_Z));
            near = add(scene, quad, TransformComponent::default());
        });
        let (_, visibility) = rasterize(&scene, extent);
        assert_eq!(visibility.load(UVec2::new(4, 4)).instance_id, near);
    }
}
