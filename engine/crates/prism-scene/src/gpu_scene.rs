use glam::{Mat4, UVec2, Vec2, Vec3};
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::raytracing::acceleration::{GfxAccelerationStructure, GfxHit, GfxRay};
use prism_render_interface::bindless_manager::BindlessManager;
use prism_render_interface::gfx_resource_manager::GfxResourceManager;
use prism_shader_binding::prismsl;

use crate::components::camera::CameraComponent;
use crate::components::light::LightComponent;
use crate::components::material::MaterialComponent;
use crate::components::mesh::MeshData;
use crate::components::transform::TransformComponent;
use crate::intersection::RayIntersection;
use crate::proxies::camera_proxy::CameraProxy;
use crate::proxies::light_proxy::LightProxy;
use crate::proxies::material_proxy::MaterialProxy;
use crate::proxies::scene_proxy::{SceneProxy, UploadContext};
use crate::proxies::shape_proxy::ShapeProxy;
use crate::proxies::static_mesh_proxy::StaticMeshProxy;
use crate::proxies::transform_proxy::TransformProxy;
use crate::shading::light::LightInstance;

/// CPU 权威、GPU 常驻的场景
///
/// 持有加速结构、bindless 表以及所有 proxy。
/// 外部只能通过这里的接口修改场景，修改在 `upload_render_data` 之后才对 pass 可见。
///
/// # 每帧流程
/// 1. 组件修改累积在各个 proxy 的 dirty 集合 / 命令队列中
/// 2. `upload_render_data`：mesh -> shape -> camera / material / light -> transform -> TLAS
/// 3. 各个 pass 通过 `intersect` / `has_hit` 等查询读取已经一致的 GPU 状态
/// 4. `advance_frame`：当前帧的矩阵成为上一帧的矩阵
pub struct GpuScene {
    acceleration: GfxAccelerationStructure,
    bindless: BindlessManager,

    mesh_proxy: StaticMeshProxy,
    shape_proxy: ShapeProxy,
    transform_proxy: TransformProxy,
    camera_proxy: CameraProxy,
    light_proxy: LightProxy,
    material_proxy: MaterialProxy,
}
// new & init
impl GpuScene {
    pub fn new(resolution: UVec2) -> Self {
        Self {
            acceleration: GfxAccelerationStructure::new("gpu-scene"),
            bindless: BindlessManager::new(),
            mesh_proxy: StaticMeshProxy::new(),
            shape_proxy: ShapeProxy::new(),
            transform_proxy: TransformProxy::new(),
            camera_proxy: CameraProxy::new(resolution),
            light_proxy: LightProxy::new(),
            material_proxy: MaterialProxy::new(),
        }
    }
}
impl Drop for GpuScene {
    fn drop(&mut self) {
        log::info!("Dropping GpuScene");
    }
}
// getter
impl GpuScene {
    #[inline]
    pub fn acceleration(&self) -> &GfxAccelerationStructure {
        &self.acceleration
    }

    #[inline]
    pub fn bindless(&self) -> &BindlessManager {
        &self.bindless
    }

    #[inline]
    pub fn mesh_proxy(&self) -> &StaticMeshProxy {
        &self.mesh_proxy
    }

    #[inline]
    pub fn shape_proxy(&self) -> &ShapeProxy {
        &self.shape_proxy
    }

    #[inline]
    pub fn transform_proxy(&self) -> &TransformProxy {
        &self.transform_proxy
    }

    #[inline]
    pub fn light_proxy(&self) -> &LightProxy {
        &self.light_proxy
    }

    #[inline]
    pub fn material_proxy(&self) -> &MaterialProxy {
        &self.material_proxy
    }

    #[inline]
    pub fn camera_proxy(&self) -> &CameraProxy {
        &self.camera_proxy
    }

    #[inline]
    pub fn has_camera(&self) -> bool {
        self.camera_proxy.has_camera()
    }

    /// 上传后的 view；分辨率等修改在下一次 `upload_render_data` 之后才可见
    #[inline]
    pub fn view(&self) -> &prismsl::View {
        self.camera_proxy.view()
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.acceleration.instance_count()
    }

    /// 任何 proxy 还有未上传的修改
    pub fn is_dirty(&self) -> bool {
        self.mesh_proxy.is_dirty()
            || self.shape_proxy.is_dirty()
            || self.camera_proxy.is_dirty()
            || self.material_proxy.is_dirty()
            || self.light_proxy.is_dirty()
            || self.transform_proxy.is_dirty()
    }

    /// 已上传的 shape
    #[inline]
    pub fn shape(&self, instance_id: u32) -> Option<&prismsl::Shape> {
        self.shape_proxy.buffer().device_record(instance_id)
    }

    /// 找不到材质时使用默认的灰色材质
    pub fn material(&self, material_id: u32) -> prismsl::Material {
        self.material_proxy.buffer().device_record(material_id).copied().unwrap_or_default()
    }

    /// 已上传的光源及其世界变换
    pub fn light_instance(&self, light_id: u32) -> Option<LightInstance> {
        let record = *self.light_proxy.buffer().device_record(light_id)?;
        let transform = self
            .transform_proxy
            .buffer()
            .device_record(record.transform_id)
            .map(|t| t.matrix)
            .unwrap_or(Mat4::IDENTITY);
        LightInstance::new(record, transform)
    }

    pub fn light_instances(&self) -> Vec<LightInstance> {
        (0..self.light_proxy.len() as u32).filter_map(|id| self.light_instance(id)).collect()
    }
}
// static mesh
impl GpuScene {
    /// 无效的几何数据返回 `INVALID_ID`
    pub fn add_static_mesh(&mut self, data: MeshData) -> u32 {
        self.mesh_proxy.add_mesh(data)
    }

    pub fn update_static_mesh_geometry(&mut self, mesh_id: u32, data: MeshData) {
        self.mesh_proxy.update_mesh_geometry(mesh_id, data);
    }

    /// 引用该 mesh 的 instance 在下一次上传后全部不可见
    pub fn remove_static_mesh(&mut self, mesh_id: u32) {
        let instances = self.mesh_proxy.remove_mesh(mesh_id);
        log::debug!("remove mesh {mesh_id}, unbind instances {instances:?}");
    }

    pub fn set_static_mesh_material(&mut self, mesh_id: u32, material_id: u32) {
        self.mesh_proxy.set_mesh_material(mesh_id, material_id);
    }
}
// instance
impl GpuScene {
    /// 加速结构中立即多出一个 slot，配置之前不可见
    pub fn register_instance(&mut self) -> u32 {
        let instance_id = self.acceleration.push_instance();
        let shape_id = self.shape_proxy.register_instance();
        debug_assert_eq!(instance_id, shape_id);
        instance_id
    }

    fn check_instance(&self, instance_id: u32, op: &str) -> bool {
        if instance_id >= self.acceleration.instance_count() {
            log::error!("{op}: instance {instance_id} is not registered");
            return false;
        }
        true
    }

    pub fn set_instance_mesh_id(&mut self, instance_id: u32, mesh_id: u32) {
        if !self.check_instance(instance_id, "set instance mesh") {
            return;
        }
        if self.mesh_proxy.add_instance(instance_id, mesh_id) {
            self.shape_proxy.set_mesh_id(instance_id, mesh_id);
        }
    }

    pub fn set_instance_light_id(&mut self, instance_id: u32, light_id: u32) {
        if !self.check_instance(instance_id, "set instance light") {
            return;
        }
        if self.light_proxy.bind_light_instance(light_id, instance_id) {
            self.shape_proxy.set_light_id(instance_id, light_id);
        }
    }

    pub fn set_instance_visibility(&mut self, instance_id: u32, visible: bool) {
        if !self.check_instance(instance_id, "set instance visibility") {
            return;
        }
        self.shape_proxy.set_visibility(instance_id, visible);
        self.mesh_proxy.set_visibility(instance_id, visible);
    }

    /// slot 不会被回收，只是不再可见
    pub fn remove_instance(&mut self, instance_id: u32) {
        if !self.check_instance(instance_id, "remove instance") {
            return;
        }
        self.shape_proxy.set_visibility(instance_id, false);
        self.mesh_proxy.remove_instance(instance_id);
    }
}
// transform
impl GpuScene {
    pub fn add_transform(&mut self, component: &TransformComponent) -> u32 {
        self.transform_proxy.add_transform(component)
    }

    pub fn update_transform(&mut self, transform_id: u32, component: &TransformComponent) {
        self.transform_proxy.update_transform(transform_id, component);
    }

    pub fn bind_transform(&mut self, instance_id: u32, transform_id: u32) {
        if !self.check_instance(instance_id, "bind transform") {
            return;
        }
        if self.transform_proxy.bind_transform(instance_id, transform_id) {
            self.shape_proxy.set_transform_id(instance_id, transform_id);
        }
    }
}
// light & material & camera
impl GpuScene {
    pub fn add_light(&mut self, component: &LightComponent) -> u32 {
        self.light_proxy.add_light(component)
    }

    pub fn update_light(&mut self, light_id: u32, component: &LightComponent) {
        self.light_proxy.update_light(light_id, component);
    }

    pub fn bind_light_transform(&mut self, light_id: u32, transform_id: u32) {
        if self.transform_proxy.transform(transform_id).is_none() {
            log::error!("bind light {light_id} to transform {transform_id} before it is added");
            return;
        }
        self.light_proxy.bind_light_transform(light_id, transform_id);
    }

    pub fn add_material(&mut self, component: &MaterialComponent) -> u32 {
        self.material_proxy.add_material(component)
    }

    pub fn update_material(&mut self, material_id: u32, component: &MaterialComponent) {
        self.material_proxy.update_material(material_id, component);
    }

    pub fn add_camera(&mut self, camera: CameraComponent) {
        self.camera_proxy.add_camera(camera);
    }

    pub fn update_camera(&mut self, camera: CameraComponent) {
        self.camera_proxy.update_camera(camera);
    }

    pub fn set_resolution(&mut self, resolution: UVec2) {
        self.camera_proxy.set_resolution(resolution);
    }
}
// update
impl GpuScene {
    /// # Phase: Before Render
    ///
    /// 按依赖顺序上传所有 proxy 的修改，最后在需要时重建 TLAS。
    ///
    /// # 参数
    /// - `cmd`: 正在录制的命令缓冲区
    /// - `resource_manager`: 被替换或删除的资源交给它延迟销毁
    /// - `frame_id`: 当前帧序号
    pub fn upload_render_data(&mut self, cmd: &mut GfxCommandBuffer, resource_manager: &mut GfxResourceManager, frame_id: u64) {
        let _span = tracy_client::span!("GpuScene::upload_render_data");

        let mut ctx = UploadContext {
            cmd,
            acceleration: &mut self.acceleration,
            bindless: &mut self.bindless,
            resource_manager,
            frame_id,
        };

        // mesh 的几何数据必须先于引用它的 instance
        self.mesh_proxy.upload_dirty_data(&mut ctx);
        for instance_id in self.mesh_proxy.drain_hidden_instances() {
            self.shape_proxy.set_visibility(instance_id, false);
        }
        self.shape_proxy.upload_dirty_data(&mut ctx);

        self.camera_proxy.upload_dirty_data(&mut ctx);
        self.material_proxy.upload_dirty_data(&mut ctx);
        self.light_proxy.upload_dirty_data(&mut ctx);

        // transform 会直接修改加速结构中 instance 的矩阵
        self.transform_proxy.upload_dirty_data(&mut ctx);

        ctx.cmd.pipeline_barrier("gpu scene upload");
        ctx.cmd.cmd_build_tlas(ctx.acceleration);
    }

    /// # Phase: After Render
    pub fn advance_frame(&mut self) {
        self.transform_proxy.advance_frame();
        self.camera_proxy.advance_frame();
    }
}
// query
impl GpuScene {
    #[inline]
    pub fn trace_closest(&self, ray: &GfxRay) -> Option<GfxHit> {
        self.acceleration.trace_closest(ray)
    }

    #[inline]
    pub fn has_hit(&self, ray: &GfxRay) -> bool {
        self.acceleration.has_hit(ray)
    }

    /// 未命中时返回无效的求交结果
    pub fn intersect(&self, ray: &GfxRay) -> RayIntersection {
        match self.trace_closest(ray) {
            Some(hit) => self.intersect_hit(ray, &hit),
            None => RayIntersection::invalid(),
        }
    }

    /// 由外部得到的命中（例如 visibility buffer）计算完整的求交结果
    pub fn intersect_hit(&self, ray: &GfxRay, hit: &GfxHit) -> RayIntersection {
        self.resolve_hit(ray, hit).unwrap_or_else(RayIntersection::invalid)
    }

    fn resolve_hit(&self, ray: &GfxRay, hit: &GfxHit) -> Option<RayIntersection> {
        let shape = *self.shape(hit.instance_index)?;
        let mesh = self.mesh_proxy.buffer().device_record(shape.mesh_id)?;
        let instance = self.acceleration.instance(hit.instance_index)?;
        let vertices = self.bindless.vertex_buffers.get(mesh.vertex_buffer)?.as_slice();
        let tri = *self.bindless.index_buffers.get(mesh.index_buffer)?.get(hit.primitive_index as usize)?;
        let [v0, v1, v2] = [tri.x, tri.y, tri.z].map(|i| vertices.get(i as usize).copied());
        let (v0, v1, v2) = (v0?, v1?, v2?);

        let bary = Vec3::new(1.0 - hit.barycentrics.x - hit.barycentrics.y, hit.barycentrics.x, hit.barycentrics.y);
        let interpolate = |a: Vec3, b: Vec3, c: Vec3| a * bary.x + b * bary.y + c * bary.z;

        let matrix = instance.transform;
        let normal_matrix = instance.inverse_transform.transpose();
        let local_position = interpolate(v0.position, v1.position, v2.position);
        let position = matrix.transform_point3(local_position);
        let triangle = [v0.position, v1.position, v2.position].map(|p| matrix.transform_point3(p));
        let triangle_normal = (triangle[1] - triangle[0]).cross(triangle[2] - triangle[0]).normalize_or_zero();
        let vertex_normal =
            normal_matrix.transform_vector3(interpolate(v0.normal, v1.normal, v2.normal)).normalize_or_zero();
        let corner_normal = self
            .bindless
            .corner_normal_buffers
            .get(mesh.corner_normal_buffer)
            .and_then(|buffer| {
                let base = hit.primitive_index as usize * 3;
                let n = buffer.as_slice().get(base..base + 3)?;
                Some(normal_matrix.transform_vector3(interpolate(n[0], n[1], n[2])).normalize_or_zero())
            })
            .unwrap_or(triangle_normal);
        let uv = v0.uv() * bary.x + v1.uv() * bary.y + v2.uv() * bary.z;

        // 上一帧的位置：没有移动时与当前位置完全相同
        let prev_matrix = self
            .transform_proxy
            .buffer()
            .device_record(shape.transform_id)
            .map(|t| t.prev_matrix)
            .unwrap_or(matrix);
        let prev_position =
            if prev_matrix == matrix { position } else { prev_matrix.transform_point3(local_position) };

        let view = self.view();
        let motion = match (
            helper::project_to_uv(&view.view_proj, position),
            helper::project_to_uv(&view.prev_view_proj, prev_position),
        ) {
            (Some(now), Some(prev)) => now - prev,
            _ => Vec2::ZERO,
        };

        Some(RayIntersection {
            instance_id: hit.instance_index,
            primitive_id: hit.primitive_index,
            shape,
            material_id: mesh.material_id,
            position,
            triangle,
            triangle_normal,
            vertex_normal,
            corner_normal,
            barycentrics: bary,
            uv,
            depth: (position - ray.origin).length(),
            t: hit.t,
            motion,
            front_face: ray.direction.dot(triangle_normal) < 0.0,
        })
    }

    /// 穿过像素坐标 `pixel`（以像素左上角为原点，像素中心为 +0.5）的主光线
    pub fn primary_ray(&self, pixel: Vec2) -> GfxRay {
        let view = self.view();
        let resolution = view.resolution.as_vec2().max(Vec2::ONE);
        let ndc = Vec2::new(2.0 * pixel.x / resolution.x - 1.0, 1.0 - 2.0 * pixel.y / resolution.y);
        let direction = (view.cam_forward + view.cam_right * ndc.x + view.cam_up * ndc.y).normalize();
        GfxRay::new(view.position, direction).with_range(view.near, view.far)
    }
}

pub mod helper {
    use glam::{Mat4, Vec2, Vec3};

    /// 世界坐标投影到屏幕 uv，左上角为 (0, 0)；在相机后方时返回 None
    pub fn project_to_uv(view_proj: &Mat4, position: Vec3) -> Option<Vec2> {
        let clip = *view_proj * position.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::cube::Cube;
    use crate::shapes::quad::Quad;
    use glam::Quat;

    struct Harness {
        scene: GpuScene,
        cmd: GfxCommandBuffer,
        resource_manager: GfxResourceManager,
        frame_id: u64,
    }
    impl Harness {
        fn new() -> Self {
            let mut scene = GpuScene::new(UVec2::new(32, 32));
            scene.add_camera(CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO));
            Self {
                scene,
                cmd: GfxCommandBuffer::new("test"),
                resource_manager: GfxResourceManager::new(),
                frame_id: 1,
            }
        }

        fn upload(&mut self) -> u64 {
            let before = self.cmd.write_count();
            self.cmd.begin();
            self.scene.upload_render_data(&mut self.cmd, &mut self.resource_manager, self.frame_id);
            self.cmd.end();
            self.cmd.write_count() - before
        }

        fn end_frame(&mut self) {
            self.scene.advance_frame();
            self.frame_id += 1;
            self.resource_manager.cleanup(self.frame_id);
        }

        fn add_instance(&mut self, mesh: u32, transform: TransformComponent) -> (u32, u32) {
            let instance = self.scene.register_instance();
            self.scene.set_instance_mesh_id(instance, mesh);
            let t = self.scene.add_transform(&transform);
            self.scene.bind_transform(instance, t);
            (instance, t)
        }
    }

    #[test]
    fn test_miss_and_hit() {
        let mut h = Harness::new();
        let mesh = h.scene.add_static_mesh(Quad::mesh_data());
        let rotation = Quat::from_rotation_y(0.4);
        let transform = TransformComponent::from_trs(Vec3::new(0.5, 0.0, -2.0), rotation, Vec3::splat(2.0));
        let (instance, _) = h.add_instance(mesh, transform);
        h.upload();

        let miss = GfxRay::new(Vec3::new(0.0, 10.0, 3.0), Vec3::NEG_Z);
        assert!(!h.scene.intersect(&miss).valid());
        assert!(!h.scene.has_hit(&miss));

        let origin = Vec3::new(0.3, 0.4, 3.0);
        let ray = GfxRay::new(origin, Vec3::NEG_Z);
        let hit = h.scene.intersect(&ray);
        assert!(hit.valid());
        assert_eq!(hit.instance_id, instance);
        assert!(h.scene.has_hit(&ray));

        // 解析解：平面过 (0.5, 0, -2)，法线为旋转后的 +Z
        let normal = rotation * Vec3::Z;
        let t = (Vec3::new(0.5, 0.0, -2.0) - origin).dot(normal) / Vec3::NEG_Z.dot(normal);
        assert!(hit.position.abs_diff_eq(origin + Vec3::NEG_Z * t, 1e-4));
        assert!((hit.depth - t).abs() < 1e-4);
        assert!(hit.triangle_normal.abs_diff_eq(normal, 1e-5));
        assert!(hit.vertex_normal.abs_diff_eq(normal, 1e-5));
        assert!(hit.front_face);
        assert_eq!(hit.material_id, prismsl::INVALID_ID);
    }

    #[test]
    fn test_upload_is_idempotent() {
        let mut h = Harness::new();
        let mesh = h.scene.add_static_mesh(Cube::mesh_data());
        let material = h.scene.add_material(&MaterialComponent::default());
        h.scene.set_static_mesh_material(mesh, material);
        let light = h.scene.add_light(&LightComponent::point(Vec3::ONE, 1.0));
        let (_, t) = h.add_instance(mesh, TransformComponent::default());
        h.scene.bind_light_transform(light, t);

        assert!(h.upload() > 0);
        assert!(!h.scene.is_dirty());
        assert_eq!(h.upload(), 0);

        let builds = h.scene.acceleration().build_count();
        h.end_frame();
        assert_eq!(h.upload(), 0);
        assert_eq!(h.scene.acceleration().build_count(), builds);
        assert_eq!(h.scene.material(material).base_color, MaterialComponent::default().base_color);
        assert_eq!(h.scene.material(99).base_color, prismsl::Material::default().base_color);
    }

    #[test]
    fn test_remove_mesh_hides_instances() {
        let mut h = Harness::new();
        let mesh = h.scene.add_static_mesh(Quad::mesh_data());
        let (a, _) = h.add_instance(mesh, TransformComponent::default());
        let (b, _) = h.add_instance(mesh, TransformComponent::from_translation(Vec3::X * 3.0));
        h.upload();
        let blas = h.scene.mesh_proxy().blas(mesh).unwrap();
        assert!(h.scene.shape_proxy().is_visible(a));

        h.end_frame();
        h.scene.remove_static_mesh(mesh);
        h.upload();

        for instance in [a, b] {
            assert!(!h.scene.shape_proxy().is_visible(instance));
            assert_eq!(h.scene.shape(instance).unwrap().visible, 0);
        }
        assert_eq!(h.scene.acceleration().blas_reference_count(blas), 0);
        assert!(!h.scene.intersect(&GfxRay::new(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z)).valid());

        // 延迟销毁：FIF 帧之后才真正释放
        let pending = h.resource_manager.pending_count();
        assert!(pending > 0);
        h.end_frame();
        assert_eq!(h.resource_manager.pending_count(), pending);
        for _ in 0..3 {
            h.end_frame();
        }
        assert_eq!(h.resource_manager.pending_count(), 0);
    }

    #[test]
    fn test_remove_mesh_then_rebind_in_same_frame() {
        let mut h = Harness::new();
        let quad = h.scene.add_static_mesh(Quad::mesh_data());
        let cube = h.scene.add_static_mesh(Cube::mesh_data());
        let (a, _) = h.add_instance(quad, TransformComponent::default());
        let (b, _) = h.add_instance(quad, TransformComponent::from_translation(Vec3::X * 3.0));
        h.upload();
        h.end_frame();

        // a 换成 cube；b 先显式设为可见，仍然因为 mesh 被删除而隐藏
        h.scene.set_instance_visibility(b, true);
        h.scene.remove_static_mesh(quad);
        h.scene.set_instance_mesh_id(a, cube);
        h.upload();

        let as_instance = h.scene.acceleration().instance(a).unwrap();
        assert!(as_instance.is_active());
        assert_eq!(as_instance.blas, h.scene.mesh_proxy().blas(cube));
        assert!(h.scene.shape_proxy().is_visible(a));
        assert_eq!(h.scene.shape(a).unwrap().mesh_id, cube);
        assert!(h.scene.intersect(&GfxRay::new(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z)).valid());

        assert!(!h.scene.acceleration().instance(b).unwrap().is_active());
        assert!(!h.scene.shape_proxy().is_visible(b));

        // 删除之后再显式设为可见，以最后一条命令为准
        h.end_frame();
        h.scene.set_instance_visibility(a, false);
        h.upload();
        h.end_frame();
        let new_quad = h.scene.add_static_mesh(Quad::mesh_data());
        h.scene.remove_static_mesh(cube);
        h.scene.set_instance_mesh_id(a, new_quad);
        h.scene.set_instance_visibility(a, true);
        h.upload();
        assert!(h.scene.shape_proxy().is_visible(a));
        assert!(h.scene.acceleration().instance(a).unwrap().is_active());
    }

    #[test]
    fn test_motion_vectors() {
        let mut h = Harness::new();
        let mesh = h.scene.add_static_mesh(Quad::mesh_data());
        let (_, t) = h.add_instance(mesh, TransformComponent::default());
        let ray = GfxRay::new(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z);

        h.upload();
        assert_eq!(h.scene.intersect(&ray).motion, Vec2::ZERO);
        h.end_frame();
        h.upload();
        assert_eq!(h.scene.intersect(&ray).motion, Vec2::ZERO);

        // 物体向 +X 移动，屏幕上向右
        h.end_frame();
        h.scene.update_transform(t, &TransformComponent::from_translation(Vec3::X * 0.1));
        h.upload();
        let motion = h.scene.intersect(&ray).motion;
        assert!(motion.x > 0.0 && motion.y.abs() < 1e-6);

        // 静止一帧后 motion 归零
        h.end_frame();
        h.upload();
        assert_eq!(h.scene.intersect(&ray).motion, Vec2::ZERO);
    }

    #[test]
    fn test_primary_ray_through_center() {
        let mut h = Harness::new();
        h.upload();
        let ray = h.scene.primary_ray(Vec2::new(16.0, 16.0));
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 3.0));

        let corner = h.scene.primary_ray(Vec2::ZERO);
        assert!(corner.direction.x < 0.0 && corner.direction.y > 0.0);
    }

    #[test]
    fn test_unregistered_instance_is_ignored() {
        let mut h = Harness::new();
        let mesh = h.scene.add_static_mesh(Quad::mesh_data());
        h.scene.set_instance_mesh_id(5, mesh);
        h.scene.set_instance_visibility(5, true);
        assert_eq!(h.scene.instance_count(), 0);
        assert!(h.scene.mesh_proxy().instance_mesh(5).is_none());
    }
}
