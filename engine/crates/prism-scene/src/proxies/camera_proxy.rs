use glam::{Mat4, UVec2};
use prism_shader_binding::prismsl;

use crate::components::camera::CameraComponent;
use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// 唯一的活动相机
///
/// 保留上一帧的 view-projection 矩阵，用于计算 motion vector。
pub struct CameraProxy {
    camera: Option<CameraComponent>,
    resolution: UVec2,
    /// 绑定之后的第一帧为 None，上传时使用当前矩阵
    prev_view_proj: Option<Mat4>,

    view: ProxyBuffer<prismsl::View>,
}
// new & init
impl CameraProxy {
    pub fn new(resolution: UVec2) -> Self {
        let mut view = ProxyBuffer::new("view-buffer");
        view.push(<prismsl::View as bytemuck::Zeroable>::zeroed());
        Self {
            camera: None,
            resolution,
            prev_view_proj: None,
            view,
        }
    }
}
// getter
impl CameraProxy {
    #[inline]
    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    #[inline]
    pub fn camera(&self) -> Option<&CameraComponent> {
        self.camera.as_ref()
    }

    #[inline]
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// 上传后的 view 数据
    #[inline]
    pub fn view(&self) -> &prismsl::View {
        self.view.device_record(0).unwrap_or(&self.view.records()[0])
    }

    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::View> {
        &self.view
    }
}
// update
impl CameraProxy {
    /// 重新绑定相机会丢弃上一帧矩阵
    pub fn add_camera(&mut self, camera: CameraComponent) {
        if self.camera.is_some() {
            log::info!("replace active camera");
        }
        self.camera = Some(camera);
        self.prev_view_proj = None;
        self.view.mark_dirty(0);
    }

    pub fn update_camera(&mut self, camera: CameraComponent) {
        if self.camera.is_none() {
            log::error!("update camera before any camera is added");
            return;
        }
        self.camera = Some(camera);
        self.view.mark_dirty(0);
    }

    pub fn set_resolution(&mut self, resolution: UVec2) {
        if self.resolution != resolution {
            self.resolution = resolution;
            self.view.mark_dirty(0);
        }
    }

    /// # Phase: After Render
    ///
    /// 当前矩阵成为上一帧矩阵
    pub fn advance_frame(&mut self) {
        if self.camera.is_none() {
            return;
        }
        let current = self.view.records()[0].view_proj;
        if self.prev_view_proj != Some(current) {
            self.prev_view_proj = Some(current);
            self.view.mark_dirty(0);
        }
    }

    fn compute_view(camera: &CameraComponent, resolution: UVec2, prev_view_proj: Option<Mat4>) -> prismsl::View {
        let aspect = resolution.x.max(1) as f32 / resolution.y.max(1) as f32;
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect);
        let view_proj = proj * view;

        let tan_half_fov = (camera.fov_y_deg.to_radians() * 0.5).tan();
        prismsl::View {
            view,
            proj,
            view_proj,
            inv_view: view.inverse(),
            inv_proj: proj.inverse(),
            prev_view_proj: prev_view_proj.unwrap_or(view_proj),
            position: camera.position,
            fov_y: camera.fov_y_deg.to_radians(),
            cam_right: camera.right() * tan_half_fov * aspect,
            aspect,
            cam_up: camera.up() * tan_half_fov,
            near: camera.near,
            cam_forward: camera.forward(),
            far: camera.far,
            resolution,
            _padding: [0; 2],
        }
    }
}
impl SceneProxy for CameraProxy {
    fn name(&self) -> &str {
        "CameraProxy"
    }

    fn is_dirty(&self) -> bool {
        self.view.is_dirty()
    }

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        if !self.view.is_dirty() {
            return;
        }
        let _span = tracy_client::span!("CameraProxy::upload_dirty_data");

        if let Some(camera) = &self.camera {
            let record = Self::compute_view(camera, self.resolution, self.prev_view_proj);
            self.prev_view_proj.get_or_insert(record.view_proj);
            self.view.set(0, record);
        }
        self.view.upload(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxies::scene_proxy::test_utils::UploadEnv;
    use glam::Vec3;

    #[test]
    fn test_prev_view_proj_on_first_frame() {
        let mut env = UploadEnv::new();
        let mut proxy = CameraProxy::new(UVec2::new(64, 32));
        proxy.update_camera(CameraComponent::default());
        assert!(!proxy.has_camera());

        proxy.add_camera(CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        let view = *proxy.view();
        assert_eq!(view.prev_view_proj, view.view_proj);
        assert_eq!(view.aspect, 2.0);
        assert_eq!(view.resolution, UVec2::new(64, 32));

        // 静止的相机在 advance 之后不会重复上传
        proxy.advance_frame();
        assert_eq!(env.upload(|ctx| proxy.upload_dirty_data(ctx)), 0);

        proxy.update_camera(CameraComponent::look_at(Vec3::new(1.0, 0.0, 3.0), Vec3::ZERO));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        let moved = *proxy.view();
        assert_eq!(moved.prev_view_proj, view.view_proj);
        assert_ne!(moved.view_proj, view.view_proj);

        proxy.advance_frame();
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        assert_eq!(proxy.view().prev_view_proj, moved.view_proj);
    }

    #[test]
    fn test_ray_gen_coefficients() {
        let mut env = UploadEnv::new();
        let mut proxy = CameraProxy::new(UVec2::new(100, 100));
        proxy.add_camera(CameraComponent::look_at(Vec3::ZERO, Vec3::NEG_Z).with_fov(90.0));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));

        // 90 度视角下，ndc (1, 1) 对应的方向与 forward 夹角为 45 度（水平与垂直方向）
        let view = proxy.view();
        assert!(view.cam_right.abs_diff_eq(Vec3::X, 1e-5));
        assert!(view.cam_up.abs_diff_eq(Vec3::Y, 1e-5));

        proxy.set_resolution(UVec2::new(100, 100));
        assert!(!proxy.is_dirty());
        proxy.set_resolution(UVec2::new(200, 100));
        assert!(proxy.is_dirty());
    }
}
