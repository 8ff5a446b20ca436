use glam::{EulerRot, Mat4, Vec3};

/// 透视相机
///
/// 位置 + YXZ 欧拉角，没有旋转时看向 -Z。
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraComponent {
    pub position: Vec3,

    pub euler_yaw_deg: f32,
    pub euler_pitch_deg: f32,
    pub euler_roll_deg: f32,

    /// 垂直方向的视角
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
}
impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            euler_yaw_deg: 0.0,
            euler_pitch_deg: 0.0,
            euler_roll_deg: 0.0,
            fov_y_deg: 45.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}
impl CameraComponent {
    /// 相机的上参考向量
    const CAMERA_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    /// YXZ 表示 Y(yaw)-X(Pitch)-Z(Roll) 的旋转顺序
    const CAMERA_EULER: EulerRot = EulerRot::YXZ;

    /// 没有旋转的情况下，相机看向的是 -Z
    const CAMERA_FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    const CAMERA_RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

    const K_PITCH: f32 = 89.5;

    /// 位于 `position`，看向 `target`，roll 为 0
    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            position,
            ..Default::default()
        };
        let dir = (target - position).normalize_or_zero();
        if dir != Vec3::ZERO {
            camera.euler_pitch_deg = dir.y.clamp(-1.0, 1.0).asin().to_degrees().clamp(-Self::K_PITCH, Self::K_PITCH);
            camera.euler_yaw_deg = (-dir.x).atan2(-dir.z).to_degrees();
        }
        camera
    }

    pub fn with_fov(mut self, fov_y_deg: f32) -> Self {
        self.fov_y_deg = fov_y_deg;
        self
    }

    #[inline]
    fn rotation(&self) -> Mat4 {
        Mat4::from_euler(
            Self::CAMERA_EULER,
            self.euler_yaw_deg.to_radians(),
            self.euler_pitch_deg.to_radians(),
            self.euler_roll_deg.to_radians(),
        )
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_FORWARD)
    }

    pub fn right(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_RIGHT)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_UP)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), aspect, self.near, self.far)
    }

    /// 朝相机看向的方向进行移动
    pub fn move_forward(&mut self, length: f32) {
        self.position += self.forward() * length;
    }

    pub fn move_right(&mut self, length: f32) {
        self.position += self.right() * length;
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        self.euler_yaw_deg = (self.euler_yaw_deg + angle).rem_euclid(360.0);
    }

    pub fn rotate_pitch(&mut self, angle: f32) {
        self.euler_pitch_deg = (self.euler_pitch_deg + angle).clamp(-Self::K_PITCH, Self::K_PITCH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at() {
        let camera = CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        assert!(camera.forward().abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!(camera.right().abs_diff_eq(Vec3::X, 1e-5));

        let camera = CameraComponent::look_at(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        assert!(camera.forward().abs_diff_eq(Vec3::new(1.0, 1.0, 0.0).normalize(), 1e-5));
    }

    #[test]
    fn test_view_matrix_moves_target_to_neg_z() {
        let camera = CameraComponent::look_at(Vec3::new(2.0, 1.0, 5.0), Vec3::new(2.0, 1.0, 0.0));
        let p = camera.view_matrix().transform_point3(Vec3::new(2.0, 1.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }
}
