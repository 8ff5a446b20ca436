use glam::{Vec2, Vec3};
use prism_shader_binding::prismsl;

/// 一次光线求交的完整结果
///
/// 未命中时 `instance_id == INVALID_ID`，其余字段没有意义。
#[derive(Copy, Clone, Debug)]
pub struct RayIntersection {
    pub instance_id: u32,
    pub primitive_id: u32,
    pub shape: prismsl::Shape,
    pub material_id: u32,

    /// 世界空间
    pub position: Vec3,
    /// 世界空间下三角形三个顶点，线框绘制需要
    pub triangle: [Vec3; 3],
    pub triangle_normal: Vec3,
    pub vertex_normal: Vec3,
    pub corner_normal: Vec3,
    /// 三个顶点的权重
    pub barycentrics: Vec3,
    pub uv: Vec2,

    /// 光线起点到命中点的距离
    pub depth: f32,
    /// 光线参数，与 `GfxRay::at` 对应
    pub t: f32,
    /// 屏幕 uv 空间下 当前位置 - 上一帧位置
    pub motion: Vec2,
    /// 光线是否从三角形正面射入
    pub front_face: bool,
}
impl RayIntersection {
    pub fn invalid() -> Self {
        Self {
            instance_id: prismsl::INVALID_ID,
            primitive_id: prismsl::INVALID_ID,
            shape: prismsl::Shape::unconfigured(),
            material_id: prismsl::INVALID_ID,
            position: Vec3::ZERO,
            triangle: [Vec3::ZERO; 3],
            triangle_normal: Vec3::ZERO,
            vertex_normal: Vec3::ZERO,
            corner_normal: Vec3::ZERO,
            barycentrics: Vec3::ZERO,
            uv: Vec2::ZERO,
            depth: f32::INFINITY,
            t: f32::INFINITY,
            motion: Vec2::ZERO,
            front_face: false,
        }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.instance_id != prismsl::INVALID_ID
    }
}
