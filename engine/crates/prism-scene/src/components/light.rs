use glam::{Vec2, Vec3};
use prism_shader_binding::prismsl;

/// 光源的形状
///
/// 只有 point / rect / constant ambient 有对应的求值器，其余类型在添加时会被拒绝。
#[derive(Clone, Debug, PartialEq)]
pub enum LightShape {
    Point { radius: f32 },
    /// 位于局部 XZ 平面，朝 -Y 发光
    Rect { size: Vec2 },
    ConstantAmbient,
    Spot { radius: f32, cone_angle_deg: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightComponent {
    pub shape: LightShape,
    pub color: Vec3,
    pub intensity: f32,
}
impl LightComponent {
    pub fn point(color: Vec3, intensity: f32) -> Self {
        Self {
            shape: LightShape::Point { radius: 0.0 },
            color,
            intensity,
        }
    }

    pub fn rect(size: Vec2, color: Vec3, intensity: f32) -> Self {
        Self {
            shape: LightShape::Rect { size },
            color,
            intensity,
        }
    }

    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self {
            shape: LightShape::ConstantAmbient,
            color,
            intensity,
        }
    }

    /// 没有求值器的类型返回 None
    pub fn type_tag(&self) -> Option<u32> {
        match self.shape {
            LightShape::Point { .. } => Some(prismsl::LIGHT_TYPE_POINT),
            LightShape::Rect { .. } => Some(prismsl::LIGHT_TYPE_RECT),
            LightShape::ConstantAmbient => Some(prismsl::LIGHT_TYPE_CONSTANT),
            LightShape::Spot { .. } => None,
        }
    }

    /// 只写入光源自身的数据，instance / transform 的绑定由 proxy 维护
    pub fn write_record(&self, record: &mut prismsl::Light, light_type: u32) {
        record.light_type = light_type;
        record.color = self.color;
        record.intensity = self.intensity;
        (record.radius, record.rect_size) = match self.shape {
            LightShape::Point { radius } => (radius, Vec2::ZERO),
            LightShape::Rect { size } => (0.0, size),
            _ => (0.0, Vec2::ZERO),
        };
    }
}
