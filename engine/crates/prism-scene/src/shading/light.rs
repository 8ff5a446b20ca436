use std::f32::consts::PI;

use glam::{Mat4, Vec2, Vec3};
use prism_shader_binding::prismsl;

use crate::shading::sampling;

/// 被照亮的表面点
#[derive(Copy, Clone, Debug)]
pub struct ShadingPoint {
    pub position: Vec3,
    /// 朝向观察者一侧的法线
    pub normal: Vec3,
}

/// 光源对某个表面点的贡献
#[derive(Copy, Clone, Debug)]
pub struct LightSample {
    /// 从表面点指向光源
    pub direction: Vec3,
    /// 到光源采样点的距离，环境光为无穷远
    pub distance: f32,
    pub radiance: Vec3,
    /// 立体角上的 pdf；`l_i` 的结果恒为 1
    pub pdf: f32,
    /// 是否需要 shadow ray
    pub shadowed: bool,
}

impl LightSample {
    /// 没有贡献
    fn none(p: &ShadingPoint) -> Self {
        Self {
            direction: p.normal,
            distance: 0.0,
            radiance: Vec3::ZERO,
            pdf: 1.0,
            shadowed: false,
        }
    }
}

/// 着色点与光源重合时不计贡献
const MIN_LIGHT_DISTANCE: f32 = 1e-6;

/// 有求值器的光源类型
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Rect,
    ConstantAmbient,
}
impl LightKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            prismsl::LIGHT_TYPE_POINT => Some(Self::Point),
            prismsl::LIGHT_TYPE_RECT => Some(Self::Rect),
            prismsl::LIGHT_TYPE_CONSTANT => Some(Self::ConstantAmbient),
            _ => None,
        }
    }
}

/// 光源记录 + 其世界变换
#[derive(Copy, Clone, Debug)]
pub struct LightInstance {
    pub kind: LightKind,
    pub record: prismsl::Light,
    pub transform: Mat4,
}
// new & init
impl LightInstance {
    pub fn new(record: prismsl::Light, transform: Mat4) -> Option<Self> {
        Some(Self {
            kind: LightKind::from_tag(record.light_type)?,
            record,
            transform,
        })
    }
}
// getter
impl LightInstance {
    #[inline]
    fn power(&self) -> Vec3 {
        self.record.color * self.record.intensity
    }

    #[inline]
    fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// 只有无半径的点光源是 delta 光源，BSDF 采样无法命中
    #[inline]
    pub fn is_delta(&self) -> bool {
        self.kind == LightKind::Point && self.record.radius <= 0.0
    }

    #[inline]
    pub fn is_ambient(&self) -> bool {
        self.kind == LightKind::ConstantAmbient
    }

    /// BSDF 采样的光线能否命中该光源：环境光在未命中时命中，其他光源需要绑定 instance
    #[inline]
    pub fn is_hittable(&self) -> bool {
        match self.kind {
            LightKind::ConstantAmbient => true,
            LightKind::Point | LightKind::Rect => !self.is_delta() && self.record.instance_id != prismsl::INVALID_ID,
        }
    }

    /// 矩形在世界空间中的两条边与发光方向
    fn rect_frame(&self) -> (Vec3, Vec3, Vec3) {
        let edge_x = self.transform.transform_vector3(Vec3::X * self.record.rect_size.x);
        let edge_z = self.transform.transform_vector3(Vec3::Z * self.record.rect_size.y);
        // 局部 X x Z = -Y
        (edge_x, edge_z, edge_x.cross(edge_z).normalize_or_zero())
    }

    fn sphere_radius(&self) -> f32 {
        self.record.radius * self.transform.x_axis.truncate().length()
    }
}
// evaluate
impl LightInstance {
    /// 确定性的入射光：点光源取中心，矩形光源取中心并按面积缩放，环境光取法线方向的积分
    pub fn l_i(&self, p: &ShadingPoint) -> LightSample {
        match self.kind {
            LightKind::Point => {
                let to_light = self.position() - p.position;
                let distance = to_light.length();
                if distance <= MIN_LIGHT_DISTANCE {
                    return LightSample::none(p);
                }
                LightSample {
                    direction: to_light / distance,
                    distance,
                    radiance: self.power() / (distance * distance),
                    pdf: 1.0,
                    shadowed: true,
                }
            }
            LightKind::Rect => {
                let (edge_x, edge_z, normal) = self.rect_frame();
                let to_light = self.position() - p.position;
                let distance = to_light.length();
                if distance <= MIN_LIGHT_DISTANCE {
                    return LightSample::none(p);
                }
                let direction = to_light / distance;
                let cos_l = normal.dot(-direction).max(0.0);
                let area = edge_x.cross(edge_z).length();
                LightSample {
                    direction,
                    distance,
                    radiance: self.power() * cos_l * area / (distance * distance),
                    pdf: 1.0,
                    shadowed: true,
                }
            }
            LightKind::ConstantAmbient => LightSample {
                direction: p.normal,
                distance: f32::INFINITY,
                radiance: self.power() * PI,
                pdf: 1.0,
                shadowed: false,
            },
        }
    }

    /// 重要性采样一个方向；采样点在背面时返回 None
    pub fn sample_li(&self, p: &ShadingPoint, u: Vec2) -> Option<LightSample> {
        match self.kind {
            LightKind::Point => {
                let radius = self.sphere_radius();
                if radius <= 0.0 {
                    return Some(self.l_i(p));
                }
                let local_normal = sampling::uniform_sample_sphere(u);
                let light_point = self.position() + local_normal * radius;
                let to_light = light_point - p.position;
                let distance = to_light.length();
                if distance <= MIN_LIGHT_DISTANCE {
                    return None;
                }
                let direction = to_light / distance;
                let cos_l = local_normal.dot(-direction);
                if cos_l <= 0.0 {
                    return None;
                }
                Some(LightSample {
                    direction,
                    distance,
                    radiance: self.power() / (PI * radius * radius),
                    pdf: distance * distance / (cos_l * 4.0 * PI * radius * radius),
                    shadowed: true,
                })
            }
            LightKind::Rect => {
                let (edge_x, edge_z, normal) = self.rect_frame();
                let light_point = self.position() + edge_x * (u.x - 0.5) + edge_z * (u.y - 0.5);
                let to_light = light_point - p.position;
                let distance = to_light.length();
                if distance <= MIN_LIGHT_DISTANCE {
                    return None;
                }
                let direction = to_light / distance;
                let cos_l = normal.dot(-direction);
                let area = edge_x.cross(edge_z).length();
                if cos_l <= 0.0 || area <= 0.0 {
                    return None;
                }
                Some(LightSample {
                    direction,
                    distance,
                    radiance: self.power(),
                    pdf: distance * distance / (cos_l * area),
                    shadowed: true,
                })
            }
            LightKind::ConstantAmbient => {
                let (direction, pdf) = sampling::cosine_sample_hemisphere(p.normal, u);
                if pdf <= 0.0 {
                    return None;
                }
                Some(LightSample {
                    direction,
                    distance: f32::INFINITY,
                    radiance: self.power(),
                    pdf,
                    shadowed: true,
                })
            }
        }
    }

    /// 沿 `w_i` 走 `t` 之后命中该光源时，`sample_li` 产生这个方向的立体角 pdf
    pub fn pdf_li(&self, p: &ShadingPoint, w_i: Vec3, t: f32) -> f32 {
        match self.kind {
            LightKind::Point => {
                let radius = self.sphere_radius();
                if radius <= 0.0 {
                    return 0.0;
                }
                let light_point = p.position + w_i * t;
                let cos_l = ((light_point - self.position()) / radius).dot(-w_i);
                if cos_l <= 0.0 {
                    return 0.0;
                }
                t * t / (cos_l * 4.0 * PI * radius * radius)
            }
            LightKind::Rect => {
                let (edge_x, edge_z, normal) = self.rect_frame();
                let cos_l = normal.dot(-w_i);
                let area = edge_x.cross(edge_z).length();
                if cos_l <= 0.0 || area <= 0.0 {
                    return 0.0;
                }
                t * t / (cos_l * area)
            }
            LightKind::ConstantAmbient => sampling::cosine_hemisphere_pdf(p.normal, w_i),
        }
    }

    /// 作为几何体或环境被看到时的辐射亮度，`w_o` 从光源指向观察者
    pub fn le(&self, w_o: Vec3) -> Vec3 {
        match self.kind {
            LightKind::Point => {
                let radius = self.sphere_radius();
                if radius <= 0.0 { self.power() } else { self.power() / (PI * radius * radius) }
            }
            LightKind::Rect => {
                let (_, _, normal) = self.rect_frame();
                if normal.dot(w_o) > 0.0 { self.power() } else { Vec3::ZERO }
            }
            LightKind::ConstantAmbient => self.power(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shading::sampling::{pixel_rng, random2d};

    fn record(light_type: u32) -> prismsl::Light {
        prismsl::Light {
            light_type,
            instance_id: prismsl::INVALID_ID,
            transform_id: prismsl::INVALID_ID,
            _padding0: 0,
            color: Vec3::ONE,
            intensity: 4.0,
            rect_size: Vec2::new(2.0, 2.0),
            radius: 0.0,
            _padding1: 0.0,
        }
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(LightKind::from_tag(prismsl::LIGHT_TYPE_RECT), Some(LightKind::Rect));
        assert_eq!(LightKind::from_tag(42), None);
    }

    #[test]
    fn test_point_light_falloff() {
        let light = LightInstance::new(record(prismsl::LIGHT_TYPE_POINT), Mat4::from_translation(Vec3::Y * 2.0)).unwrap();
        let p = ShadingPoint {
            position: Vec3::ZERO,
            normal: Vec3::Y,
        };
        let sample = light.l_i(&p);
        assert!(sample.direction.abs_diff_eq(Vec3::Y, 1e-6));
        assert!(sample.radiance.abs_diff_eq(Vec3::ONE, 1e-6));
        assert!(light.is_delta());
        assert!(!light.is_hittable());
        assert_eq!(light.pdf_li(&p, Vec3::Y, 2.0), 0.0);
    }

    #[test]
    fn test_shading_point_on_light() {
        let p = ShadingPoint {
            position: Vec3::Y * 2.0,
            normal: Vec3::Y,
        };
        for light_type in [prismsl::LIGHT_TYPE_POINT, prismsl::LIGHT_TYPE_RECT] {
            let light = LightInstance::new(record(light_type), Mat4::from_translation(Vec3::Y * 2.0)).unwrap();
            let sample = light.l_i(&p);
            assert_eq!(sample.radiance, Vec3::ZERO);
            assert!(sample.direction.is_finite());
            assert!(!sample.shadowed);
        }
    }

    #[test]
    fn test_hittable_requires_instance() {
        let mut rect = record(prismsl::LIGHT_TYPE_RECT);
        assert!(!LightInstance::new(rect, Mat4::IDENTITY).unwrap().is_hittable());
        rect.instance_id = 3;
        assert!(LightInstance::new(rect, Mat4::IDENTITY).unwrap().is_hittable());

        let mut sphere = record(prismsl::LIGHT_TYPE_POINT);
        sphere.radius = 0.5;
        sphere.instance_id = 3;
        assert!(LightInstance::new(sphere, Mat4::IDENTITY).unwrap().is_hittable());
        assert!(LightInstance::new(record(prismsl::LIGHT_TYPE_CONSTANT), Mat4::IDENTITY).unwrap().is_hittable());
    }

    #[test]
    fn test_rect_light_sample_pdf_matches_pdf_li() {
        let light = LightInstance::new(record(prismsl::LIGHT_TYPE_RECT), Mat4::from_translation(Vec3::Y * 3.0)).unwrap();
        let p = ShadingPoint {
            position: Vec3::new(0.2, 0.0, -0.1),
            normal: Vec3::Y,
        };
        let mut rng = pixel_rng(1, 1);
        for _ in 0..32 {
            let sample = light.sample_li(&p, random2d(&mut rng)).unwrap();
            let pdf = light.pdf_li(&p, sample.direction, sample.distance);
            assert!((pdf - sample.pdf).abs() / pdf < 1e-4);
        }

        // 矩形光源只朝 -Y 发光
        let below = ShadingPoint {
            position: Vec3::Y * 5.0,
            normal: Vec3::NEG_Y,
        };
        assert!(light.sample_li(&below, Vec2::splat(0.5)).is_none());
        assert_eq!(light.le(Vec3::NEG_Y), Vec3::splat(4.0));
        assert_eq!(light.le(Vec3::Y), Vec3::ZERO);
    }

    #[test]
    fn test_ambient_light() {
        let light = LightInstance::new(record(prismsl::LIGHT_TYPE_CONSTANT), Mat4::IDENTITY).unwrap();
        let p = ShadingPoint {
            position: Vec3::ZERO,
            normal: Vec3::Z,
        };
        let sample = light.l_i(&p);
        assert!(!sample.shadowed);
        assert!(sample.radiance.abs_diff_eq(Vec3::splat(4.0 * PI), 1e-5));

        let sample = light.sample_li(&p, Vec2::new(0.3, 0.6)).unwrap();
        assert!((light.pdf_li(&p, sample.direction, f32::INFINITY) - sample.pdf).abs() < 1e-5);
    }
}
