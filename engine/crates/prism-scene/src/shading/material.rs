use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use prism_shader_binding::prismsl;

use crate::intersection::RayIntersection;
use crate::shading::sampling;

/// 着色时使用的材质参数，已经解析出着色法线
#[derive(Copy, Clone, Debug)]
pub struct MaterialParameters {
    /// 与 `w_o` 同侧的着色法线
    pub normal: Vec3,
    pub base_color: Vec3,
    pub emission: Vec3,
    pub alpha: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub specular_tint: f32,
}

/// 一种着色模型
///
/// 参数的 getter 都有默认实现，各个着色模型只覆盖需要的部分。
pub trait MaterialShader {
    /// 按 normal mode 选择法线，并翻转到观察方向一侧
    fn normal(&self, material: &prismsl::Material, hit: &RayIntersection, w_o: Vec3) -> Vec3 {
        let n = match material.normal_mode {
            prismsl::NORMAL_MODE_VERTEX => hit.vertex_normal,
            prismsl::NORMAL_MODE_CORNER => hit.corner_normal,
            _ => hit.triangle_normal,
        };
        let n = if n == Vec3::ZERO { hit.triangle_normal } else { n };
        if hit.triangle_normal.dot(w_o) < 0.0 { -n } else { n }
    }

    fn base_color(&self, material: &prismsl::Material) -> Vec3 {
        material.base_color
    }

    fn metalness(&self, material: &prismsl::Material) -> f32 {
        material.metalness
    }

    fn roughness(&self, material: &prismsl::Material) -> f32 {
        material.roughness
    }

    fn specular_tint(&self, material: &prismsl::Material) -> f32 {
        material.specular_tint
    }

    fn calc_material_parameters(
        &self,
        material: &prismsl::Material,
        hit: &RayIntersection,
        w_o: Vec3,
    ) -> MaterialParameters {
        MaterialParameters {
            normal: self.normal(material, hit, w_o),
            base_color: self.base_color(material),
            emission: material.emission,
            alpha: material.alpha,
            metalness: self.metalness(material),
            roughness: self.roughness(material),
            specular_tint: self.specular_tint(material),
        }
    }

    /// `w_o` / `w_i` 都指向表面外侧
    fn bxdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> Vec3;

    fn pdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> f32;

    /// 返回 (w_i, pdf)，采样到表面下方时返回 None
    fn sample(&self, params: &MaterialParameters, w_o: Vec3, u: Vec2) -> Option<(Vec3, f32)>;
}

/// Disney 风格的 PBR：Lambert 漫反射 + GGX 高光
pub struct DisneyShader;
impl DisneyShader {
    const MIN_ALPHA: f32 = 1e-3;

    #[inline]
    fn alpha(params: &MaterialParameters) -> f32 {
        (params.roughness * params.roughness).max(Self::MIN_ALPHA)
    }

    fn f0(params: &MaterialParameters) -> Vec3 {
        let luminance = params.base_color.dot(Vec3::new(0.2126, 0.7152, 0.0722));
        let tint = if luminance > 0.0 { params.base_color / luminance } else { Vec3::ONE };
        let dielectric = 0.04 * Vec3::ONE.lerp(tint, params.specular_tint);
        dielectric.lerp(params.base_color, params.metalness)
    }

    /// 选择高光 lobe 的概率
    #[inline]
    fn specular_probability(params: &MaterialParameters) -> f32 {
        0.5 + 0.5 * params.metalness
    }

    fn ggx_d(n_dot_h: f32, alpha: f32) -> f32 {
        let a2 = alpha * alpha;
        let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
        a2 / (PI * d * d)
    }

    fn smith_g1(n_dot_v: f32, alpha: f32) -> f32 {
        let a2 = alpha * alpha;
        2.0 * n_dot_v / (n_dot_v + (a2 + (1.0 - a2) * n_dot_v * n_dot_v).sqrt())
    }

    fn schlick(f0: Vec3, cos: f32) -> Vec3 {
        f0 + (Vec3::ONE - f0) * (1.0 - cos).clamp(0.0, 1.0).powi(5)
    }
}
impl MaterialShader for DisneyShader {
    fn bxdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> Vec3 {
        let n = params.normal;
        let n_dot_l = n.dot(w_i);
        let n_dot_v = n.dot(w_o);
        if n_dot_l <= 0.0 || n_dot_v <= 0.0 {
            return Vec3::ZERO;
        }
        let h = (w_o + w_i).normalize();
        let alpha = Self::alpha(params);
        let f = Self::schlick(Self::f0(params), w_i.dot(h));
        let specular = f * Self::ggx_d(n.dot(h), alpha) * Self::smith_g1(n_dot_l, alpha) * Self::smith_g1(n_dot_v, alpha)
            / (4.0 * n_dot_l * n_dot_v);
        let diffuse = params.base_color * (1.0 - params.metalness) / PI;
        diffuse + specular
    }

    fn pdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> f32 {
        let n = params.normal;
        if n.dot(w_i) <= 0.0 || n.dot(w_o) <= 0.0 {
            return 0.0;
        }
        let h = (w_o + w_i).normalize();
        let specular_pdf = Self::ggx_d(n.dot(h), Self::alpha(params)) * n.dot(h) / (4.0 * w_o.dot(h).abs());
        let p = Self::specular_probability(params);
        p * specular_pdf + (1.0 - p) * sampling::cosine_hemisphere_pdf(n, w_i)
    }

    fn sample(&self, params: &MaterialParameters, w_o: Vec3, u: Vec2) -> Option<(Vec3, f32)> {
        let n = params.normal;
        let p = Self::specular_probability(params);
        let w_i = if u.x < p {
            // 重用 u.x 作为第二维随机数
            let u = Vec2::new(u.x / p, u.y);
            let alpha = Self::alpha(params);
            let cos_theta = ((1.0 - u.x) / (1.0 + (alpha * alpha - 1.0) * u.x)).max(0.0).sqrt();
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let phi = 2.0 * PI * u.y;
            let h = sampling::to_world(Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta), n);
            2.0 * w_o.dot(h) * h - w_o
        } else {
            let u = Vec2::new((u.x - p) / (1.0 - p), u.y);
            sampling::cosine_sample_hemisphere(n, u).0
        };
        let pdf = self.pdf(params, w_o, w_i);
        (pdf > 0.0).then_some((w_i.normalize(), pdf))
    }
}

/// Blinn-Phong：没有金属度，余弦分布采样
pub struct BlinnPhongShader;
impl BlinnPhongShader {
    #[inline]
    fn shininess(params: &MaterialParameters) -> f32 {
        let alpha = (params.roughness * params.roughness).max(1e-3);
        (2.0 / (alpha * alpha) - 2.0).max(0.0)
    }

    #[inline]
    fn specular_weight(params: &MaterialParameters) -> f32 {
        0.04 + 0.46 * params.specular_tint
    }
}
impl MaterialShader for BlinnPhongShader {
    fn metalness(&self, _material: &prismsl::Material) -> f32 {
        0.0
    }

    fn bxdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> Vec3 {
        let n = params.normal;
        if n.dot(w_i) <= 0.0 || n.dot(w_o) <= 0.0 {
            return Vec3::ZERO;
        }
        let ks = Self::specular_weight(params);
        let shininess = Self::shininess(params);
        let h = (w_o + w_i).normalize();
        let specular = (shininess + 2.0) / (2.0 * PI) * n.dot(h).max(0.0).powf(shininess);
        params.base_color * (1.0 - ks) / PI + Vec3::splat(ks * specular)
    }

    fn pdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> f32 {
        if params.normal.dot(w_o) <= 0.0 {
            return 0.0;
        }
        sampling::cosine_hemisphere_pdf(params.normal, w_i)
    }

    fn sample(&self, params: &MaterialParameters, w_o: Vec3, u: Vec2) -> Option<(Vec3, f32)> {
        let (w_i, _) = sampling::cosine_sample_hemisphere(params.normal, u);
        let pdf = self.pdf(params, w_o, w_i);
        (pdf > 0.0).then_some((w_i, pdf))
    }
}

/// 按 shader type tag 分派
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaterialShaderKind {
    Disney,
    BlinnPhong,
}
impl MaterialShaderKind {
    /// 未知的 tag 退回到 Disney
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            prismsl::SHADER_TYPE_BLINN_PHONG => Self::BlinnPhong,
            _ => Self::Disney,
        }
    }

    pub fn calc_material_parameters(
        &self,
        material: &prismsl::Material,
        hit: &RayIntersection,
        w_o: Vec3,
    ) -> MaterialParameters {
        match self {
            Self::Disney => DisneyShader.calc_material_parameters(material, hit, w_o),
            Self::BlinnPhong => BlinnPhongShader.calc_material_parameters(material, hit, w_o),
        }
    }

    #[inline]
    pub fn bxdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> Vec3 {
        match self {
            Self::Disney => DisneyShader.bxdf(params, w_o, w_i),
            Self::BlinnPhong => BlinnPhongShader.bxdf(params, w_o, w_i),
        }
    }

    #[inline]
    pub fn pdf(&self, params: &MaterialParameters, w_o: Vec3, w_i: Vec3) -> f32 {
        match self {
            Self::Disney => DisneyShader.pdf(params, w_o, w_i),
            Self::BlinnPhong => BlinnPhongShader.pdf(params, w_o, w_i),
        }
    }

    #[inline]
    pub fn sample(&self, params: &MaterialParameters, w_o: Vec3, u: Vec2) -> Option<(Vec3, f32)> {
        match self {
            Self::Disney => DisneyShader.sample(params, w_o, u),
            Self::BlinnPhong => BlinnPhongShader.sample(params, w_o, u),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shading::sampling::{pixel_rng, random2d};

    fn hit_facing(normal: Vec3) -> RayIntersection {
        RayIntersection {
            instance_id: 0,
            triangle_normal: normal,
            vertex_normal: Vec3::new(0.0, 1.0, 1.0).normalize(),
            corner_normal: normal,
            ..RayIntersection::invalid()
        }
    }

    #[test]
    fn test_normal_mode_and_face_forward() {
        let mut material = prismsl::Material::default();
        let hit = hit_facing(Vec3::Z);
        let params = DisneyShader.calc_material_parameters(&material, &hit, Vec3::NEG_Z);
        assert_eq!(params.normal, Vec3::NEG_Z);

        material.normal_mode = prismsl::NORMAL_MODE_VERTEX;
        let params = DisneyShader.calc_material_parameters(&material, &hit, Vec3::Z);
        assert_eq!(params.normal, hit.vertex_normal);
    }

    #[test]
    fn test_blinn_phong_overrides_metalness() {
        let material = prismsl::Material {
            metalness: 1.0,
            ..Default::default()
        };
        let hit = hit_facing(Vec3::Z);
        assert_eq!(MaterialShaderKind::BlinnPhong.calc_material_parameters(&material, &hit, Vec3::Z).metalness, 0.0);
        assert_eq!(MaterialShaderKind::Disney.calc_material_parameters(&material, &hit, Vec3::Z).metalness, 1.0);
        assert_eq!(MaterialShaderKind::from_tag(77), MaterialShaderKind::Disney);
    }

    #[test]
    fn test_sample_pdf_matches_pdf() {
        let hit = hit_facing(Vec3::Y);
        let w_o = Vec3::new(0.3, 1.0, 0.2).normalize();
        let mut rng = pixel_rng(2, 9);
        for (kind, roughness, metalness) in [
            (MaterialShaderKind::Disney, 1.0, 0.0),
            (MaterialShaderKind::Disney, 0.3, 0.8),
            (MaterialShaderKind::BlinnPhong, 0.5, 0.0),
        ] {
            let material = prismsl::Material {
                roughness,
                metalness,
                ..Default::default()
            };
            let params = kind.calc_material_parameters(&material, &hit, w_o);
            for _ in 0..64 {
                let Some((w_i, pdf)) = kind.sample(&params, w_o, random2d(&mut rng)) else {
                    continue;
                };
                let expected = kind.pdf(&params, w_o, w_i);
                assert!((pdf - expected).abs() <= 1e-3 * expected.max(1.0), "{kind:?}: {pdf} vs {expected}");
                assert!(kind.bxdf(&params, w_o, w_i).min_element() >= 0.0);
            }
        }
    }

    #[test]
    fn test_lambert_estimator_is_unbiased() {
        // 纯漫反射：E[f * cos / pdf] = albedo
        let hit = hit_facing(Vec3::Y);
        let material = prismsl::Material {
            base_color: Vec3::splat(0.6),
            roughness: 1.0,
            ..Default::default()
        };
        let kind = MaterialShaderKind::BlinnPhong;
        let params = kind.calc_material_parameters(&material, &hit, Vec3::Y);
        let mut rng = pixel_rng(0, 0);
        let mut sum = Vec3::ZERO;
        let n = 4096;
        for _ in 0..n {
            let (w_i, pdf) = kind.sample(&params, Vec3::Y, random2d(&mut rng)).unwrap();
            sum += kind.bxdf(&params, Vec3::Y, w_i) * w_i.dot(Vec3::Y) / pdf;
        }
        let expected = 0.6 * (1.0 - 0.04) + 0.04;
        assert!((sum.x / n as f32 - expected).abs() < 0.05);
    }
}
