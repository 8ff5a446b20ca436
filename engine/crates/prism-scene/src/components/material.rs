use glam::Vec3;
use prism_shader_binding::prismsl;

/// 着色模型
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderModel {
    Disney,
    BlinnPhong,
    /// 外部编辑器里的自定义 shader，当前没有对应的求值器
    Custom(String),
}

/// 着色法线的来源
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NormalMode {
    #[default]
    Triangle,
    Vertex,
    Corner,
}

/// CPU 侧的材质数据
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialComponent {
    pub shader: ShaderModel,
    pub normal_mode: NormalMode,
    pub base_color: Vec3,
    pub emission: Vec3,
    pub alpha: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub specular_tint: f32,
    pub wireframe: bool,
}
impl Default for MaterialComponent {
    fn default() -> Self {
        Self {
            shader: ShaderModel::Disney,
            normal_mode: NormalMode::default(),
            base_color: Vec3::splat(0.8),
            emission: Vec3::ZERO,
            alpha: 1.0,
            metalness: 0.0,
            roughness: 0.5,
            specular_tint: 0.0,
            wireframe: false,
        }
    }
}
impl MaterialComponent {
    pub fn diffuse(base_color: Vec3) -> Self {
        Self {
            base_color,
            roughness: 1.0,
            ..Default::default()
        }
    }

    /// 没有求值器的 shader 返回 None
    pub fn shader_tag(&self) -> Option<u32> {
        match self.shader {
            ShaderModel::Disney => Some(prismsl::SHADER_TYPE_DISNEY),
            ShaderModel::BlinnPhong => Some(prismsl::SHADER_TYPE_BLINN_PHONG),
            ShaderModel::Custom(_) => None,
        }
    }

    pub fn to_record(&self, shader_type: u32) -> prismsl::Material {
        prismsl::Material {
            shader_type,
            normal_mode: match self.normal_mode {
                NormalMode::Triangle => prismsl::NORMAL_MODE_TRIANGLE,
                NormalMode::Vertex => prismsl::NORMAL_MODE_VERTEX,
                NormalMode::Corner => prismsl::NORMAL_MODE_CORNER,
            },
            wireframe: self.wireframe as u32,
            _padding0: 0,
            base_color: self.base_color,
            alpha: self.alpha.clamp(0.0, 1.0),
            emission: self.emission,
            metalness: self.metalness.clamp(0.0, 1.0),
            roughness: self.roughness.clamp(0.0, 1.0),
            specular_tint: self.specular_tint.clamp(0.0, 1.0),
            _padding1: [0.0; 2],
        }
    }
}
