use glam::{Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

/// 所有 id 的无效值
pub const INVALID_ID: u32 = u32::MAX;
/// bindless buffer 的无效索引
pub const INVALID_BUFFER_ID: i32 = -1;

pub const LIGHT_TYPE_POINT: u32 = 0;
pub const LIGHT_TYPE_RECT: u32 = 1;
pub const LIGHT_TYPE_CONSTANT: u32 = 2;

pub const SHADER_TYPE_DISNEY: u32 = 0;
pub const SHADER_TYPE_BLINN_PHONG: u32 = 1;

/// 使用三角形的几何法线
pub const NORMAL_MODE_TRIANGLE: u32 = 0;
/// 使用顶点法线插值
pub const NORMAL_MODE_VERTEX: u32 = 1;
/// 使用每个三角形角点上的法线插值
pub const NORMAL_MODE_CORNER: u32 = 2;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BufferHandle {
    pub index: i32,
}
impl BufferHandle {
    #[inline]
    pub fn is_null(&self) -> bool {
        self.index == INVALID_BUFFER_ID
    }
}

/// uv 被拆开放在 position 与 normal 之后，避免 Vec2 引入的对齐空洞
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
}
impl Vertex {
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            uv_x: uv.x,
            normal,
            uv_y: uv.y,
        }
    }

    #[inline]
    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.uv_x, self.uv_y)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Mesh {
    pub vertex_buffer: BufferHandle,
    /// 每个元素是一个三角形的三个顶点索引
    pub index_buffer: BufferHandle,
    /// 每个三角形 3 个法线，按三角形顺序排列
    pub corner_normal_buffer: BufferHandle,
    pub material_id: u32,
    pub triangle_count: u32,
    pub _padding: [u32; 3],
}
impl Mesh {
    pub fn null() -> Self {
        let null = BufferHandle {
            index: INVALID_BUFFER_ID,
        };
        Self {
            vertex_buffer: null,
            index_buffer: null,
            corner_normal_buffer: null,
            material_id: INVALID_ID,
            triangle_count: 0,
            _padding: [0; 3],
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.vertex_buffer.is_null()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Transform {
    pub matrix: Mat4,
    /// 上一帧的矩阵，用于计算 motion vector
    pub prev_matrix: Mat4,
    /// 四元数 (x, y, z, w)
    pub rotation: Vec4,
    pub scale: Vec3,
    pub _padding: f32,
}
impl Transform {
    /// 编码：将矩阵分解为 scale / rotation 一起存储
    pub fn from_matrix(matrix: Mat4, prev_matrix: Mat4) -> Self {
        let (scale, rotation, _) = matrix.to_scale_rotation_translation();
        Self {
            matrix,
            prev_matrix,
            rotation: Vec4::from(rotation),
            scale,
            _padding: 0.0,
        }
    }

    /// 解码：由 translation / rotation / scale 重新组装矩阵
    pub fn decode(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale,
            Quat::from_vec4(self.rotation).normalize(),
            self.matrix.w_axis.truncate(),
        )
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.matrix != self.prev_matrix
    }
}

/// 一个 instance 上绑定的内容
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Shape {
    pub mesh_id: u32,
    pub light_id: u32,
    pub transform_id: u32,
    pub visible: u32,
}
impl Shape {
    pub const fn unconfigured() -> Self {
        Self {
            mesh_id: INVALID_ID,
            light_id: INVALID_ID,
            transform_id: INVALID_ID,
            visible: 0,
        }
    }

    #[inline]
    pub fn is_mesh(&self) -> bool {
        self.mesh_id != INVALID_ID
    }

    #[inline]
    pub fn is_light(&self) -> bool {
        self.light_id != INVALID_ID
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub light_type: u32,
    /// 作为几何体被渲染时绑定的 instance
    pub instance_id: u32,
    pub transform_id: u32,
    pub _padding0: u32,
    pub color: Vec3,
    pub intensity: f32,
    /// 矩形光源在局部 XZ 平面上的尺寸
    pub rect_size: Vec2,
    pub radius: f32,
    pub _padding1: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Material {
    pub shader_type: u32,
    pub normal_mode: u32,
    pub wireframe: u32,
    pub _padding0: u32,
    pub base_color: Vec3,
    pub alpha: f32,
    pub emission: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub specular_tint: f32,
    pub _padding1: [f32; 2],
}
impl Default for Material {
    /// 找不到材质时使用的灰色漫反射材质
    fn default() -> Self {
        Self {
            shader_type: SHADER_TYPE_DISNEY,
            normal_mode: NORMAL_MODE_TRIANGLE,
            wireframe: 0,
            _padding0: 0,
            base_color: Vec3::splat(0.5),
            alpha: 1.0,
            emission: Vec3::ZERO,
            metalness: 0.0,
            roughness: 1.0,
            specular_tint: 0.0,
            _padding1: [0.0; 2],
        }
    }
}

/// 相机数据
///
/// `cam_right` / `cam_up` 已经乘上了 fov 与宽高比，
/// 像素 ndc 坐标为 (x, y) 时，光线方向为 `normalize(cam_forward + x * cam_right + y * cam_up)`
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct View {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub prev_view_proj: Mat4,
    pub position: Vec3,
    pub fov_y: f32,
    pub cam_right: Vec3,
    pub aspect: f32,
    pub cam_up: Vec3,
    pub near: f32,
    pub cam_forward: Vec3,
    pub far: f32,
    pub resolution: UVec2,
    pub _padding: [u32; 2],
}
