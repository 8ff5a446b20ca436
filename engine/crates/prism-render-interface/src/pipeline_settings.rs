use std::{fmt::Display, ops::Deref};

use serde::Deserialize;

/// 帧级渲染配置
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub width: u32,
    pub height: u32,
}
impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: 400,
            height: 300,
        }
    }
}
impl FrameSettings {
    #[inline]
    pub fn extent(&self) -> glam::UVec2 {
        glam::UVec2::new(self.width, self.height)
    }
}

/// 主 pass 的类型
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingMode {
    #[default]
    PathTracing,
    Deferred,
}

/// 第一次可见性的来源
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    #[default]
    RayTraced,
    /// 由 visibility buffer 光栅化得到
    Rasterized,
}

/// 降噪设置
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DenoiseSettings {
    /// 是否启用时域滤波
    pub temporal_enabled: bool,
    /// 法线夹角余弦的下限，低于该值认为历史无效
    pub normal_tolerance: f32,
    /// 相对深度差的上限
    pub depth_tolerance: f32,
    /// 历史长度上限，决定最小的混合权重
    pub max_history_len: f32,
    /// 是否调用外部降噪器
    pub external_enabled: bool,
}
impl Default for DenoiseSettings {
    fn default() -> Self {
        Self {
            temporal_enabled: true,
            normal_tolerance: 0.9,
            depth_tolerance: 0.1,
            max_history_len: 32.0,
            external_enabled: false,
        }
    }
}

/// 管线级配置
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub shading_mode: ShadingMode,
    pub visibility_mode: VisibilityMode,
    pub samples_per_pixel: u32,
    /// path tracing 的最大弹射次数
    pub max_path_depth: u32,
    /// deferred shading 是否追踪一次间接光
    pub enable_gi: bool,
    /// 全局的线框叠加
    pub wireframe_overlay: bool,
    /// 半透明循环的终止阈值
    pub transmittance_epsilon: f32,
    pub denoise: DenoiseSettings,
}
impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            shading_mode: ShadingMode::default(),
            visibility_mode: VisibilityMode::default(),
            samples_per_pixel: 1,
            max_path_depth: 4,
            enable_gi: true,
            wireframe_overlay: false,
            transmittance_epsilon: 0.01,
            denoise: DenoiseSettings::default(),
        }
    }
}

/// 帧标签（A/B/C）
///
/// 表示当前处于 Frames in Flight 的哪一帧。
/// 通过 `Deref` 转换为索引 0/1/2。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    A,
    B,
    C,
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &Self::INDEX[*self as usize]
    }
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(name)
    }
}
impl FrameLabel {
    const INDEX: [usize; 3] = [0, 1, 2];

    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        match idx {
            0 => Self::A,
            1 => Self::B,
            2 => Self::C,
            _ => panic!("Invalid frame index: {idx}"),
        }
    }
}
