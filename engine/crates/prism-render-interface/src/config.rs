use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::pipeline_settings::{FrameSettings, PipelineSettings};

/// 渲染器配置文件
///
/// ```toml
/// [frame]
/// width = 640
/// height = 480
///
/// [pipeline]
/// shading_mode = "deferred"
/// visibility_mode = "rasterized"
///
/// [pipeline.denoise]
/// max_history_len = 16.0
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub frame: FrameSettings,
    pub pipeline: PipelineSettings,
    /// 连续渲染的帧数
    pub frame_count: u32,
}
impl RendererConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read renderer config: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to parse renderer config: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.frame.width == 0 || config.frame.height == 0 {
            anyhow::bail!("frame extent must not be zero: {}x{}", config.frame.width, config.frame.height);
        }
        Ok(config)
    }
}
