use glam::{IVec2, UVec2, Vec2, Vec3};
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::resources::image::GfxImage2D;
use prism_render_interface::pipeline_settings::DenoiseSettings;
use prism_shader_binding::prismsl;

use crate::resources::frame_buffers::{GBuffer, HistoryBuffers};

/// 一个像素的历史
#[derive(Copy, Clone, Debug)]
struct HistoryTexel {
    radiance: Vec3,
    normal: Vec3,
    depth: f32,
    length: f32,
}

/// 时域降噪
///
/// 通过 motion vector 回到上一帧，双线性读取历史；
/// 法线或深度差异过大的 tap 被丢弃，全部丢弃时历史长度清零。
/// 新样本的权重为 `1 / (1 + len)`，`len` 有上限，所以历史按指数衰减。
pub struct TemporalDenoisePass;
impl TemporalDenoisePass {
    pub fn exec(
        &self,
        cmd: &mut GfxCommandBuffer,
        settings: &DenoiseSettings,
        gbuffer: &GBuffer,
        previous: &HistoryBuffers,
        current: &mut HistoryBuffers,
    ) {
        let _span = tracy_client::span!("TemporalDenoisePass::exec");

        let texels =
            cmd.dispatch_2d("temporal-denoise", gbuffer.extent(), |pixel| Self::filter(settings, gbuffer, previous, pixel));
        for (idx, texel) in texels.into_iter().enumerate() {
            current.radiance.texels_mut()[idx] = texel.radiance;
            current.normal.texels_mut()[idx] = texel.normal;
            current.depth.texels_mut()[idx] = texel.depth;
            current.length.texels_mut()[idx] = texel.length;
        }
    }

    fn filter(settings: &DenoiseSettings, gbuffer: &GBuffer, previous: &HistoryBuffers, pixel: UVec2) -> HistoryTexel {
        let radiance = gbuffer.radiance.load(pixel);
        let normal = gbuffer.normal.load(pixel);
        let depth = gbuffer.depth.load(pixel);
        let reset = HistoryTexel {
            radiance,
            normal,
            depth,
            length: 0.0,
        };
        if !settings.temporal_enabled || gbuffer.instance_id.load(pixel) == prismsl::INVALID_ID {
            return reset;
        }

        // 上一帧中的连续像素坐标，texel 中心在 +0.5
        let extent = gbuffer.extent().as_vec2();
        let prev_uv = (pixel.as_vec2() + 0.5) / extent - gbuffer.motion.load(pixel);
        let prev_pos = prev_uv * extent - 0.5;
        let base = prev_pos.floor();
        let frac = prev_pos - base;
        let base = base.as_ivec2();

        let mut weight_sum = 0.0;
        let mut history = Vec3::ZERO;
        let mut length = 0.0;
        for offset in [IVec2::new(0, 0), IVec2::new(1, 0), IVec2::new(0, 1), IVec2::new(1, 1)] {
            let w = helper::bilinear_weight(frac, offset);
            if w <= 0.0 {
                continue;
            }
            let tap = base + offset;
            let (Some(prev_depth), Some(prev_normal)) =
                (previous.depth.try_load(tap.x, tap.y), previous.normal.try_load(tap.x, tap.y))
            else {
                continue;
            };
            if !helper::is_consistent(settings, normal, depth, prev_normal, prev_depth) {
                continue;
            }
            let Some(prev_radiance) = previous.radiance.try_load(tap.x, tap.y) else {
                continue;
            };
            weight_sum += w;
            history += prev_radiance * w;
            length += previous.length.try_load(tap.x, tap.y).unwrap_or(0.0) * w;
        }
        if weight_sum < 1e-4 {
            return reset;
        }

        let history = history / weight_sum;
        let length = (length / weight_sum + 1.0).min(settings.max_history_len.max(1.0));
        let alpha = 1.0 / (1.0 + length);
        HistoryTexel {
            radiance: history.lerp(radiance, alpha),
            normal,
            depth,
            length,
        }
    }
}

/// 交给外部降噪器的专用 buffer
pub struct ExternalDenoiseImages {
    pub albedo: GfxImage2D<Vec3>,
    pub normal: GfxImage2D<Vec3>,
    /// 带噪声的输入
    pub color: GfxImage2D<Vec3>,
    /// 降噪器的输出，调用前初始化为输入
    pub output: GfxImage2D<Vec3>,
}
impl ExternalDenoiseImages {
    pub fn new(extent: UVec2) -> Self {
        Self {
            albedo: GfxImage2D::new(extent, Vec3::ZERO, "external-denoise-albedo"),
            normal: GfxImage2D::new(extent, Vec3::ZERO, "external-denoise-normal"),
            color: GfxImage2D::new(extent, Vec3::ZERO, "external-denoise-color"),
            output: GfxImage2D::new(extent, Vec3::ZERO, "external-denoise-output"),
        }
    }

    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.color.extent()
    }
}

/// 由宿主提供的外部降噪器
pub trait ExternalDenoiser {
    fn name(&self) -> &str;

    /// 读取 `albedo` / `normal` / `color`，结果写入 `output`
    fn denoise(&mut self, images: &mut ExternalDenoiseImages) -> anyhow::Result<()>;
}

/// 调用外部降噪器，失败时保留未滤波的结果
#[derive(Default)]
pub struct ExternalDenoisePass {
    images: Option<ExternalDenoiseImages>,
}
impl ExternalDenoisePass {
    /// 返回是否使用了外部降噪的结果
    pub fn exec(
        &mut self,
        cmd: &mut GfxCommandBuffer,
        denoiser: &mut dyn ExternalDenoiser,
        gbuffer: &GBuffer,
        color: &mut GfxImage2D<Vec3>,
    ) -> bool {
        let _span = tracy_client::span!("ExternalDenoisePass::exec");

        let extent = color.extent();
        if self.images.as_ref().is_some_and(|images| images.extent() != extent) {
            self.images = None;
        }
        let images = self.images.get_or_insert_with(|| ExternalDenoiseImages::new(extent));
        images.albedo.copy_from(&gbuffer.base_color);
        images.normal.copy_from(&gbuffer.normal);
        images.color.copy_from(color);
        images.output.copy_from(color);
        cmd.pipeline_barrier("external-denoise-input");

        match denoiser.denoise(images) {
            Ok(()) => {
                color.copy_from(&images.output);
                true
            }
            Err(e) => {
                log::error!("external denoiser {} failed, keep the unfiltered frame: {e:#}", denoiser.name());
                false
            }
        }
    }
}

mod helper {
    use super::*;

    #[inline]
    pub fn bilinear_weight(frac: Vec2, offset: IVec2) -> f32 {
        let wx = if offset.x == 0 { 1.0 - frac.x } else { frac.x };
        let wy = if offset.y == 0 { 1.0 - frac.y } else { frac.y };
        wx * wy
    }

    /// 法线与深度都足够接近时才认为是同一个表面
    pub fn is_consistent(
        settings: &DenoiseSettings,
        normal: Vec3,
        depth: f32,
        prev_normal: Vec3,
        prev_depth: f32,
    ) -> bool {
        if !prev_depth.is_finite() || !depth.is_finite() {
            return false;
        }
        normal.dot(prev_normal) >= settings.normal_tolerance
            && (depth - prev_depth).abs() <= settings.depth_tolerance * depth.max(1e-3)
    }
}
