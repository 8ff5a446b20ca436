use glam::UVec2;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::resources::image::GfxImage2D;
use prism_render_interface::config::RendererConfig;
use prism_render_interface::frame_counter::FrameCounter;
use prism_render_interface::gfx_resource_manager::GfxResourceManager;
use prism_render_interface::pipeline_settings::{PipelineSettings, ShadingMode, VisibilityMode};
use prism_scene::gpu_scene::GpuScene;

use crate::platform::timer::Timer;
use crate::render_pipeline::deferred_pass::DeferredPass;
use crate::render_pipeline::denoise_pass::{ExternalDenoisePass, ExternalDenoiser, TemporalDenoisePass};
use crate::render_pipeline::path_tracing_pass::PathTracingPass;
use crate::render_pipeline::raster_pass::RasterPass;
use crate::render_pipeline::sdr_pass::SdrPass;
use crate::render_pipeline::shading::PassContext;
use crate::resources::frame_buffers::FrameBuffers;

/// 渲染器核心
///
/// 持有 GPU Scene、帧缓冲与所有 pass，按帧串联上传、着色、降噪与 tone mapping。
///
/// # 渲染流程
/// ```ignore
/// renderer.scene_mut().add_static_mesh(...); // 修改场景
/// renderer.upload_render_data();             // 上传 dirty 数据，重建 TLAS
/// renderer.render();                         // 主 pass -> 降噪 -> SDR，推进帧计数
/// let image = renderer.output_rgba8();
/// ```
pub struct Renderer {
    config: RendererConfig,

    frame_counter: FrameCounter,
    timer: Timer,

    gpu_scene: GpuScene,
    gfx_resource_manager: GfxResourceManager,
    frame_buffers: FrameBuffers,

    /// 每个 frame label 一个
    upload_cmds: Vec<GfxCommandBuffer>,
    render_cmds: Vec<GfxCommandBuffer>,

    raster_pass: RasterPass,
    external_denoise_pass: ExternalDenoisePass,
    external_denoiser: Option<Box<dyn ExternalDenoiser>>,
}
// new & init
impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        let _span = tracy_client::span!("Renderer::new");

        let extent = config.frame.extent();
        log::info!("create renderer: {}x{}, {:?}", extent.x, extent.y, config.pipeline.shading_mode);

        // 初始值是 1，0 留给 "还没有任何帧提交"
        let frame_counter = FrameCounter::default();

        let upload_cmds = FrameCounter::frame_labels()
            .into_iter()
            .map(|frame_label| GfxCommandBuffer::new(format!("gpu-scene-update-{frame_label}")))
            .collect();
        let render_cmds = FrameCounter::frame_labels()
            .into_iter()
            .map(|frame_label| GfxCommandBuffer::new(format!("render-{frame_label}")))
            .collect();

        Self {
            frame_counter,
            timer: Timer::default(),
            gpu_scene: GpuScene::new(extent),
            gfx_resource_manager: GfxResourceManager::new(),
            frame_buffers: FrameBuffers::new(extent),
            upload_cmds,
            render_cmds,
            raster_pass: RasterPass::new(),
            external_denoise_pass: ExternalDenoisePass::default(),
            external_denoiser: None,
            config,
        }
    }

    /// 由宿主提供外部降噪器，只有 `denoise.external_enabled` 打开时才会被调用
    pub fn set_external_denoiser(&mut self, denoiser: Box<dyn ExternalDenoiser>) {
        log::info!("use external denoiser: {}", denoiser.name());
        self.external_denoiser = Some(denoiser);
    }
}
// getter
impl Renderer {
    #[inline]
    pub fn scene(&self) -> &GpuScene {
        &self.gpu_scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut GpuScene {
        &mut self.gpu_scene
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn pipeline_settings_mut(&mut self) -> &mut PipelineSettings {
        &mut self.config.pipeline
    }

    #[inline]
    pub fn frame_buffers(&self) -> &FrameBuffers {
        &self.frame_buffers
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    #[inline]
    pub fn resource_manager(&self) -> &GfxResourceManager {
        &self.gfx_resource_manager
    }

    /// 最近一帧 tone mapping 之后的结果
    #[inline]
    pub fn output_rgba8(&self) -> &GfxImage2D<[u8; 4]> {
        &self.frame_buffers.output
    }
}
// phase call
impl Renderer {
    /// # Phase: Before Render
    ///
    /// 上传场景中所有 dirty 的数据；没有任何修改时不会产生 buffer 写入。
    pub fn upload_render_data(&mut self) {
        let _span = tracy_client::span!("Renderer::upload_render_data");

        let frame_id = self.frame_counter.frame_id();
        let cmd = &mut self.upload_cmds[*self.frame_counter.frame_label()];
        cmd.begin();
        self.gpu_scene.upload_render_data(cmd, &mut self.gfx_resource_manager, frame_id);
        cmd.end();
    }

    /// # Phase: Render
    ///
    /// 渲染一帧并推进帧计数。
    ///
    /// 场景中还有未上传的修改时会先上传；没有相机时无法生成主光线，直接终止。
    pub fn render(&mut self) {
        let _span = tracy_client::span!("Renderer::render");

        if !self.gpu_scene.has_camera() {
            log::error!("no camera in scene, can not render {}", self.frame_counter.frame_name());
            panic!("no camera in scene");
        }

        self.timer.tick();
        if self.gpu_scene.is_dirty() {
            self.upload_render_data();
        }

        let frame_id = self.frame_counter.frame_id();
        let settings = self.config.pipeline;
        let cmd = &mut self.render_cmds[*self.frame_counter.frame_label()];
        cmd.begin();

        // 主 pass
        {
            self.frame_buffers.gbuffer.clear();
            if settings.visibility_mode == VisibilityMode::Rasterized {
                self.raster_pass.exec(cmd, &self.gpu_scene, &mut self.frame_buffers.visibility);
            }

            let ctx = PassContext::new(&self.gpu_scene, &settings, &self.frame_buffers.visibility, frame_id);
            let texels = match settings.shading_mode {
                ShadingMode::PathTracing => PathTracingPass.exec(cmd, &ctx),
                ShadingMode::Deferred => DeferredPass.exec(cmd, &ctx),
            };
            self.frame_buffers.gbuffer.write(&texels);
            cmd.pipeline_barrier("gbuffer");
        }

        // 降噪
        {
            TemporalDenoisePass.exec(
                cmd,
                &settings.denoise,
                &self.frame_buffers.gbuffer,
                &self.frame_buffers.previous_history,
                &mut self.frame_buffers.current_history,
            );
            self.frame_buffers.color.copy_from(&self.frame_buffers.current_history.radiance);
            cmd.pipeline_barrier("temporal-denoise");

            if settings.denoise.external_enabled {
                match self.external_denoiser.as_deref_mut() {
                    Some(denoiser) => {
                        self.external_denoise_pass.exec(
                            cmd,
                            denoiser,
                            &self.frame_buffers.gbuffer,
                            &mut self.frame_buffers.color,
                        );
                    }
                    None => log::warn!("external denoise is enabled but no denoiser is set"),
                }
            }
        }

        SdrPass.exec(cmd, &self.frame_buffers.color, &mut self.frame_buffers.output);
        cmd.end();

        self.end_frame();
    }

    /// # Phase: After Render
    fn end_frame(&mut self) {
        let _span = tracy_client::span!("Renderer::end_frame");

        self.gpu_scene.advance_frame();
        self.frame_buffers.swap_history();

        log::debug!("{} done in {:.2}ms", self.frame_counter.frame_name(), self.timer.delta_time_ms());
        self.frame_counter.next_frame();
        self.gfx_resource_manager.cleanup(self.frame_counter.frame_id());
    }

    /// 重建所有分辨率相关的图像，旧图像在 fif 帧之后销毁；时域历史随之清空
    pub fn resize(&mut self, new_extent: UVec2) {
        if new_extent == self.frame_buffers.extent() {
            return;
        }
        if new_extent.x == 0 || new_extent.y == 0 {
            log::error!("invalid frame extent: {}x{}", new_extent.x, new_extent.y);
            return;
        }
        log::info!(
            "resize frame buffers: {}x{} -> {}x{}",
            self.frame_buffers.extent().x,
            self.frame_buffers.extent().y,
            new_extent.x,
            new_extent.y
        );

        let old = std::mem::replace(&mut self.frame_buffers, FrameBuffers::new(new_extent));
        old.retire(&mut self.gfx_resource_manager, self.frame_counter.frame_id());

        self.config.frame.width = new_extent.x;
        self.config.frame.height = new_extent.y;
        self.gpu_scene.set_resolution(new_extent);
    }
}
impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Dropping Renderer");
    }
}
