use std::path::Path;

use anyhow::Context;
use prism_crate_tools::init_log::init_log;
use prism_render_interface::config::RendererConfig;
use prism_renderer::renderer::Renderer;

use crate::box_denoiser::BoxDenoiser;
use crate::cornell::CornellScene;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

pub struct RenderApp {
    pub renderer: Renderer,
    pub cornell: CornellScene,
}
// new & init
impl RenderApp {
    pub fn new(config_path: &Path) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RenderApp::new");

        let config = RendererConfig::from_file(config_path)?;
        log::info!("load config: {}", config_path.display());
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: RendererConfig) -> Self {
        let mut renderer = Renderer::new(config);
        renderer.set_external_denoiser(Box::new(BoxDenoiser::default()));
        let cornell = CornellScene::create(renderer.scene_mut());
        log::info!(
            "cornell: {} walls, {} boxes, light {} on instance {}",
            cornell.walls.len(),
            cornell.boxes.len(),
            cornell.light,
            cornell.light_instance
        );
        Self { renderer, cornell }
    }

    pub fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }
}
// update
impl RenderApp {
    /// 渲染配置中指定的帧数，至少一帧
    pub fn run(&mut self) {
        let frame_count = self.renderer.config().frame_count.max(1);
        for _ in 0..frame_count {
            self.renderer.upload_render_data();
            self.renderer.render();
            tracy_client::frame_mark();
        }
        log::info!(
            "rendered {frame_count} frames, average {:.2}ms",
            self.renderer.timer().average_frame_ms()
        );
    }

    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderApp::save_png");

        let output = self.renderer.output_rgba8();
        let extent = output.extent();
        let bytes = output.texels().iter().flatten().copied().collect::<Vec<u8>>();
        let image = image::RgbaImage::from_raw(extent.x, extent.y, bytes)
            .with_context(|| format!("output image size mismatch: {}x{}", extent.x, extent.y))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        image.save(path).with_context(|| format!("Failed to save image: {}", path.display()))?;
        Ok(())
    }
}
