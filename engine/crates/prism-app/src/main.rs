//! 无窗口的渲染程序
//!
//! 读取 `config/cornell.toml`（或命令行给出的配置文件），渲染 Cornell Box 若干帧，
//! 把最后一帧写到 `target/output/cornell.png`（或命令行给出的路径）。
//!
//! ```text
//! cargo run --bin prism-cornell -- [config.toml] [output.png]
//! ```

mod box_denoiser;
mod cornell;
mod render_app;

use std::path::PathBuf;

use prism_crate_tools::resource::PrismPath;

use crate::render_app::RenderApp;

fn main() -> anyhow::Result<()> {
    RenderApp::init_env();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| PrismPath::config_path("cornell.toml"));
    let output_path = args.next().map(PathBuf::from).unwrap_or_else(|| PrismPath::output_path("cornell.png"));

    let mut app = RenderApp::new(&config_path)?;
    app.run();
    app.save_png(&output_path)?;

    log::info!("saved {}", output_path.display());
    Ok(())
}
