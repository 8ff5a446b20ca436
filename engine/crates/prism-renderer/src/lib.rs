//! 帧驱动与 render pass
//!
//! - `resources`：G-buffer、visibility buffer、时域历史与输出图像
//! - `render_pipeline`：光栅化、path tracing、deferred shading、降噪、tone mapping
//! - `renderer`：按帧串联 GPU Scene 的上传与各个 pass

pub mod platform;
pub mod render_pipeline;
pub mod renderer;
pub mod resources;
