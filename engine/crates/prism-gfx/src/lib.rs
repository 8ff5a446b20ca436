//! Prism 的 GPU 后端
//!
//! 以 CPU 上的数据并行（rayon）模拟 compute device：
//! - `resources`：typed device buffer 与 2D storage image
//! - `commands`：按提交顺序立即执行的命令流
//! - `raytracing`：BLAS / TLAS 两级加速结构

pub mod commands;
pub mod raytracing;
pub mod resources;
