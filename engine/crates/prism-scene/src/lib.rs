//! CPU 权威、GPU 常驻的场景
//!
//! - `components`：外部 actor 层提交的组件数据
//! - `proxies`：每类场景数据的 CPU 镜像 + device buffer，带 dirty 跟踪
//! - `gpu_scene`：持有加速结构、bindless 表与所有 proxy，并提供求交查询
//! - `shading`：按 type tag 分派的光源 / 材质求值

pub mod components;
pub mod gpu_scene;
pub mod intersection;
pub mod proxies;
pub mod shading;
pub mod shapes;
