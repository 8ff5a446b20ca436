//! Prism 工具集
//!
//! 提供日志初始化、资源路径管理等通用工具。
//!
//! # PrismPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。

pub mod init_log;
pub mod resource;
