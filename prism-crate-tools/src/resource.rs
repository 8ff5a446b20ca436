use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = PrismPath::config_path("cornell.toml"); // config/cornell.toml
/// let image = PrismPath::output_path("cornell.png");   // target/output/cornell.png
/// ```
pub struct PrismPath {}
// 核心路径
impl PrismPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// 根目录下
impl PrismPath {
    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }

    /// 获取 `target/output/` 目录下的文件路径，渲染结果默认写到这里
    pub fn output_path(filename: &str) -> PathBuf {
        Self::target_path().join("output").join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_under_workspace() {
        let root = PrismPath::workspace_path();
        assert!(PrismPath::config_path("a.toml").starts_with(&root));
        assert!(PrismPath::output_path("a.png").starts_with(root.join("target")));
        assert!(root.join("Cargo.toml").exists());
    }
}
