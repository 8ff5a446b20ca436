/// 可以被延迟销毁的 GPU 资源
///
/// 资源管理器只需要知道名字和大小，销毁即 drop。
pub trait GfxResource {
    fn name(&self) -> &str;

    fn size_bytes(&self) -> usize;
}
