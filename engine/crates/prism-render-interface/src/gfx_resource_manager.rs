use prism_gfx::resources::resource::GfxResource;

use crate::frame_counter::FrameCounter;

/// 资源管理器
///
/// 负责 GPU 资源的延迟销毁（Frames in Flight）：
/// 某一帧中被替换或删除的 buffer / BLAS 先进入待销毁队列，
/// 等到提交它的帧确定执行完毕后才真正释放，保证当前帧的 pass 不会读到已释放的数据。
pub struct GfxResourceManager {
    // 待销毁队列
    // (resource, frame_id)
    pending_destroy: Vec<(Box<dyn GfxResource>, u64)>,

    destroyed_count: u64,
    destroyed_bytes: u64,
}
impl Default for GfxResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl GfxResourceManager {
    pub fn new() -> Self {
        Self {
            pending_destroy: Vec::new(),
            destroyed_count: 0,
            destroyed_bytes: 0,
        }
    }
}
// destroy
impl GfxResourceManager {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 立即销毁所有待销毁的资源，调用者需要保证 GPU 已经空闲
    pub fn destroy_mut(&mut self) {
        let _span = tracy_client::span!("GfxResourceManager::destroy_all");
        for (resource, _) in std::mem::take(&mut self.pending_destroy) {
            self.release(resource);
        }
    }
}
impl Drop for GfxResourceManager {
    fn drop(&mut self) {
        log::info!("Dropping GfxResourceManager");
        self.destroy_mut();
    }
}
// getter
impl GfxResourceManager {
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending_destroy.len()
    }

    #[inline]
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed_count
    }

    #[inline]
    pub fn destroyed_bytes(&self) -> u64 {
        self.destroyed_bytes
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending_destroy.iter().any(|(res, _)| res.name() == name)
    }
}
// Subsystem API
impl GfxResourceManager {
    /// 将资源加入待销毁队列，在 `current_frame_id` 对应的帧完成后销毁
    pub fn destroy_resource(&mut self, resource: Box<dyn GfxResource>, current_frame_id: u64) {
        log::debug!("retire {} at frame {current_frame_id}", resource.name());
        self.pending_destroy.push((resource, current_frame_id));
    }

    /// 清理已过期的资源
    pub fn cleanup(&mut self, current_frame_id: u64) {
        let _span = tracy_client::span!("GfxResourceManager::cleanup");

        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_destroy)
            .into_iter()
            .partition(|(_, frame_id)| FrameCounter::is_frame_complete(*frame_id, current_frame_id));
        self.pending_destroy = pending;
        for (resource, _) in expired {
            self.release(resource);
        }
    }

    fn release(&mut self, resource: Box<dyn GfxResource>) {
        log::debug!("destroy {} ({} bytes)", resource.name(), resource.size_bytes());
        self.destroyed_count += 1;
        self.destroyed_bytes += resource.size_bytes() as u64;
    }
}
