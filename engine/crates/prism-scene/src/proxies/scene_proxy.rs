use indexmap::IndexSet;
use itertools::Itertools;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::raytracing::acceleration::GfxAccelerationStructure;
use prism_gfx::resources::resource::GfxResource;
use prism_gfx::resources::structured_buffer::GfxStructuredBuffer;
use prism_render_interface::bindless_manager::BindlessManager;
use prism_render_interface::gfx_resource_manager::GfxResourceManager;

/// 上传阶段借给各个 proxy 的 GPU 状态
///
/// 加速结构与 bindless 表归 `GpuScene` 所有，proxy 只能在上传时通过这里修改它们。
pub struct UploadContext<'a> {
    pub cmd: &'a mut GfxCommandBuffer,
    pub acceleration: &'a mut GfxAccelerationStructure,
    pub bindless: &'a mut BindlessManager,
    pub resource_manager: &'a mut GfxResourceManager,
    pub frame_id: u64,
}
impl UploadContext<'_> {
    /// 资源会在 frames in flight 之后才被真正释放
    #[inline]
    pub fn retire(&mut self, resource: impl GfxResource + 'static) {
        self.resource_manager.destroy_resource(Box::new(resource), self.frame_id);
    }
}

/// 所有 proxy 共享的 dirty 跟踪约定
///
/// - 增删改只修改 CPU 镜像并标记 dirty，不直接写 device buffer
/// - `upload_dirty_data` 把 dirty 的记录写入 device buffer，然后清空 dirty 集合
/// - dirty 集合为空时 `upload_dirty_data` 不产生任何 GPU 写入
pub trait SceneProxy {
    fn name(&self) -> &str;

    fn is_dirty(&self) -> bool;

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext);
}

/// CPU 镜像 + dirty 集合 + device buffer
pub struct ProxyBuffer<T: bytemuck::Pod> {
    records: Vec<T>,
    dirty: IndexSet<u32>,
    device_buffer: GfxStructuredBuffer<T>,
    /// 为 true 时每次上传整个 buffer，否则只上传连续的 dirty 区间
    bulk: bool,

    name: String,
}
// new & init
impl<T: bytemuck::Pod> ProxyBuffer<T> {
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().to_string();
        Self {
            records: Vec::new(),
            dirty: IndexSet::new(),
            device_buffer: GfxStructuredBuffer::new_ssbo(0, format!("{name}-0")),
            bulk: false,
            name,
        }
    }

    pub fn new_bulk(name: impl AsRef<str>) -> Self {
        Self {
            bulk: true,
            ..Self::new(name)
        }
    }
}
// getter
impl<T: bytemuck::Pod> ProxyBuffer<T> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        (id as usize) < self.records.len()
    }

    /// CPU 镜像
    #[inline]
    pub fn get(&self, id: u32) -> Option<&T> {
        self.records.get(id as usize)
    }

    #[inline]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    #[inline]
    pub fn dirty_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.dirty.iter().copied()
    }

    /// kernel 读取的 device 侧数据，只包含已经上传的记录
    #[inline]
    pub fn device_buffer(&self) -> &GfxStructuredBuffer<T> {
        &self.device_buffer
    }

    #[inline]
    pub fn device_record(&self, id: u32) -> Option<&T> {
        if !self.contains(id) {
            return None;
        }
        self.device_buffer.get(id as usize)
    }
}
// update
impl<T: bytemuck::Pod> ProxyBuffer<T> {
    pub fn push(&mut self, record: T) -> u32 {
        let id = self.records.len() as u32;
        self.records.push(record);
        self.dirty.insert(id);
        id
    }

    /// 不存在的 id 会记录错误并返回 false
    pub fn update(&mut self, id: u32, f: impl FnOnce(&mut T)) -> bool {
        match self.records.get_mut(id as usize) {
            Some(record) => {
                f(record);
                self.dirty.insert(id);
                true
            }
            None => {
                log::error!("{}: id {id} does not exist ({} records)", self.name, self.records.len());
                false
            }
        }
    }

    #[inline]
    pub fn set(&mut self, id: u32, record: T) -> bool {
        self.update(id, |r| *r = record)
    }

    pub fn mark_dirty(&mut self, id: u32) {
        if self.contains(id) {
            self.dirty.insert(id);
        }
    }
}
// upload
impl<T: bytemuck::Pod> ProxyBuffer<T> {
    /// # Phase: Upload
    ///
    /// 把 dirty 的记录写入 device buffer；容量不足时先扩容，旧 buffer 交给资源管理器延迟销毁。
    pub fn upload(&mut self, ctx: &mut UploadContext) {
        if self.dirty.is_empty() {
            return;
        }
        let _span = tracy_client::span!("ProxyBuffer::upload");

        if self.device_buffer.len() < self.records.len() {
            self.grow(ctx);
        }

        if self.bulk {
            ctx.cmd.cmd_update_buffer(&mut self.device_buffer, 0, &self.records);
        } else {
            let ids = self.dirty.iter().copied().sorted_unstable().collect_vec();
            for (begin, end) in helper::contiguous_runs(&ids) {
                ctx.cmd.cmd_update_buffer(
                    &mut self.device_buffer,
                    begin as usize,
                    &self.records[begin as usize..end as usize],
                );
            }
        }

        self.dirty.clear();
    }

    fn grow(&mut self, ctx: &mut UploadContext) {
        let capacity = self.records.len().next_power_of_two().max(4);
        log::debug!("{}: grow device buffer {} -> {capacity}", self.name, self.device_buffer.len());

        let mut new_buffer = GfxStructuredBuffer::new_ssbo(capacity, format!("{}-{capacity}", self.name));
        let old_buffer = std::mem::replace(&mut self.device_buffer, GfxStructuredBuffer::new_ssbo(0, ""));
        if !old_buffer.is_empty() {
            ctx.cmd.cmd_copy_buffer(&old_buffer, &mut new_buffer, old_buffer.len());
            ctx.retire(old_buffer);
        }
        self.device_buffer = new_buffer;
    }
}

mod helper {
    /// 已排序的 id 拆成若干个连续区间 `[begin, end)`
    pub fn contiguous_runs(sorted_ids: &[u32]) -> Vec<(u32, u32)> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &id in sorted_ids {
            match runs.last_mut() {
                Some((_, end)) if *end == id => *end += 1,
                _ => runs.push((id, id + 1)),
            }
        }
        runs
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// 测试用的上传环境
    pub struct UploadEnv {
        pub cmd: GfxCommandBuffer,
        pub acceleration: GfxAccelerationStructure,
        pub bindless: BindlessManager,
        pub resource_manager: GfxResourceManager,
        pub frame_id: u64,
    }
    impl UploadEnv {
        pub fn new() -> Self {
            Self {
                cmd: GfxCommandBuffer::new("test cmd"),
                acceleration: GfxAccelerationStructure::new("test acc"),
                bindless: BindlessManager::new(),
                resource_manager: GfxResourceManager::new(),
                frame_id: 1,
            }
        }

        /// 录制一次上传，返回该次上传的 buffer 写入次数
        pub fn upload(&mut self, f: impl FnOnce(&mut UploadContext)) -> u64 {
            let before = self.cmd.write_count();
            self.cmd.begin();
            let mut ctx = UploadContext {
                cmd: &mut self.cmd,
                acceleration: &mut self.acceleration,
                bindless: &mut self.bindless,
                resource_manager: &mut self.resource_manager,
                frame_id: self.frame_id,
            };
            f(&mut ctx);
            self.cmd.end();
            self.cmd.write_count() - before
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::UploadEnv;
    use super::*;

    #[test]
    fn test_contiguous_runs() {
        assert_eq!(helper::contiguous_runs(&[0, 1, 2, 5, 7, 8]), vec![(0, 3), (5, 6), (7, 9)]);
        assert!(helper::contiguous_runs(&[]).is_empty());
    }

    #[test]
    fn test_upload_is_idempotent() {
        let mut env = UploadEnv::new();
        let mut buffer = ProxyBuffer::<u32>::new("values");
        for v in 0..6 {
            buffer.push(v * 10);
        }

        // 首次上传：扩容不需要拷贝（旧 buffer 为空），然后一个连续区间
        assert_eq!(env.upload(|ctx| buffer.upload(ctx)), 1);
        assert_eq!(buffer.device_buffer().as_slice()[..6], [0, 10, 20, 30, 40, 50]);
        assert_eq!(env.upload(|ctx| buffer.upload(ctx)), 0);

        buffer.set(1, 11);
        buffer.set(4, 44);
        buffer.set(5, 55);
        assert_eq!(env.upload(|ctx| buffer.upload(ctx)), 2);
        assert_eq!(buffer.device_record(4), Some(&44));
        assert_eq!(env.upload(|ctx| buffer.upload(ctx)), 0);
    }

    #[test]
    fn test_grow_retires_old_buffer() {
        let mut env = UploadEnv::new();
        let mut buffer = ProxyBuffer::<u32>::new_bulk("bulk");
        buffer.push(1);
        env.upload(|ctx| buffer.upload(ctx));
        assert_eq!(buffer.device_buffer().len(), 4);

        for v in 0..4 {
            buffer.push(v);
        }
        // 拷贝旧内容 + 整体写入
        assert_eq!(env.upload(|ctx| buffer.upload(ctx)), 2);
        assert_eq!(buffer.device_buffer().len(), 8);
        assert!(env.resource_manager.is_pending("bulk-4"));
        assert_eq!(buffer.device_record(0), Some(&1));
        assert_eq!(buffer.device_record(5), None);
    }

    #[test]
    fn test_update_unknown_id() {
        let mut buffer = ProxyBuffer::<u32>::new("values");
        assert!(!buffer.set(3, 1));
        assert!(!buffer.is_dirty());
    }
}
