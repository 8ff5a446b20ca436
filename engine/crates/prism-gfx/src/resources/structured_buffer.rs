use crate::resources::resource::GfxResource;

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct GfxBufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const VERTEX = 1 << 4;
        const INDEX = 1 << 5;
        /// host 可以直接读写（stage buffer）
        const HOST_VISIBLE = 1 << 6;
    }
}

/// 元素类型为 `T` 的 device buffer
///
/// 只能通过 `GfxCommandBuffer` 写入 device 侧内容；
/// `HOST_VISIBLE` 的 buffer 额外允许通过 `mapped_slice` 直接写入。
pub struct GfxStructuredBuffer<T: bytemuck::Pod> {
    data: Vec<T>,
    usage: GfxBufferUsage,
    /// 被命令流写入的次数
    write_count: u64,

    name: String,
}
// init & destroy
impl<T: bytemuck::Pod> GfxStructuredBuffer<T> {
    /// 内容初始化为 0
    pub fn new(len: usize, usage: GfxBufferUsage, name: impl AsRef<str>) -> Self {
        Self {
            data: vec![<T as bytemuck::Zeroable>::zeroed(); len],
            usage,
            write_count: 0,
            name: name.as_ref().to_string(),
        }
    }

    #[inline]
    pub fn new_ssbo(len: usize, name: impl AsRef<str>) -> Self {
        Self::new(len, GfxBufferUsage::STORAGE | GfxBufferUsage::TRANSFER_DST | GfxBufferUsage::TRANSFER_SRC, name)
    }

    #[inline]
    pub fn new_ubo(len: usize, name: impl AsRef<str>) -> Self {
        Self::new(len, GfxBufferUsage::UNIFORM | GfxBufferUsage::TRANSFER_DST, name)
    }

    #[inline]
    pub fn new_stage_buffer(len: usize, name: impl AsRef<str>) -> Self {
        Self::new(len, GfxBufferUsage::TRANSFER_SRC | GfxBufferUsage::HOST_VISIBLE, name)
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// getter
impl<T: bytemuck::Pod> GfxStructuredBuffer<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn usage(&self) -> GfxBufferUsage {
        self.usage
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// device 侧内容，kernel 通过它读取数据
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// 只有 stage buffer 可以被 host 直接写入
    pub fn mapped_slice(&mut self) -> &mut [T] {
        assert!(
            self.usage.contains(GfxBufferUsage::HOST_VISIBLE),
            "buffer {} is not host visible",
            self.name
        );
        &mut self.data
    }
}
// 只允许命令流调用
impl<T: bytemuck::Pod> GfxStructuredBuffer<T> {
    pub(crate) fn write(&mut self, offset: usize, src: &[T]) {
        let end = offset + src.len();
        if end > self.data.len() {
            panic!("buffer {} overflow: write [{offset}, {end}) into {} elements", self.name, self.data.len());
        }
        self.data[offset..end].copy_from_slice(src);
        self.write_count += 1;
    }
}
impl<T: bytemuck::Pod> GfxResource for GfxStructuredBuffer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn size_bytes(&self) -> usize {
        self.data.len() * size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_zeroed() {
        let buffer = GfxStructuredBuffer::<u32>::new_ssbo(8, "test");
        assert_eq!(buffer.len(), 8);
        assert!(buffer.as_slice().iter().all(|v| *v == 0));
        assert_eq!(buffer.size_bytes(), 32);
        assert_eq!(buffer.write_count(), 0);
    }

    #[test]
    #[should_panic]
    fn test_map_device_buffer_panics() {
        let mut buffer = GfxStructuredBuffer::<u32>::new_ssbo(4, "device");
        buffer.mapped_slice()[0] = 1;
    }

    #[test]
    #[should_panic]
    fn test_write_overflow_panics() {
        let mut buffer = GfxStructuredBuffer::<u32>::new_ssbo(2, "small");
        buffer.write(1, &[1, 2]);
    }
}
