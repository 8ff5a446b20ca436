use glam::{UVec3, Vec3};
use prism_gfx::resources::structured_buffer::GfxStructuredBuffer;
use prism_shader_binding::prismsl;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindlessBufferHandle(pub prismsl::BufferHandle);
impl BindlessBufferHandle {
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(prismsl::BufferHandle { index: index as i32 })
    }
    #[inline]
    pub fn null() -> Self {
        Self(prismsl::BufferHandle {
            index: prismsl::INVALID_BUFFER_ID,
        })
    }
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0.index as usize
    }
}
impl Default for BindlessBufferHandle {
    fn default() -> Self {
        Self::null()
    }
}
impl From<prismsl::BufferHandle> for BindlessBufferHandle {
    fn from(handle: prismsl::BufferHandle) -> Self {
        Self(handle)
    }
}

/// 同一种元素类型的 bindless buffer 数组
///
/// slot 在 `register` 时分配，`rebind` 不改变 slot，`unregister` 之后 slot 可以被复用。
pub struct BindlessArray<T: bytemuck::Pod> {
    slots: Vec<Option<GfxStructuredBuffer<T>>>,
    free_slots: Vec<usize>,

    name: &'static str,
}
// new & init
impl<T: bytemuck::Pod> BindlessArray<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            name,
        }
    }
}
// getter
impl<T: bytemuck::Pod> BindlessArray<T> {
    #[inline]
    pub fn get(&self, handle: prismsl::BufferHandle) -> Option<&GfxStructuredBuffer<T>> {
        if handle.is_null() {
            return None;
        }
        self.slots.get(handle.index as usize)?.as_ref()
    }

    /// 已绑定的 buffer 数量
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
// update
impl<T: bytemuck::Pod> BindlessArray<T> {
    pub fn register(&mut self, buffer: GfxStructuredBuffer<T>) -> BindlessBufferHandle {
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(buffer);
                BindlessBufferHandle::new(slot)
            }
            None => {
                self.slots.push(Some(buffer));
                BindlessBufferHandle::new(self.slots.len() - 1)
            }
        }
    }

    /// 在同一个 slot 上换成新的 buffer，返回旧的 buffer
    pub fn rebind(
        &mut self,
        handle: BindlessBufferHandle,
        buffer: GfxStructuredBuffer<T>,
    ) -> Option<GfxStructuredBuffer<T>> {
        match self.slot_mut(handle) {
            Some(slot) => slot.replace(buffer),
            None => {
                log::error!("{}: rebind to unregistered slot {:?}", self.name, handle);
                None
            }
        }
    }

    pub fn unregister(&mut self, handle: BindlessBufferHandle) -> Option<GfxStructuredBuffer<T>> {
        let buffer = self.slot_mut(handle)?.take();
        self.free_slots.push(handle.index());
        buffer
    }

    fn slot_mut(&mut self, handle: BindlessBufferHandle) -> Option<&mut Option<GfxStructuredBuffer<T>>> {
        if handle.is_null() {
            return None;
        }
        self.slots.get_mut(handle.index()).filter(|slot| slot.is_some())
    }
}

/// Bindless 资源表
///
/// mesh 的几何数据都通过 bindless 索引访问，kernel 中只需要 mesh record 里的整数 id。
///
/// # Bindless 架构
/// - vertex buffers: `prismsl::Vertex` 数组
/// - index buffers: 每个元素为一个三角形
/// - corner normal buffers: 每个三角形 3 个法线
pub struct BindlessManager {
    pub vertex_buffers: BindlessArray<prismsl::Vertex>,
    pub index_buffers: BindlessArray<UVec3>,
    pub corner_normal_buffers: BindlessArray<Vec3>,
}
// new & init
impl BindlessManager {
    pub fn new() -> Self {
        Self {
            vertex_buffers: BindlessArray::new("vertex buffers"),
            index_buffers: BindlessArray::new("index buffers"),
            corner_normal_buffers: BindlessArray::new("corner normal buffers"),
        }
    }
}
impl Default for BindlessManager {
    fn default() -> Self {
        Self::new()
    }
}
impl Drop for BindlessManager {
    fn drop(&mut self) {
        log::info!("Dropping BindlessManager");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_keeps_slot() {
        let mut array = BindlessArray::<u32>::new("test");
        let a = array.register(GfxStructuredBuffer::new_ssbo(1, "a"));
        let b = array.register(GfxStructuredBuffer::new_ssbo(2, "b"));
        assert_eq!((a.index(), b.index()), (0, 1));

        let old = array.rebind(b, GfxStructuredBuffer::new_ssbo(3, "b2")).unwrap();
        assert_eq!(old.name(), "b");
        assert_eq!(array.get(b.0).unwrap().name(), "b2");
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn test_unregister_and_reuse() {
        let mut array = BindlessArray::<u32>::new("test");
        let a = array.register(GfxStructuredBuffer::new_ssbo(1, "a"));
        assert!(array.unregister(a).is_some());
        assert!(array.get(a.0).is_none());
        assert!(array.unregister(a).is_none());
        assert!(array.rebind(a, GfxStructuredBuffer::new_ssbo(1, "x")).is_none());
        assert!(array.is_empty());

        let c = array.register(GfxStructuredBuffer::new_ssbo(1, "c"));
        assert_eq!(c.index(), a.index());
        assert!(array.get(BindlessBufferHandle::null().0).is_none());
    }
}
