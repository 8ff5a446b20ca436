use glam::UVec2;
use rayon::prelude::*;

use crate::resources::resource::GfxResource;

/// 2D storage image，按行优先存储
pub struct GfxImage2D<T: bytemuck::Pod> {
    extent: UVec2,
    texels: Vec<T>,

    name: String,
}
// new & init
impl<T: bytemuck::Pod> GfxImage2D<T> {
    pub fn new(extent: UVec2, clear_value: T, name: impl AsRef<str>) -> Self {
        Self {
            extent,
            texels: vec![clear_value; (extent.x * extent.y) as usize],
            name: name.as_ref().to_string(),
        }
    }
}
// getter
impl<T: bytemuck::Pod> GfxImage2D<T> {
    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.extent
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn texel_index(&self, coord: UVec2) -> usize {
        (coord.y * self.extent.x + coord.x) as usize
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.extent.x && (y as u32) < self.extent.y
    }

    #[inline]
    pub fn load(&self, coord: UVec2) -> T {
        self.texels[self.texel_index(coord)]
    }

    /// 越界返回 None
    #[inline]
    pub fn try_load(&self, x: i32, y: i32) -> Option<T> {
        self.contains(x, y).then(|| self.texels[(y as u32 * self.extent.x + x as u32) as usize])
    }

    #[inline]
    pub fn texels(&self) -> &[T] {
        &self.texels
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}
// update
impl<T: bytemuck::Pod> GfxImage2D<T> {
    #[inline]
    pub fn store(&mut self, coord: UVec2, value: T) {
        let index = self.texel_index(coord);
        self.texels[index] = value;
    }

    #[inline]
    pub fn texels_mut(&mut self) -> &mut [T] {
        &mut self.texels
    }

    pub fn clear(&mut self, value: T)
    where
        T: Send + Sync,
    {
        self.texels.par_iter_mut().for_each(|texel| *texel = value);
    }

    pub fn copy_from(&mut self, src: &GfxImage2D<T>) {
        assert_eq!(self.extent, src.extent, "image extent mismatch: {} <- {}", self.name, src.name);
        self.texels.copy_from_slice(&src.texels);
    }
}
impl<T: bytemuck::Pod> GfxResource for GfxImage2D<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn size_bytes(&self) -> usize {
        self.texels.len() * size_of::<T>()
    }
}
