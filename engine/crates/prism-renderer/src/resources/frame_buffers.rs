use glam::{UVec2, Vec2, Vec3};
use prism_gfx::resources::image::GfxImage2D;
use prism_render_interface::gfx_resource_manager::GfxResourceManager;
use prism_shader_binding::prismsl;

/// 光栅化得到的可见性：哪个 instance 的哪个三角形，以及 v1 / v2 的透视校正权重
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VisibilityTexel {
    pub instance_id: u32,
    pub primitive_id: u32,
    pub barycentrics: Vec2,
}
impl VisibilityTexel {
    pub const EMPTY: Self = Self {
        instance_id: prismsl::INVALID_ID,
        primitive_id: prismsl::INVALID_ID,
        barycentrics: Vec2::ZERO,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instance_id == prismsl::INVALID_ID
    }
}

/// 主 pass 对一个像素的全部输出
#[derive(Copy, Clone, Debug)]
pub struct GBufferTexel {
    /// 相机到第一个命中点的距离，未命中为无穷远
    pub depth: f32,
    pub normal: Vec3,
    pub base_color: Vec3,
    pub instance_id: u32,
    pub material_id: u32,
    pub motion: Vec2,
    pub radiance: Vec3,
}
impl GBufferTexel {
    /// 未命中任何物体时的哨兵值
    pub fn miss(radiance: Vec3) -> Self {
        Self {
            depth: f32::INFINITY,
            normal: Vec3::ZERO,
            base_color: Vec3::ZERO,
            instance_id: prismsl::INVALID_ID,
            material_id: prismsl::INVALID_ID,
            motion: Vec2::ZERO,
            radiance,
        }
    }
}

/// 每帧清空并重新写入的 G-buffer
pub struct GBuffer {
    pub depth: GfxImage2D<f32>,
    pub normal: GfxImage2D<Vec3>,
    pub base_color: GfxImage2D<Vec3>,
    pub instance_id: GfxImage2D<u32>,
    pub material_id: GfxImage2D<u32>,
    pub motion: GfxImage2D<Vec2>,
    pub radiance: GfxImage2D<Vec3>,
}
impl GBuffer {
    fn new(extent: UVec2) -> Self {
        Self {
            depth: GfxImage2D::new(extent, f32::INFINITY, "gbuffer-depth"),
            normal: GfxImage2D::new(extent, Vec3::ZERO, "gbuffer-normal"),
            base_color: GfxImage2D::new(extent, Vec3::ZERO, "gbuffer-base-color"),
            instance_id: GfxImage2D::new(extent, prismsl::INVALID_ID, "gbuffer-instance-id"),
            material_id: GfxImage2D::new(extent, prismsl::INVALID_ID, "gbuffer-material-id"),
            motion: GfxImage2D::new(extent, Vec2::ZERO, "gbuffer-motion"),
            radiance: GfxImage2D::new(extent, Vec3::ZERO, "gbuffer-radiance"),
        }
    }

    /// 每帧开始时清为哨兵值
    pub fn clear(&mut self) {
        let _span = tracy_client::span!("GBuffer::clear");
        self.depth.clear(f32::INFINITY);
        self.normal.clear(Vec3::ZERO);
        self.base_color.clear(Vec3::ZERO);
        self.instance_id.clear(prismsl::INVALID_ID);
        self.material_id.clear(prismsl::INVALID_ID);
        self.motion.clear(Vec2::ZERO);
        self.radiance.clear(Vec3::ZERO);
    }

    /// 按行优先写入 dispatch 的输出，每个像素恰好一次
    pub fn write(&mut self, texels: &[GBufferTexel]) {
        assert_eq!(texels.len(), self.depth.texels().len(), "gbuffer write size mismatch");
        for (idx, texel) in texels.iter().enumerate() {
            self.depth.texels_mut()[idx] = texel.depth;
            self.normal.texels_mut()[idx] = texel.normal;
            self.base_color.texels_mut()[idx] = texel.base_color;
            self.instance_id.texels_mut()[idx] = texel.instance_id;
            self.material_id.texels_mut()[idx] = texel.material_id;
            self.motion.texels_mut()[idx] = texel.motion;
            self.radiance.texels_mut()[idx] = texel.radiance;
        }
    }

    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.depth.extent()
    }

    fn retire(self, resource_manager: &mut GfxResourceManager, frame_id: u64) {
        resource_manager.destroy_resource(Box::new(self.depth), frame_id);
        resource_manager.destroy_resource(Box::new(self.normal), frame_id);
        resource_manager.destroy_resource(Box::new(self.base_color), frame_id);
        resource_manager.destroy_resource(Box::new(self.instance_id), frame_id);
        resource_manager.destroy_resource(Box::new(self.material_id), frame_id);
        resource_manager.destroy_resource(Box::new(self.motion), frame_id);
        resource_manager.destroy_resource(Box::new(self.radiance), frame_id);
    }
}

/// 时域降噪的一份历史
pub struct HistoryBuffers {
    pub radiance: GfxImage2D<Vec3>,
    pub normal: GfxImage2D<Vec3>,
    pub depth: GfxImage2D<f32>,
    /// 已经累积的帧数
    pub length: GfxImage2D<f32>,
}
impl HistoryBuffers {
    fn new(extent: UVec2, tag: &str) -> Self {
        Self {
            radiance: GfxImage2D::new(extent, Vec3::ZERO, format!("history-radiance-{tag}")),
            normal: GfxImage2D::new(extent, Vec3::ZERO, format!("history-normal-{tag}")),
            depth: GfxImage2D::new(extent, f32::INFINITY, format!("history-depth-{tag}")),
            length: GfxImage2D::new(extent, 0.0, format!("history-length-{tag}")),
        }
    }

    fn retire(self, resource_manager: &mut GfxResourceManager, frame_id: u64) {
        resource_manager.destroy_resource(Box::new(self.radiance), frame_id);
        resource_manager.destroy_resource(Box::new(self.normal), frame_id);
        resource_manager.destroy_resource(Box::new(self.depth), frame_id);
        resource_manager.destroy_resource(Box::new(self.length), frame_id);
    }
}

/// 渲染分辨率下的所有图像
///
/// 分辨率变化时整体重建，旧的图像交给资源管理器延迟销毁。
pub struct FrameBuffers {
    pub visibility: GfxImage2D<VisibilityTexel>,
    pub gbuffer: GBuffer,

    /// 本帧写入的历史
    pub current_history: HistoryBuffers,
    /// 上一帧的历史，只读
    pub previous_history: HistoryBuffers,

    /// 降噪之后的 HDR 结果
    pub color: GfxImage2D<Vec3>,
    /// tone mapping 之后的输出
    pub output: GfxImage2D<[u8; 4]>,

    extent: UVec2,
}
// new & init
impl FrameBuffers {
    pub fn new(extent: UVec2) -> Self {
        log::info!("create frame buffers: {}x{}", extent.x, extent.y);
        Self {
            visibility: GfxImage2D::new(extent, VisibilityTexel::EMPTY, "visibility-buffer"),
            gbuffer: GBuffer::new(extent),
            current_history: HistoryBuffers::new(extent, "a"),
            previous_history: HistoryBuffers::new(extent, "b"),
            color: GfxImage2D::new(extent, Vec3::ZERO, "hdr-color"),
            output: GfxImage2D::new(extent, [0, 0, 0, 255], "sdr-output"),
            extent,
        }
    }
}
// getter
impl FrameBuffers {
    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.extent
    }
}
// update
impl FrameBuffers {
    /// # Phase: After Render
    pub fn swap_history(&mut self) {
        std::mem::swap(&mut self.current_history, &mut self.previous_history);
    }
}
// destroy
impl FrameBuffers {
    pub fn retire(self, resource_manager: &mut GfxResourceManager, frame_id: u64) {
        resource_manager.destroy_resource(Box::new(self.visibility), frame_id);
        self.gbuffer.retire(resource_manager, frame_id);
        self.current_history.retire(resource_manager, frame_id);
        self.previous_history.retire(resource_manager, frame_id);
        resource_manager.destroy_resource(Box::new(self.color), frame_id);
        resource_manager.destroy_resource(Box::new(self.output), frame_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbuffer_write_and_clear() {
        let mut frame_buffers = FrameBuffers::new(UVec2::new(2, 2));
        let mut texels = vec![GBufferTexel::miss(Vec3::ZERO); 4];
        texels[3] = GBufferTexel {
            depth: 2.0,
            normal: Vec3::Z,
            base_color: Vec3::ONE,
            instance_id: 7,
            material_id: 1,
            motion: Vec2::ZERO,
            radiance: Vec3::splat(0.5),
        };
        frame_buffers.gbuffer.write(&texels);
        assert_eq!(frame_buffers.gbuffer.instance_id.load(UVec2::new(1, 1)), 7);
        assert_eq!(frame_buffers.gbuffer.depth.load(UVec2::new(0, 0)), f32::INFINITY);

        frame_buffers.gbuffer.clear();
        assert_eq!(frame_buffers.gbuffer.instance_id.load(UVec2::new(1, 1)), prismsl::INVALID_ID);
    }

    #[test]
    fn test_retire_defers_destruction() {
        let mut resource_manager = GfxResourceManager::new();
        FrameBuffers::new(UVec2::new(4, 4)).retire(&mut resource_manager, 1);
        assert!(resource_manager.is_pending("gbuffer-depth"));
        resource_manager.cleanup(3);
        assert!(resource_manager.is_pending("sdr-output"));
        resource_manager.cleanup(4);
        assert_eq!(resource_manager.pending_count(), 0);
    }
}
