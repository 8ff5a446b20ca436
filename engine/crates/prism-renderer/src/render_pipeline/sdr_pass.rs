use glam::Vec3;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::resources::image::GfxImage2D;

/// HDR -> RGBA8：Reinhard + gamma
pub struct SdrPass;
impl SdrPass {
    const GAMMA: f32 = 2.2;

    pub fn exec(&self, cmd: &mut GfxCommandBuffer, src: &GfxImage2D<Vec3>, dst: &mut GfxImage2D<[u8; 4]>) {
        let _span = tracy_client::span!("SdrPass::exec");
        assert_eq!(src.extent(), dst.extent(), "sdr pass extent mismatch");
        let texels = cmd.dispatch_map("hdr-to-sdr", src.texels().len(), |idx| Self::tonemap(src.texels()[idx]));
        dst.texels_mut().copy_from_slice(&texels);
    }

    pub fn tonemap(color: Vec3) -> [u8; 4] {
        let color = color.max(Vec3::ZERO);
        let mapped = color / (Vec3::ONE + color);
        let encode = |c: f32| (c.powf(1.0 / Self::GAMMA) * 255.0).round().clamp(0.0, 255.0) as u8;
        [encode(mapped.x), encode(mapped.y), encode(mapped.z), 255]
    }
}
