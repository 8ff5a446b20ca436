use glam::{UVec2, Vec3};
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::raytracing::acceleration::GfxRay;
use prism_scene::intersection::RayIntersection;
use prism_scene::shading::light::ShadingPoint;
use prism_scene::shading::sampling::{pixel_rng, random2d};
use rand::rngs::StdRng;

use crate::render_pipeline::shading::{PassContext, RAY_EPSILON, light_emission, offset_origin};
use crate::resources::frame_buffers::GBufferTexel;

/// 间接光在最终结果中的权重
const GI_WEIGHT: f32 = 0.05;

/// Deferred shading 主 pass
///
/// 每个像素只取一个命中点，对所有光源求直接光照；
/// 开启 GI 时再追踪一条 BSDF 采样的光线，命中点只算直接光。
pub struct DeferredPass;
impl DeferredPass {
    pub fn exec(&self, cmd: &mut GfxCommandBuffer, ctx: &PassContext) -> Vec<GBufferTexel> {
        let _span = tracy_client::span!("DeferredPass::exec");
        cmd.dispatch_2d("deferred-shading", ctx.extent, |pixel| Self::shade_pixel(ctx, pixel))
    }

    fn shade_pixel(ctx: &PassContext, pixel: UVec2) -> GBufferTexel {
        let mut rng = pixel_rng(ctx.frame_id, ctx.pixel_index(pixel));
        let (ray, isect) = ctx.primary_hit(pixel);

        let radiance = ctx.composite_layers(
            ray,
            isect,
            |ray, isect| Self::shade_surface(ctx, ray, isect, ctx.settings.enable_gi, &mut rng),
            |ray| ctx.ambient_radiance(ray.direction),
        );
        let radiance = ctx.apply_wireframe(pixel, &isect, radiance);
        ctx.gbuffer_texel(&ray, &isect, radiance)
    }

    fn shade_surface(ctx: &PassContext, ray: &GfxRay, isect: &RayIntersection, gi: bool, rng: &mut StdRng) -> Vec3 {
        let w_o = -ray.direction;
        if let Some((_, le)) = light_emission(ctx, isect, w_o) {
            return le;
        }

        let (kind, params) = ctx.surface(isect, w_o);
        let p = ShadingPoint {
            position: isect.position,
            normal: params.normal,
        };

        let mut direct = params.emission;
        for light in &ctx.lights {
            let sample = light.l_i(&p);
            let cos = params.normal.dot(sample.direction);
            if cos <= 0.0 {
                continue;
            }
            if sample.shadowed && ctx.occluded(&p, sample.direction, sample.distance) {
                continue;
            }
            direct += kind.bxdf(&params, w_o, sample.direction) * sample.radiance * cos;
        }
        if !gi {
            return direct;
        }

        let Some((w_i, pdf)) = kind.sample(&params, w_o, random2d(rng)) else {
            return direct;
        };
        let cos = params.normal.dot(w_i);
        if pdf <= 0.0 || cos <= 0.0 {
            return direct;
        }
        let gi_ray = GfxRay::new(offset_origin(p.position, p.normal, w_i), w_i).with_range(RAY_EPSILON, f32::INFINITY);
        let gi_isect = ctx.scene.intersect(&gi_ray);
        let incoming = if gi_isect.valid() {
            Self::shade_surface(ctx, &gi_ray, &gi_isect, false, rng)
        } else {
            ctx.ambient_radiance(w_i)
        };
        let indirect = kind.bxdf(&params, w_o, w_i) * incoming * cos / pdf;
        direct * (1.0 - GI_WEIGHT) + indirect * GI_WEIGHT
    }
}
