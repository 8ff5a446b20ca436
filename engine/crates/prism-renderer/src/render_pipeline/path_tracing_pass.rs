use glam::{UVec2, Vec3};
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::raytracing::acceleration::GfxRay;
use prism_scene::intersection::RayIntersection;
use prism_scene::shading::light::ShadingPoint;
use prism_scene::shading::material::{MaterialParameters, MaterialShaderKind};
use prism_scene::shading::sampling::{balance_heuristic, pixel_rng, random2d};
use rand::Rng;
use rand::rngs::StdRng;

use crate::render_pipeline::shading::{PassContext, RAY_EPSILON, light_emission, offset_origin};
use crate::resources::frame_buffers::GBufferTexel;

/// Path tracing 主 pass
///
/// 每个像素从主光线出发，最多弹射 `max_path_depth` 次：
/// 每次命中做一次 NEE（随机选一个光源 + shadow ray）并用 BSDF 采样下一次弹射，
/// 命中光源或未命中时结束；两种策略用 balance heuristic 合并，没有 Russian roulette。
pub struct PathTracingPass;
impl PathTracingPass {
    pub fn exec(&self, cmd: &mut GfxCommandBuffer, ctx: &PassContext) -> Vec<GBufferTexel> {
        let _span = tracy_client::span!("PathTracingPass::exec");
        cmd.dispatch_2d("path-tracing", ctx.extent, |pixel| Self::shade_pixel(ctx, pixel))
    }

    fn shade_pixel(ctx: &PassContext, pixel: UVec2) -> GBufferTexel {
        let mut rng = pixel_rng(ctx.frame_id, ctx.pixel_index(pixel));
        let (ray, isect) = ctx.primary_hit(pixel);

        let spp = ctx.settings.samples_per_pixel.max(1);
        let mut radiance = Vec3::ZERO;
        for _ in 0..spp {
            radiance += ctx.composite_layers(
                ray,
                isect,
                |ray, isect| Self::trace_path(ctx, ray, isect, &mut rng),
                |ray| ctx.ambient_radiance(ray.direction),
            );
        }
        let radiance = ctx.apply_wireframe(pixel, &isect, radiance / spp as f32);
        ctx.gbuffer_texel(&ray, &isect, radiance)
    }

    /// 从一个已知的命中点出发估计沿 `ray` 反向的辐射亮度
    fn trace_path(ctx: &PassContext, ray: &GfxRay, isect: &RayIntersection, rng: &mut StdRng) -> Vec3 {
        let light_select_pdf = if ctx.lights.is_empty() { 0.0 } else { 1.0 / ctx.lights.len() as f32 };

        let mut radiance = Vec3::ZERO;
        let mut throughput = Vec3::ONE;
        let mut ray = *ray;
        let mut isect = *isect;
        // 上一次弹射的着色点与 BSDF pdf，主光线没有
        let mut prev: Option<(ShadingPoint, f32)> = None;

        for _ in 0..ctx.settings.max_path_depth.max(1) {
            if !isect.valid() {
                for light in ctx.lights.iter().filter(|light| light.is_ambient()) {
                    let weight = match &prev {
                        None => 1.0,
                        Some((p, bsdf_pdf)) => balance_heuristic(
                            *bsdf_pdf,
                            light.pdf_li(p, ray.direction, f32::INFINITY) * light_select_pdf,
                        ),
                    };
                    radiance += throughput * light.le(-ray.direction) * weight;
                }
                break;
            }

            let w_o = -ray.direction;
            if let Some((light, le)) = light_emission(ctx, &isect, w_o) {
                let weight = match &prev {
                    Some((p, bsdf_pdf)) if light.is_hittable() => {
                        balance_heuristic(*bsdf_pdf, light.pdf_li(p, ray.direction, isect.t) * light_select_pdf)
                    }
                    _ => 1.0,
                };
                radiance += throughput * le * weight;
                break;
            }

            let (kind, params) = ctx.surface(&isect, w_o);
            let p = ShadingPoint {
                position: isect.position,
                normal: params.normal,
            };
            radiance += throughput * params.emission;
            radiance += throughput * Self::sample_direct(ctx, kind, &params, &p, w_o, light_select_pdf, rng);

            let Some((w_i, bsdf_pdf)) = kind.sample(&params, w_o, random2d(rng)) else {
                break;
            };
            let cos = params.normal.dot(w_i);
            if bsdf_pdf <= 0.0 || cos <= 0.0 {
                break;
            }
            throughput *= kind.bxdf(&params, w_o, w_i) * cos / bsdf_pdf;
            if throughput == Vec3::ZERO {
                break;
            }

            ray = GfxRay::new(offset_origin(p.position, p.normal, w_i), w_i).with_range(RAY_EPSILON, f32::INFINITY);
            isect = ctx.scene.intersect(&ray);
            prev = Some((p, bsdf_pdf));
        }
        radiance
    }

    /// NEE：均匀选一个光源并采样
    fn sample_direct(
        ctx: &PassContext,
        kind: MaterialShaderKind,
        params: &MaterialParameters,
        p: &ShadingPoint,
        w_o: Vec3,
        light_select_pdf: f32,
        rng: &mut StdRng,
    ) -> Vec3 {
        if ctx.lights.is_empty() {
            return Vec3::ZERO;
        }
        let index = ((rng.r#gen::<f32>() * ctx.lights.len() as f32) as usize).min(ctx.lights.len() - 1);
        let light = &ctx.lights[index];
        let Some(sample) = light.sample_li(p, random2d(rng)) else {
            return Vec3::ZERO;
        };
        let cos = params.normal.dot(sample.direction);
        if cos <= 0.0 || sample.pdf <= 0.0 {
            return Vec3::ZERO;
        }
        if sample.shadowed && ctx.occluded(p, sample.direction, sample.distance) {
            return Vec3::ZERO;
        }

        let light_pdf = sample.pdf * light_select_pdf;
        // BSDF 采样命中不到的光源只能由 NEE 估计，不参与 MIS
        let weight = if light.is_hittable() {
            balance_heuristic(light_pdf, kind.pdf(params, w_o, sample.direction))
        } else {
            1.0
        };
        kind.bxdf(params, w_o, sample.direction) * sample.radiance * cos * weight / light_pdf
    }
}
