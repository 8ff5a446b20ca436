use glam::{Mat4, UVec2, Vec2, Vec3};
use prism_gfx::raytracing::acceleration::{GfxHit, GfxRay};
use prism_gfx::resources::image::GfxImage2D;
use prism_render_interface::pipeline_settings::{PipelineSettings, VisibilityMode};
use prism_scene::gpu_scene::GpuScene;
use prism_scene::gpu_scene::helper::project_to_uv;
use prism_scene::intersection::RayIntersection;
use prism_scene::shading::light::{LightInstance, ShadingPoint};
use prism_scene::shading::material::{MaterialParameters, MaterialShaderKind};

use crate::resources::frame_buffers::{GBufferTexel, VisibilityTexel};

/// 自相交的偏移量
pub const RAY_EPSILON: f32 = 1e-4;
/// 线框的宽度（像素）
const WIREFRAME_WIDTH_PX: f32 = 0.75;
/// 半透明层数上限
const MAX_TRANSPARENT_LAYERS: u32 = 16;

/// 主 pass 共享的只读数据
pub struct PassContext<'a> {
    pub scene: &'a GpuScene,
    pub settings: &'a PipelineSettings,
    /// 本帧所有可以求值的光源
    pub lights: Vec<LightInstance>,
    /// visibility buffer，只有 `VisibilityMode::Rasterized` 时存在
    pub visibility: Option<&'a GfxImage2D<VisibilityTexel>>,
    pub extent: UVec2,
    pub frame_id: u64,
}
// new & init
impl<'a> PassContext<'a> {
    pub fn new(
        scene: &'a GpuScene,
        settings: &'a PipelineSettings,
        visibility: &'a GfxImage2D<VisibilityTexel>,
        frame_id: u64,
    ) -> Self {
        Self {
            scene,
            settings,
            lights: scene.light_instances(),
            visibility: (settings.visibility_mode == VisibilityMode::Rasterized).then_some(visibility),
            extent: visibility.extent(),
            frame_id,
        }
    }
}
// query
impl PassContext<'_> {
    #[inline]
    pub fn pixel_index(&self, pixel: UVec2) -> u64 {
        (pixel.y * self.extent.x + pixel.x) as u64
    }

    /// 像素中心的主光线与第一个命中点
    pub fn primary_hit(&self, pixel: UVec2) -> (GfxRay, RayIntersection) {
        let ray = self.scene.primary_ray(pixel.as_vec2() + 0.5);
        let Some(visibility) = self.visibility else {
            return (ray, self.scene.intersect(&ray));
        };

        let texel = visibility.load(pixel);
        if texel.is_empty() {
            return (ray, RayIntersection::invalid());
        }
        let hit = GfxHit {
            instance_index: texel.instance_id,
            primitive_index: texel.primitive_id,
            barycentrics: texel.barycentrics,
            t: 0.0,
        };
        let mut isect = self.scene.intersect_hit(&ray, &hit);
        isect.t = isect.depth;
        (ray, isect)
    }

    /// 未命中时看到的环境光
    pub fn ambient_radiance(&self, direction: Vec3) -> Vec3 {
        self.lights
            .iter()
            .filter(|light| light.is_ambient())
            .fold(Vec3::ZERO, |acc, light| acc + light.le(-direction))
    }

    /// 光源采样的 shadow ray 是否被遮挡
    pub fn occluded(&self, p: &ShadingPoint, direction: Vec3, distance: f32) -> bool {
        let origin = offset_origin(p.position, p.normal, direction);
        let t_max = if distance.is_finite() { distance * (1.0 - 1e-3) - RAY_EPSILON } else { f32::INFINITY };
        if t_max <= RAY_EPSILON {
            return false;
        }
        self.scene.has_hit(&GfxRay::new(origin, direction).with_range(RAY_EPSILON, t_max))
    }

    /// 命中点的材质与着色参数
    pub fn surface(&self, isect: &RayIntersection, w_o: Vec3) -> (MaterialShaderKind, MaterialParameters) {
        let material = self.scene.material(isect.material_id);
        let kind = MaterialShaderKind::from_tag(material.shader_type);
        (kind, kind.calc_material_parameters(&material, isect, w_o))
    }

    /// 第一个命中点是否绘制线框
    pub fn wireframe_enabled(&self, isect: &RayIntersection) -> bool {
        self.settings.wireframe_overlay || self.scene.material(isect.material_id).wireframe != 0
    }

    /// 半透明循环：依次累加每一层的贡献，直到未命中或透射率足够小
    ///
    /// `shade` 返回某一层的出射辐射亮度，`miss` 返回穿透所有层之后看到的辐射亮度。
    pub fn composite_layers(
        &self,
        mut ray: GfxRay,
        mut isect: RayIntersection,
        mut shade: impl FnMut(&GfxRay, &RayIntersection) -> Vec3,
        miss: impl Fn(&GfxRay) -> Vec3,
    ) -> Vec3 {
        let epsilon = self.settings.transmittance_epsilon;
        let mut radiance = Vec3::ZERO;
        let mut transmittance = 1.0;
        let mut layers = 0;
        while isect.valid() && transmittance > epsilon && layers < MAX_TRANSPARENT_LAYERS {
            let alpha = if isect.shape.is_light() {
                1.0
            } else {
                self.scene.material(isect.material_id).alpha.clamp(0.0, 1.0)
            };
            if alpha > 0.0 {
                radiance += transmittance * alpha * shade(&ray, &isect);
            }
            transmittance *= 1.0 - alpha;
            ray = GfxRay::new(isect.position + ray.direction * RAY_EPSILON, ray.direction)
                .with_range(RAY_EPSILON, f32::INFINITY);
            isect = if transmittance > epsilon { self.scene.intersect(&ray) } else { RayIntersection::invalid() };
            layers += 1;
        }
        if !isect.valid() && transmittance > epsilon {
            radiance += transmittance * miss(&ray);
        }
        radiance
    }

    /// 第一个命中点写入 G-buffer 的内容
    pub fn gbuffer_texel(&self, ray: &GfxRay, isect: &RayIntersection, radiance: Vec3) -> GBufferTexel {
        if !isect.valid() {
            return GBufferTexel::miss(radiance);
        }
        let (_, params) = self.surface(isect, -ray.direction);
        GBufferTexel {
            depth: isect.depth,
            normal: params.normal,
            base_color: params.base_color,
            instance_id: isect.instance_id,
            material_id: isect.material_id,
            motion: isect.motion,
            radiance,
        }
    }

    /// 线框叠加：到最近一条边的屏幕距离越小越暗
    pub fn apply_wireframe(&self, pixel: UVec2, isect: &RayIntersection, color: Vec3) -> Vec3 {
        if !isect.valid() || !self.wireframe_enabled(isect) {
            return color;
        }
        let view_proj = self.scene.view().view_proj;
        let Some(distance) = helper::edge_distance_px(&view_proj, &isect.triangle, pixel.as_vec2() + 0.5, self.extent)
        else {
            return color;
        };
        color * (1.0 - (-distance / WIREFRAME_WIDTH_PX).exp())
    }
}

/// 沿法线偏移的光线起点，避免自相交
#[inline]
pub fn offset_origin(position: Vec3, normal: Vec3, direction: Vec3) -> Vec3 {
    let side = if normal.dot(direction) >= 0.0 { 1.0 } else { -1.0 };
    position + normal * (RAY_EPSILON * side)
}

/// 命中光源几何体时的发光
pub fn light_emission(ctx: &PassContext, isect: &RayIntersection, w_o: Vec3) -> Option<(LightInstance, Vec3)> {
    if !isect.shape.is_light() {
        return None;
    }
    let light = ctx.scene.light_instance(isect.shape.light_id)?;
    Some((light, light.le(w_o)))
}

mod helper {
    use super::*;

    /// 像素到三角形三条边在屏幕上的最短距离
    pub fn edge_distance_px(view_proj: &Mat4, triangle: &[Vec3; 3], pixel: Vec2, extent: UVec2) -> Option<f32> {
        let extent = extent.as_vec2();
        let a = project_to_uv(view_proj, triangle[0])? * extent;
        let b = project_to_uv(view_proj, triangle[1])? * extent;
        let c = project_to_uv(view_proj, triangle[2])? * extent;
        Some(segment_distance(pixel, a, b).min(segment_distance(pixel, b, c)).min(segment_distance(pixel, c, a)))
    }

    fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
        let ab = b - a;
        let len2 = ab.length_squared();
        let t = if len2 > 0.0 { ((p - a).dot(ab) / len2).clamp(0.0, 1.0) } else { 0.0 };
        p.distance(a + ab * t)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_segment_distance() {
            assert_eq!(segment_distance(Vec2::new(0.5, 1.0), Vec2::ZERO, Vec2::X), 1.0);
            assert_eq!(segment_distance(Vec2::new(3.0, 0.0), Vec2::ZERO, Vec2::X), 2.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_gfx::commands::command_buffer::GfxCommandBuffer;
    use prism_render_interface::gfx_resource_manager::GfxResourceManager;
    use prism_scene::components::camera::CameraComponent;
    use prism_scene::components::material::MaterialComponent;
    use prism_scene::components::transform::TransformComponent;
    use prism_scene::shapes::quad::Quad;

    fn build_scene(extent: UVec2, setup: impl FnOnce(&mut GpuScene)) -> GpuScene {
        let mut scene = GpuScene::new(extent);
        scene.add_camera(CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO));
        setup(&mut scene);
        let mut cmd = GfxCommandBuffer::new("upload");
        cmd.begin();
        let mut resource_manager = GfxResourceManager::new();
        scene.upload_render_data(&mut cmd, &mut resource_manager, 1);
        scene
    }

    fn add_quad(scene: &mut GpuScene, material: &MaterialComponent, transform: TransformComponent) -> u32 {
        let mesh = scene.add_static_mesh(Quad::mesh_data());
        let material = scene.add_material(material);
        scene.set_static_mesh_material(mesh, material);
        let instance = scene.register_instance();
        scene.set_instance_mesh_id(instance, mesh);
        let t = scene.add_transform(&transform);
        scene.bind_transform(instance, t);
        instance
    }

    #[test]
    fn test_composite_layers() {
        let extent = UVec2::new(9, 9);
        let scene = build_scene(extent, |scene| {
            add_quad(scene, &MaterialComponent::diffuse(Vec3::Z), TransformComponent::default());
            let glass = MaterialComponent {
                alpha: 0.25,
                ..MaterialComponent::diffuse(Vec3::X)
            };
            add_quad(
                scene,
                &glass,
                TransformComponent::from_trs(Vec3::Z, glam::Quat::IDENTITY, Vec3::splat(0.5)),
            );
        });
        let settings = PipelineSettings::default();
        let visibility = GfxImage2D::new(extent, VisibilityTexel::EMPTY, "visibility");
        let ctx = PassContext::new(&scene, &settings, &visibility, 1);

        let mut layers = 0;
        let (ray, isect) = ctx.primary_hit(UVec2::new(4, 4));
        let color = ctx.composite_layers(
            ray,
            isect,
            |_, isect| {
                layers += 1;
                ctx.scene.material(isect.material_id).base_color
            },
            |_| Vec3::ONE,
        );
        // 前面 25% 的红色，后面不透明的蓝色挡住背景
        assert_eq!(layers, 2);
        assert!(color.abs_diff_eq(Vec3::new(0.25, 0.0, 0.75), 1e-5), "{color}");

        // 半透明 quad 之外只看到不透明的一层
        let (ray, isect) = ctx.primary_hit(UVec2::new(7, 4));
        let opaque = ctx.composite_layers(
            ray,
            isect,
            |_, isect| ctx.scene.material(isect.material_id).base_color,
            |_| Vec3::ONE,
        );
        assert_eq!(opaque, Vec3::Z);

        let (ray, isect) = ctx.primary_hit(UVec2::ZERO);
        assert!(!isect.valid());
        assert_eq!(ctx.composite_layers(ray, isect, |_, _| Vec3::ZERO, |_| Vec3::ONE), Vec3::ONE);
    }

    #[test]
    fn test_wireframe_overlay() {
        let extent = UVec2::new(33, 33);
        let scene = build_scene(extent, |scene| {
            let wire = MaterialComponent {
                wireframe: true,
                ..MaterialComponent::diffuse(Vec3::ONE)
            };
            add_quad(scene, &wire, TransformComponent::default());
        });
        let settings = PipelineSettings::default();
        let visibility = GfxImage2D::new(extent, VisibilityTexel::EMPTY, "visibility");
        let ctx = PassContext::new(&scene, &settings, &visibility, 1);

        // 画面中心落在两个三角形共享的对角线上
        let center = UVec2::new(16, 16);
        let (_, isect) = ctx.primary_hit(center);
        assert!(ctx.wireframe_enabled(&isect));
        assert!(ctx.apply_wireframe(center, &isect, Vec3::ONE).x < 0.05);

        // 离所有边都有好几个像素
        let inside = UVec2::new(24, 16);
        let (_, isect) = ctx.primary_hit(inside);
        assert!(isect.valid());
        assert!(ctx.apply_wireframe(inside, &isect, Vec3::ONE).x > 0.99);

        let (_, miss) = ctx.primary_hit(UVec2::ZERO);
        assert_eq!(ctx.apply_wireframe(UVec2::ZERO, &miss, Vec3::ONE), Vec3::ONE);
    }

    #[test]
    fn test_wireframe_setting_applies_to_every_material() {
        let extent = UVec2::new(33, 33);
        let scene = build_scene(extent, |scene| {
            add_quad(scene, &MaterialComponent::diffuse(Vec3::ONE), TransformComponent::default());
        });
        let visibility = GfxImage2D::new(extent, VisibilityTexel::EMPTY, "visibility");
        let center = UVec2::new(16, 16);

        let settings = PipelineSettings::default();
        let ctx = PassContext::new(&scene, &settings, &visibility, 1);
        let (_, isect) = ctx.primary_hit(center);
        assert!(!ctx.wireframe_enabled(&isect));
        assert_eq!(ctx.apply_wireframe(center, &isect, Vec3::ONE), Vec3::ONE);

        let settings = PipelineSettings {
            wireframe_overlay: true,
            ..Default::default()
        };
        let ctx = PassContext::new(&scene, &settings, &visibility, 1);
        assert!(ctx.apply_wireframe(center, &isect, Vec3::ONE).x < 0.05);
    }
}
