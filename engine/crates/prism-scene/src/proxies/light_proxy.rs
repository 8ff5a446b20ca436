use glam::{Vec2, Vec3};
use prism_shader_binding::prismsl;

use crate::components::light::LightComponent;
use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// 扁平化的光源记录，按 type tag 分派求值器
pub struct LightProxy {
    lights: ProxyBuffer<prismsl::Light>,
}
// new & init
impl LightProxy {
    pub fn new() -> Self {
        Self {
            lights: ProxyBuffer::new("light-buffer"),
        }
    }
}
impl Default for LightProxy {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl LightProxy {
    #[inline]
    pub fn light(&self, light_id: u32) -> Option<&prismsl::Light> {
        self.lights.get(light_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::Light> {
        &self.lights
    }
}
// update
impl LightProxy {
    /// 没有对应求值器的光源类型返回 `INVALID_ID`
    pub fn add_light(&mut self, component: &LightComponent) -> u32 {
        let Some(light_type) = component.type_tag() else {
            log::error!("unsupported light type: {:?}", component.shape);
            return prismsl::INVALID_ID;
        };
        let mut record = prismsl::Light {
            light_type,
            instance_id: prismsl::INVALID_ID,
            transform_id: prismsl::INVALID_ID,
            _padding0: 0,
            color: Vec3::ZERO,
            intensity: 0.0,
            rect_size: Vec2::ZERO,
            radius: 0.0,
            _padding1: 0.0,
        };
        component.write_record(&mut record, light_type);
        self.lights.push(record)
    }

    pub fn update_light(&mut self, light_id: u32, component: &LightComponent) {
        let Some(light_type) = component.type_tag() else {
            log::error!("light {light_id}: unsupported light type: {:?}", component.shape);
            return;
        };
        self.lights.update(light_id, |record| component.write_record(record, light_type));
    }

    /// 光源作为几何体被渲染时对应的 instance
    pub fn bind_light_instance(&mut self, light_id: u32, instance_id: u32) -> bool {
        self.lights.update(light_id, |record| record.instance_id = instance_id)
    }

    /// 光源的位置与朝向来自该 transform
    pub fn bind_light_transform(&mut self, light_id: u32, transform_id: u32) -> bool {
        self.lights.update(light_id, |record| record.transform_id = transform_id)
    }
}
impl SceneProxy for LightProxy {
    fn name(&self) -> &str {
        "LightProxy"
    }

    fn is_dirty(&self) -> bool {
        self.lights.is_dirty()
    }

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        let _span = tracy_client::span!("LightProxy::upload_dirty_data");
        self.lights.upload(ctx);
    }
}
