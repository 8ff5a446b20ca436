use prism_shader_binding::prismsl;

use crate::components::material::MaterialComponent;
use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// 扁平化的材质记录，按 shader type tag 分派求值器
pub struct MaterialProxy {
    materials: ProxyBuffer<prismsl::Material>,
}
// new & init
impl MaterialProxy {
    pub fn new() -> Self {
        Self {
            materials: ProxyBuffer::new("material-buffer"),
        }
    }
}
impl Default for MaterialProxy {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl MaterialProxy {
    #[inline]
    pub fn material(&self, material_id: u32) -> Option<&prismsl::Material> {
        self.materials.get(material_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::Material> {
        &self.materials
    }
}
// update
impl MaterialProxy {
    /// 没有对应求值器的 shader 返回 `INVALID_ID`
    pub fn add_material(&mut self, component: &MaterialComponent) -> u32 {
        let Some(shader_type) = component.shader_tag() else {
            log::error!("unsupported shader: {:?}", component.shader);
            return prismsl::INVALID_ID;
        };
        self.materials.push(component.to_record(shader_type))
    }

    pub fn update_material(&mut self, material_id: u32, component: &MaterialComponent) {
        let Some(shader_type) = component.shader_tag() else {
            log::error!("material {material_id}: unsupported shader: {:?}", component.shader);
            return;
        };
        self.materials.set(material_id, component.to_record(shader_type));
    }
}
impl SceneProxy for MaterialProxy {
    fn name(&self) -> &str {
        "MaterialProxy"
    }

    fn is_dirty(&self) -> bool {
        self.materials.is_dirty()
    }

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        let _span = tracy_client::span!("MaterialProxy::upload_dirty_data");
        self.materials.upload(ctx);
    }
}
