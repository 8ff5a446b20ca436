use prism_shader_binding::prismsl;

use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// instance -> {mesh id, light id, transform id, 可见性}
///
/// instance id 与 shape id 相同。删除 instance 只会关闭可见性，slot 不会被回收。
pub struct ShapeProxy {
    shapes: ProxyBuffer<prismsl::Shape>,
}
// new & init
impl ShapeProxy {
    pub fn new() -> Self {
        Self {
            shapes: ProxyBuffer::new_bulk("shape-buffer"),
        }
    }
}
impl Default for ShapeProxy {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl ShapeProxy {
    #[inline]
    pub fn shape(&self, instance_id: u32) -> Option<&prismsl::Shape> {
        self.shapes.get(instance_id)
    }

    #[inline]
    pub fn is_mesh(&self, instance_id: u32) -> bool {
        self.shape(instance_id).is_some_and(|s| s.is_mesh())
    }

    #[inline]
    pub fn is_light(&self, instance_id: u32) -> bool {
        self.shape(instance_id).is_some_and(|s| s.is_light())
    }

    #[inline]
    pub fn is_visible(&self, instance_id: u32) -> bool {
        self.shape(instance_id).is_some_and(|s| s.visible != 0)
    }

    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::Shape> {
        &self.shapes
    }
}
// update
impl ShapeProxy {
    /// 新的 instance 在配置之前不可见
    pub fn register_instance(&mut self) -> u32 {
        self.shapes.push(prismsl::Shape::unconfigured())
    }

    /// 绑定 mesh 之后 instance 变为可见
    pub fn set_mesh_id(&mut self, instance_id: u32, mesh_id: u32) -> bool {
        self.shapes.update(instance_id, |s| {
            s.mesh_id = mesh_id;
            s.visible = 1;
        })
    }

    pub fn set_light_id(&mut self, instance_id: u32, light_id: u32) -> bool {
        self.shapes.update(instance_id, |s| s.light_id = light_id)
    }

    pub fn set_transform_id(&mut self, instance_id: u32, transform_id: u32) -> bool {
        self.shapes.update(instance_id, |s| s.transform_id = transform_id)
    }

    pub fn set_visibility(&mut self, instance_id: u32, visible: bool) -> bool {
        self.shapes.update(instance_id, |s| s.visible = visible as u32)
    }
}
impl SceneProxy for ShapeProxy {
    fn name(&self) -> &str {
        "ShapeProxy"
    }

    fn is_dirty(&self) -> bool {
        self.shapes.is_dirty()
    }

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        let _span = tracy_client::span!("ShapeProxy::upload_dirty_data");
        self.shapes.upload(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxies::scene_proxy::test_utils::UploadEnv;

    #[test]
    fn test_shape_configuration() {
        let mut env = UploadEnv::new();
        let mut proxy = ShapeProxy::new();
        let a = proxy.register_instance();
        let b = proxy.register_instance();
        assert!(!proxy.is_visible(a));

        proxy.set_mesh_id(a, 3);
        proxy.set_light_id(b, 0);
        assert!(proxy.is_mesh(a) && !proxy.is_light(a));
        assert!(proxy.is_light(b) && !proxy.is_mesh(b));
        assert!(proxy.is_visible(a) && !proxy.is_visible(b));
        assert!(!proxy.set_visibility(9, true));

        // 多个 dirty 记录只产生一次整体写入
        assert_eq!(env.upload(|ctx| proxy.upload_dirty_data(ctx)), 1);
        assert_eq!(proxy.buffer().device_record(a).unwrap().mesh_id, 3);
        assert_eq!(env.upload(|ctx| proxy.upload_dirty_data(ctx)), 0);

        proxy.set_visibility(a, false);
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        assert_eq!(proxy.buffer().device_record(a).unwrap().visible, 0);
    }
}
