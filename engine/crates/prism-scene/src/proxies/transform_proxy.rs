use glam::Mat4;
use indexmap::IndexMap;
use prism_shader_binding::prismsl;

use crate::components::transform::TransformComponent;
use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// 每个实体的变换矩阵
///
/// transform 与 instance 一一对应；上传时 dirty 的 transform 除了写入 buffer，
/// 还会直接更新加速结构中绑定的 instance 的矩阵。
pub struct TransformProxy {
    transforms: ProxyBuffer<prismsl::Transform>,

    /// transform id -> instance id
    bound_instances: IndexMap<u32, u32>,
}
// new & init
impl TransformProxy {
    pub fn new() -> Self {
        Self {
            transforms: ProxyBuffer::new("transform-buffer"),
            bound_instances: IndexMap::new(),
        }
    }
}
impl Default for TransformProxy {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl TransformProxy {
    #[inline]
    pub fn transform(&self, transform_id: u32) -> Option<&prismsl::Transform> {
        self.transforms.get(transform_id)
    }

    /// 当前帧的矩阵
    #[inline]
    pub fn matrix(&self, transform_id: u32) -> Option<Mat4> {
        self.transforms.get(transform_id).map(|t| t.matrix)
    }

    #[inline]
    pub fn bound_instance(&self, transform_id: u32) -> Option<u32> {
        self.bound_instances.get(&transform_id).copied()
    }

    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::Transform> {
        &self.transforms
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
// update
impl TransformProxy {
    /// 新的 transform 没有历史，上一帧矩阵等于当前矩阵
    pub fn add_transform(&mut self, component: &TransformComponent) -> u32 {
        let matrix = component.matrix();
        self.transforms.push(prismsl::Transform::from_matrix(matrix, matrix))
    }

    /// 保留上一帧矩阵，用于计算 motion vector
    pub fn update_transform(&mut self, transform_id: u32, component: &TransformComponent) {
        let matrix = component.matrix();
        self.transforms.update(transform_id, |record| {
            *record = prismsl::Transform::from_matrix(matrix, record.prev_matrix);
        });
    }

    /// 绑定之后的上传会同步 instance 在加速结构中的矩阵
    pub fn bind_transform(&mut self, instance_id: u32, transform_id: u32) -> bool {
        if !self.transforms.contains(transform_id) {
            log::error!("bind transform {transform_id} to instance {instance_id} before it is added");
            return false;
        }
        if let Some(other) = self.bound_instances.get(&transform_id)
            && *other != instance_id
        {
            log::error!("transform {transform_id} is already bound to instance {other}, can not bind to {instance_id}");
            return false;
        }
        if let Some((&other_transform, _)) = self.bound_instances.iter().find(|(t, i)| **i == instance_id && **t != transform_id) {
            log::warn!("instance {instance_id} rebinds transform {other_transform} -> {transform_id}");
            self.bound_instances.shift_remove(&other_transform);
        }
        self.bound_instances.insert(transform_id, instance_id);
        self.transforms.mark_dirty(transform_id);
        true
    }

    /// # Phase: After Render
    ///
    /// 上一帧矩阵追上当前矩阵；移动过的 transform 在下一次上传时写回，静止后 motion 归零。
    pub fn advance_frame(&mut self) {
        let moved = self
            .transforms
            .records()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_moving())
            .map(|(id, _)| id as u32)
            .collect::<Vec<_>>();
        for id in moved {
            self.transforms.update(id, |t| t.prev_matrix = t.matrix);
        }
    }
}
impl SceneProxy for TransformProxy {
    fn name(&self) -> &str {
        "TransformProxy"
    }

    fn is_dirty(&self) -> bool {
        self.transforms.is_dirty()
    }

    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        if !self.transforms.is_dirty() {
            return;
        }
        let _span = tracy_client::span!("TransformProxy::upload_dirty_data");

        for transform_id in self.transforms.dirty_ids() {
            let (Some(instance_id), Some(record)) =
                (self.bound_instances.get(&transform_id), self.transforms.get(transform_id))
            else {
                continue;
            };
            ctx.acceleration.set_instance_transform(*instance_id, record.matrix);
        }
        self.transforms.upload(ctx);
    }
}
