use glam::{UVec3, Vec3};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use prism_gfx::raytracing::acceleration::GfxBlasHandle;
use prism_gfx::resources::structured_buffer::GfxStructuredBuffer;
use prism_render_interface::bindless_manager::BindlessBufferHandle;
use prism_shader_binding::prismsl;

use crate::components::mesh::MeshData;
use crate::proxies::scene_proxy::{ProxyBuffer, SceneProxy, UploadContext};

/// 可见 instance 在加速结构中的 mask
pub const INSTANCE_MASK_VISIBLE: u8 = 0xff;

/// 录制时立即入队，上传时按入队顺序回放
#[derive(Debug)]
pub enum MeshCommand {
    AddMesh { mesh_id: u32, data: MeshData },
    AddInstance { instance_id: u32, mesh_id: u32 },
    /// instance 改为引用另一个 mesh
    UpdateInstance { instance_id: u32, old_mesh_id: u32, mesh_id: u32 },
    RemoveInstance { instance_id: u32, mesh_id: u32 },
    SetVisibility { instance_id: u32, visible: bool },
    UpdateMeshGeometry { mesh_id: u32, data: MeshData },
    RemoveMesh { mesh_id: u32 },
    SetMaterial { mesh_id: u32, material_id: u32 },
}

/// 一个 mesh 在 GPU 侧的状态，只在回放命令时修改
#[derive(Default)]
struct MeshGpuState {
    blas: Option<GfxBlasHandle>,
    /// 引用该 mesh 的 instance
    instances: IndexSet<u32>,
}

/// 静态网格
///
/// 管理几何 buffer（通过 bindless 表访问）、每个 mesh 的 BLAS，以及 mesh 与 instance 的绑定。
/// 所有修改都先进入命令队列，id 在录制时分配，GPU 侧的修改只在 `upload_dirty_data` 中发生。
pub struct StaticMeshProxy {
    meshes: ProxyBuffer<prismsl::Mesh>,
    gpu_states: Vec<MeshGpuState>,
    /// 录制时的状态：mesh 是否还存在
    alive: Vec<bool>,
    /// 录制时的状态：instance -> mesh
    instance_meshes: IndexMap<u32, u32>,

    queue: Vec<MeshCommand>,
    /// 因为 mesh 被删除而隐藏的 instance，由 `GpuScene` 同步到 shape
    hidden_instances: Vec<u32>,
}
// new & init
impl StaticMeshProxy {
    pub fn new() -> Self {
        Self {
            meshes: ProxyBuffer::new("mesh-buffer"),
            gpu_states: Vec::new(),
            alive: Vec::new(),
            instance_meshes: IndexMap::new(),
            queue: Vec::new(),
            hidden_instances: Vec::new(),
        }
    }
}
impl Default for StaticMeshProxy {
    fn default() -> Self {
        Self::new()
    }
}
// getter
impl StaticMeshProxy {
    #[inline]
    pub fn buffer(&self) -> &ProxyBuffer<prismsl::Mesh> {
        &self.meshes
    }

    #[inline]
    pub fn is_alive(&self, mesh_id: u32) -> bool {
        self.alive.get(mesh_id as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn instance_mesh(&self, instance_id: u32) -> Option<u32> {
        self.instance_meshes.get(&instance_id).copied()
    }

    #[inline]
    pub fn pending_commands(&self) -> &[MeshCommand] {
        &self.queue
    }

    /// 已回放到 GPU 的 BLAS
    #[inline]
    pub fn blas(&self, mesh_id: u32) -> Option<GfxBlasHandle> {
        self.gpu_states.get(mesh_id as usize)?.blas
    }

    /// 已回放到 GPU 的、引用该 mesh 的 instance
    pub fn mesh_instances(&self, mesh_id: u32) -> Vec<u32> {
        self.gpu_states
            .get(mesh_id as usize)
            .map(|s| s.instances.iter().copied().collect_vec())
            .unwrap_or_default()
    }

    /// 取走上一次上传中被隐藏的 instance
    pub fn drain_hidden_instances(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.hidden_instances)
    }
}
// record
impl StaticMeshProxy {
    /// 几何数据无效时返回 `INVALID_ID`
    pub fn add_mesh(&mut self, data: MeshData) -> u32 {
        if let Err(e) = data.validate() {
            log::error!("add mesh rejected: {e}");
            return prismsl::INVALID_ID;
        }
        let mesh_id = self.meshes.push(prismsl::Mesh::null());
        self.gpu_states.push(MeshGpuState::default());
        self.alive.push(true);
        self.queue.push(MeshCommand::AddMesh { mesh_id, data });
        mesh_id
    }

    pub fn update_mesh_geometry(&mut self, mesh_id: u32, data: MeshData) -> bool {
        if !self.check_alive(mesh_id, "update mesh geometry") {
            return false;
        }
        if let Err(e) = data.validate() {
            log::error!("update geometry of mesh {mesh_id} rejected: {e}");
            return false;
        }
        self.queue.push(MeshCommand::UpdateMeshGeometry { mesh_id, data });
        true
    }

    /// 返回被解除绑定的 instance
    pub fn remove_mesh(&mut self, mesh_id: u32) -> Vec<u32> {
        if !self.check_alive(mesh_id, "remove mesh") {
            return Vec::new();
        }
        self.alive[mesh_id as usize] = false;
        let instances = self.instance_meshes.iter().filter(|(_, m)| **m == mesh_id).map(|(i, _)| *i).collect_vec();
        self.instance_meshes.retain(|_, m| *m != mesh_id);
        self.queue.push(MeshCommand::RemoveMesh { mesh_id });
        instances
    }

    pub fn set_mesh_material(&mut self, mesh_id: u32, material_id: u32) -> bool {
        if !self.check_alive(mesh_id, "set mesh material") {
            return false;
        }
        self.queue.push(MeshCommand::SetMaterial { mesh_id, material_id });
        true
    }

    /// instance 已经引用了其他 mesh 时转为 `UpdateInstance`
    pub fn add_instance(&mut self, instance_id: u32, mesh_id: u32) -> bool {
        if !self.check_alive(mesh_id, "bind instance") {
            return false;
        }
        match self.instance_meshes.insert(instance_id, mesh_id) {
            None => self.queue.push(MeshCommand::AddInstance { instance_id, mesh_id }),
            Some(old_mesh_id) => self.queue.push(MeshCommand::UpdateInstance {
                instance_id,
                old_mesh_id,
                mesh_id,
            }),
        }
        true
    }

    pub fn remove_instance(&mut self, instance_id: u32) {
        match self.instance_meshes.shift_remove(&instance_id) {
            Some(mesh_id) => self.queue.push(MeshCommand::RemoveInstance { instance_id, mesh_id }),
            None => self.queue.push(MeshCommand::SetVisibility {
                instance_id,
                visible: false,
            }),
        }
    }

    pub fn set_visibility(&mut self, instance_id: u32, visible: bool) {
        self.queue.push(MeshCommand::SetVisibility { instance_id, visible });
    }

    fn check_alive(&self, mesh_id: u32, op: &str) -> bool {
        if !self.is_alive(mesh_id) {
            log::error!("{op}: mesh {mesh_id} does not exist");
            return false;
        }
        true
    }
}
// replay
impl StaticMeshProxy {
    fn apply(&mut self, command: MeshCommand, ctx: &mut UploadContext) {
        match command {
            MeshCommand::AddMesh { mesh_id, data } => {
                let (geometry, blas) = helper::create_geometry(mesh_id, &data, ctx);
                let handles = helper::GeometryHandles {
                    vertex: ctx.bindless.vertex_buffers.register(geometry.vertices),
                    index: ctx.bindless.index_buffers.register(geometry.indices),
                    corner_normal: ctx.bindless.corner_normal_buffers.register(geometry.corner_normals),
                };
                self.gpu_states[mesh_id as usize].blas = Some(blas);
                self.meshes.update(mesh_id, |record| handles.write_record(record, data.triangle_count()));
            }
            MeshCommand::UpdateMeshGeometry { mesh_id, data } => {
                let Some(record) = self.meshes.get(mesh_id).copied() else {
                    return;
                };
                let handles = helper::GeometryHandles::from_record(&record);
                let (geometry, blas) = helper::create_geometry(mesh_id, &data, ctx);

                // slot 不变，kernel 中的 mesh record 只需要更新三角形数量
                if let Some(old) = ctx.bindless.vertex_buffers.rebind(handles.vertex, geometry.vertices) {
                    ctx.retire(old);
                }
                if let Some(old) = ctx.bindless.index_buffers.rebind(handles.index, geometry.indices) {
                    ctx.retire(old);
                }
                if let Some(old) = ctx.bindless.corner_normal_buffers.rebind(handles.corner_normal, geometry.corner_normals) {
                    ctx.retire(old);
                }

                let state = &mut self.gpu_states[mesh_id as usize];
                for instance_id in &state.instances {
                    ctx.acceleration.set_instance_blas(*instance_id, Some(blas));
                }
                if let Some(old_blas) = state.blas.replace(blas)
                    && let Some(old_blas) = ctx.acceleration.remove_blas(old_blas)
                {
                    ctx.retire(old_blas);
                }
                self.meshes.update(mesh_id, |record| handles.write_record(record, data.triangle_count()));
            }
            MeshCommand::RemoveMesh { mesh_id } => {
                // 先隐藏所有 instance，再释放资源
                let state = std::mem::take(&mut self.gpu_states[mesh_id as usize]);
                for instance_id in state.instances {
                    ctx.acceleration.set_instance_mask(instance_id, 0);
                    ctx.acceleration.set_instance_blas(instance_id, None);
                    self.hidden_instances.push(instance_id);
                }

                if let Some(record) = self.meshes.get(mesh_id).copied() {
                    let handles = helper::GeometryHandles::from_record(&record);
                    if let Some(buffer) = ctx.bindless.vertex_buffers.unregister(handles.vertex) {
                        ctx.retire(buffer);
                    }
                    if let Some(buffer) = ctx.bindless.index_buffers.unregister(handles.index) {
                        ctx.retire(buffer);
                    }
                    if let Some(buffer) = ctx.bindless.corner_normal_buffers.unregister(handles.corner_normal) {
                        ctx.retire(buffer);
                    }
                }
                if let Some(blas) = state.blas.and_then(|handle| ctx.acceleration.remove_blas(handle)) {
                    ctx.retire(blas);
                }
                self.meshes.set(mesh_id, prismsl::Mesh::null());
            }
            MeshCommand::SetMaterial { mesh_id, material_id } => {
                self.meshes.update(mesh_id, |record| record.material_id = material_id);
            }
            MeshCommand::AddInstance { instance_id, mesh_id } => {
                self.bind_instance(instance_id, mesh_id, ctx);
            }
            MeshCommand::UpdateInstance {
                instance_id,
                old_mesh_id,
                mesh_id,
            } => {
                if let Some(state) = self.gpu_states.get_mut(old_mesh_id as usize) {
                    state.instances.shift_remove(&instance_id);
                }
                self.bind_instance(instance_id, mesh_id, ctx);
            }
            MeshCommand::RemoveInstance { instance_id, mesh_id } => {
                if let Some(state) = self.gpu_states.get_mut(mesh_id as usize) {
                    state.instances.shift_remove(&instance_id);
                }
                ctx.acceleration.set_instance_mask(instance_id, 0);
                ctx.acceleration.set_instance_blas(instance_id, None);
            }
            MeshCommand::SetVisibility { instance_id, visible } => {
                self.hidden_instances.retain(|id| *id != instance_id);
                ctx.acceleration.set_instance_mask(instance_id, if visible { INSTANCE_MASK_VISIBLE } else { 0 });
            }
        }
    }

    /// 同一帧内先删除 mesh 再重新绑定的 instance 不再需要隐藏
    fn bind_instance(&mut self, instance_id: u32, mesh_id: u32, ctx: &mut UploadContext) {
        self.hidden_instances.retain(|id| *id != instance_id);
        let state = &mut self.gpu_states[mesh_id as usize];
        state.instances.insert(instance_id);
        ctx.acceleration.set_instance_blas(instance_id, state.blas);
        ctx.acceleration.set_instance_mask(instance_id, INSTANCE_MASK_VISIBLE);
    }
}
impl SceneProxy for StaticMeshProxy {
    fn name(&self) -> &str {
        "StaticMeshProxy"
    }

    fn is_dirty(&self) -> bool {
        !self.queue.is_empty() || self.meshes.is_dirty()
    }

    /// # Phase: Upload
    ///
    /// 按录制顺序回放命令，之后上传 mesh record。
    /// 必须先于 shape / transform 的上传，保证 instance 绑定时 BLAS 已经存在。
    fn upload_dirty_data(&mut self, ctx: &mut UploadContext) {
        if !self.is_dirty() {
            return;
        }
        let _span = tracy_client::span!("StaticMeshProxy::upload_dirty_data");

        let queue = std::mem::take(&mut self.queue);
        log::trace!("StaticMeshProxy: replay {} commands", queue.len());
        for command in queue {
            self.apply(command, ctx);
        }
        self.meshes.upload(ctx);
    }
}

mod helper {
    use super::*;

    pub struct GeometryBuffers {
        pub vertices: GfxStructuredBuffer<prismsl::Vertex>,
        pub indices: GfxStructuredBuffer<UVec3>,
        pub corner_normals: GfxStructuredBuffer<Vec3>,
    }

    pub struct GeometryHandles {
        pub vertex: BindlessBufferHandle,
        pub index: BindlessBufferHandle,
        pub corner_normal: BindlessBufferHandle,
    }
    impl GeometryHandles {
        pub fn from_record(record: &prismsl::Mesh) -> Self {
            Self {
                vertex: record.vertex_buffer.into(),
                index: record.index_buffer.into(),
                corner_normal: record.corner_normal_buffer.into(),
            }
        }

        pub fn write_record(&self, record: &mut prismsl::Mesh, triangle_count: usize) {
            record.vertex_buffer = self.vertex.0;
            record.index_buffer = self.index.0;
            record.corner_normal_buffer = self.corner_normal.0;
            record.triangle_count = triangle_count as u32;
        }
    }

    fn upload_slice<T: bytemuck::Pod>(data: &[T], name: String, ctx: &mut UploadContext) -> GfxStructuredBuffer<T> {
        let mut buffer = GfxStructuredBuffer::new_ssbo(data.len(), name);
        ctx.cmd.cmd_update_buffer(&mut buffer, 0, data);
        buffer
    }

    /// 上传几何 buffer 并构建 BLAS；buffer 名字带上帧号，方便区分替换前后的资源
    pub fn create_geometry(mesh_id: u32, data: &MeshData, ctx: &mut UploadContext) -> (GeometryBuffers, GfxBlasHandle) {
        let frame_id = ctx.frame_id;
        let buffers = GeometryBuffers {
            vertices: upload_slice(&data.to_vertices(), format!("mesh-{mesh_id}-vertex-F{frame_id}"), ctx),
            indices: upload_slice(&data.triangles, format!("mesh-{mesh_id}-index-F{frame_id}"), ctx),
            corner_normals: upload_slice(
                &data.corner_normals_or_flat(),
                format!("mesh-{mesh_id}-corner-normal-F{frame_id}"),
                ctx,
            ),
        };
        let blas = ctx.cmd.cmd_build_blas(
            ctx.acceleration,
            data.positions.clone(),
            data.triangles.clone(),
            format!("mesh-{mesh_id}-blas-F{frame_id}"),
        );
        (buffers, blas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxies::scene_proxy::test_utils::UploadEnv;
    use crate::shapes::quad::Quad;

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mut proxy = StaticMeshProxy::new();
        assert_eq!(proxy.add_mesh(MeshData::default()), prismsl::INVALID_ID);
        assert!(!proxy.is_dirty());
        assert!(proxy.add_mesh(Quad::mesh_data()) != prismsl::INVALID_ID);
    }

    #[test]
    fn test_instance_bound_in_same_frame() {
        let mut env = UploadEnv::new();
        let mut proxy = StaticMeshProxy::new();
        let instance = env.acceleration.push_instance();

        // 同一帧中先添加 mesh 再绑定 instance
        let mesh = proxy.add_mesh(Quad::mesh_data());
        assert!(proxy.add_instance(instance, mesh));
        assert!(proxy.set_mesh_material(mesh, 7));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));

        let blas = proxy.blas(mesh).unwrap();
        let as_instance = env.acceleration.instance(instance).unwrap();
        assert_eq!(as_instance.blas, Some(blas));
        assert!(as_instance.is_active());

        let record = proxy.buffer().device_record(mesh).unwrap();
        assert_eq!(record.material_id, 7);
        assert_eq!(record.triangle_count, 2);
        assert_eq!(env.bindless.vertex_buffers.get(record.vertex_buffer).unwrap().len(), 4);

        assert_eq!(env.upload(|ctx| proxy.upload_dirty_data(ctx)), 0);
    }

    #[test]
    fn test_geometry_update_keeps_bindless_slots() {
        let mut env = UploadEnv::new();
        let mut proxy = StaticMeshProxy::new();
        let instance = env.acceleration.push_instance();
        let mesh = proxy.add_mesh(Quad::mesh_data());
        proxy.add_instance(instance, mesh);
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        let before = *proxy.buffer().device_record(mesh).unwrap();
        let old_blas = proxy.blas(mesh).unwrap();

        env.frame_id = 2;
        let triangle = MeshData::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![UVec3::new(0, 1, 2)]);
        assert!(proxy.update_mesh_geometry(mesh, triangle));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));

        let after = *proxy.buffer().device_record(mesh).unwrap();
        assert_eq!(before.vertex_buffer, after.vertex_buffer);
        assert_eq!(before.index_buffer, after.index_buffer);
        assert_eq!(before.corner_normal_buffer, after.corner_normal_buffer);
        assert_eq!(after.triangle_count, 1);
        assert_eq!(env.bindless.vertex_buffers.get(after.vertex_buffer).unwrap().len(), 3);

        let new_blas = proxy.blas(mesh).unwrap();
        assert_ne!(old_blas, new_blas);
        assert_eq!(env.acceleration.instance(instance).unwrap().blas, Some(new_blas));
        assert!(env.acceleration.blas(old_blas).is_none());
        assert!(env.resource_manager.is_pending("mesh-0-vertex-F1"));
        assert!(env.resource_manager.is_pending("mesh-0-blas-F1"));
    }

    #[test]
    fn test_remove_mesh_hides_instances() {
        let mut env = UploadEnv::new();
        let mut proxy = StaticMeshProxy::new();
        let a = env.acceleration.push_instance();
        let b = env.acceleration.push_instance();
        let mesh = proxy.add_mesh(Quad::mesh_data());
        proxy.add_instance(a, mesh);
        proxy.add_instance(b, mesh);
        env.upload(|ctx| proxy.upload_dirty_data(ctx));
        let blas = proxy.blas(mesh).unwrap();

        assert_eq!(proxy.remove_mesh(mesh), vec![a, b]);
        assert!(!proxy.add_instance(a, mesh));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));

        assert_eq!(proxy.drain_hidden_instances(), vec![a, b]);
        for instance in [a, b] {
            assert!(!env.acceleration.instance(instance).unwrap().is_active());
        }
        assert_eq!(env.acceleration.blas_reference_count(blas), 0);
        assert!(env.acceleration.blas(blas).is_none());
        assert!(proxy.buffer().device_record(mesh).unwrap().is_null());
        assert!(env.bindless.vertex_buffers.is_empty());
        // 资源延迟销毁，还没有真正释放
        assert_eq!(env.resource_manager.destroyed_count(), 0);
        assert_eq!(env.resource_manager.pending_count(), 4);
    }

    #[test]
    fn test_commands_replay_in_order() {
        let mut env = UploadEnv::new();
        let mut proxy = StaticMeshProxy::new();
        let instance = env.acceleration.push_instance();
        let a = proxy.add_mesh(Quad::mesh_data());
        let b = proxy.add_mesh(Quad::mesh_data());
        proxy.add_instance(instance, a);
        proxy.set_visibility(instance, false);
        proxy.add_instance(instance, b);
        assert!(matches!(proxy.pending_commands()[4], MeshCommand::UpdateInstance { old_mesh_id, .. } if old_mesh_id == a));
        env.upload(|ctx| proxy.upload_dirty_data(ctx));

        // 最后一次绑定生效，并重新可见
        let as_instance = env.acceleration.instance(instance).unwrap();
        assert_eq!(as_instance.blas, proxy.blas(b));
        assert!(as_instance.is_active());
        assert!(proxy.mesh_instances(a).is_empty());
        assert_eq!(proxy.mesh_instances(b), vec![instance]);
    }
}
