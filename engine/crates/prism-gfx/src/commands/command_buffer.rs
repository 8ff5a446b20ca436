use glam::{UVec2, UVec3, Vec3};
use rayon::prelude::*;

use crate::raytracing::acceleration::{GfxAccelerationStructure, GfxBlas, GfxBlasHandle};
use crate::resources::structured_buffer::GfxStructuredBuffer;

/// 命令流中记录下来的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxCommand {
    UpdateBuffer { buffer: String, offset: usize, count: usize },
    CopyBuffer { src: String, dst: String, count: usize },
    BuildBlas { name: String, triangle_count: usize },
    BuildTlas { name: String, instance_count: u32 },
    Dispatch { label: String, work_items: usize },
    Barrier { label: String },
}

/// 有序命令流
///
/// 每条命令在提交时立即执行，执行顺序即提交顺序；
/// dispatch 内部使用 rayon 数据并行。同时记录命令日志，便于检查写入次数与顺序。
pub struct GfxCommandBuffer {
    commands: Vec<GfxCommand>,
    recording: bool,
    /// 累计的 buffer 写入次数（update + copy）
    write_count: u64,

    name: String,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            commands: Vec::new(),
            recording: false,
            write_count: 0,
            name: name.as_ref().to_string(),
        }
    }
}
// getter
impl GfxCommandBuffer {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// 上一次 `begin` 之后记录的命令
    #[inline]
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    #[inline]
    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}
// begin & end
impl GfxCommandBuffer {
    pub fn begin(&mut self) {
        debug_assert!(!self.recording, "{}: begin while recording", self.name);
        self.commands.clear();
        self.recording = true;
    }

    pub fn end(&mut self) {
        debug_assert!(self.recording, "{}: end without begin", self.name);
        self.recording = false;
    }

    fn record(&mut self, command: GfxCommand) {
        debug_assert!(self.recording, "{}: command {command:?} recorded outside begin/end", self.name);
        self.commands.push(command);
    }
}
// transfer
impl GfxCommandBuffer {
    pub fn cmd_update_buffer<T: bytemuck::Pod>(&mut self, dst: &mut GfxStructuredBuffer<T>, offset: usize, data: &[T]) {
        dst.write(offset, data);
        self.write_count += 1;
        self.record(GfxCommand::UpdateBuffer {
            buffer: dst.name().to_string(),
            offset,
            count: data.len(),
        });
    }

    pub fn cmd_copy_buffer<T: bytemuck::Pod>(
        &mut self,
        src: &GfxStructuredBuffer<T>,
        dst: &mut GfxStructuredBuffer<T>,
        count: usize,
    ) {
        dst.write(0, &src.as_slice()[..count]);
        self.write_count += 1;
        self.record(GfxCommand::CopyBuffer {
            src: src.name().to_string(),
            dst: dst.name().to_string(),
            count,
        });
    }

    pub fn pipeline_barrier(&mut self, label: impl AsRef<str>) {
        self.record(GfxCommand::Barrier {
            label: label.as_ref().to_string(),
        });
    }
}
// acceleration structure
impl GfxCommandBuffer {
    pub fn cmd_build_blas(
        &mut self,
        acc: &mut GfxAccelerationStructure,
        positions: Vec<Vec3>,
        triangles: Vec<UVec3>,
        name: impl AsRef<str>,
    ) -> GfxBlasHandle {
        let blas = GfxBlas::new(positions, triangles, name);
        self.record(GfxCommand::BuildBlas {
            name: blas.name().to_string(),
            triangle_count: blas.triangle_count(),
        });
        acc.add_blas(blas)
    }

    /// TLAS 不 dirty 时不会产生任何命令
    pub fn cmd_build_tlas(&mut self, acc: &mut GfxAccelerationStructure) {
        if acc.build_tlas() {
            self.record(GfxCommand::BuildTlas {
                name: acc.name().to_string(),
                instance_count: acc.instance_count(),
            });
        }
    }
}
// dispatch
impl GfxCommandBuffer {
    /// 1D dispatch，每个 work item 调用一次 kernel
    pub fn dispatch<F>(&mut self, label: impl AsRef<str>, work_items: usize, kernel: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        self.record(GfxCommand::Dispatch {
            label: label.as_ref().to_string(),
            work_items,
        });
        (0..work_items).into_par_iter().for_each(kernel);
    }

    /// 1D dispatch，收集每个 work item 的输出
    pub fn dispatch_map<R, F>(&mut self, label: impl AsRef<str>, work_items: usize, kernel: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        self.record(GfxCommand::Dispatch {
            label: label.as_ref().to_string(),
            work_items,
        });
        (0..work_items).into_par_iter().map(kernel).collect()
    }

    /// 2D dispatch，按行优先返回每个像素的输出
    pub fn dispatch_2d<R, F>(&mut self, label: impl AsRef<str>, extent: UVec2, kernel: F) -> Vec<R>
    where
        R: Send,
        F: Fn(UVec2) -> R + Sync + Send,
    {
        let width = extent.x as usize;
        self.dispatch_map(label, (extent.x * extent.y) as usize, |idx| {
            kernel(UVec2::new((idx % width) as u32, (idx / width) as u32))
        })
    }
}
