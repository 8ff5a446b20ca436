//! Host 与 compute kernel 之间共享的数据布局
//!
//! 所有结构体均为 `#[repr(C)]` 且实现 `bytemuck::Pod`，可以直接按字节写入 device buffer。

pub mod prismsl;
