pub mod frame_buffers;
