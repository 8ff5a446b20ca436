pub mod bindless_manager;
pub mod config;
pub mod frame_counter;
pub mod gfx_resource_manager;
pub mod pipeline_settings;
