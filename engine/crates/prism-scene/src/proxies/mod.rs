pub mod camera_proxy;
pub mod light_proxy;
pub mod material_proxy;
pub mod scene_proxy;
pub mod shape_proxy;
pub mod static_mesh_proxy;
pub mod transform_proxy;
