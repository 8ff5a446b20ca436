pub mod light;
pub mod material;
pub mod sampling;
