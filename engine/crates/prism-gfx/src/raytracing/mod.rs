pub mod acceleration;
pub mod bvh;
