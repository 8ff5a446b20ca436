pub mod image;
pub mod resource;
pub mod structured_buffer;
