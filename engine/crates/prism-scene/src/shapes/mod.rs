pub mod cube;
pub mod quad;
pub mod triangle;
