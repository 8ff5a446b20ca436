pub mod deferred_pass;
pub mod denoise_pass;
pub mod path_tracing_pass;
pub mod raster_pass;
pub mod sdr_pass;
pub mod shading;
