//! Configuration loading.

mod raster_config;

pub use raster_config::{
    ApplicationConfig, RasterConfig, RasterSettings, ReadoutOverhead, DEFAULT_CONFIG_PATH,
};
