//! # Habitat Core
//!
//! Core types and I/O for the habitat suitability pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `RasterStack`: Named, co-registered predictor bands
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `Boundary` and `OccurrenceSet`: clipping polygons and presence points
//! - I/O for GeoTIFF, GeoJSON and occurrence CSV files

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterStack};
pub use vector::{Boundary, OccurrenceSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, RasterStack};
    pub use crate::vector::{Boundary, OccurrenceSet};
}
