//! I/O for predictor rasters, boundaries and occurrence records

mod boundary;
mod native;
mod occurrence;
mod stack;

pub use boundary::{parse_boundary, read_boundary};
pub use native::{
    read_geotiff, read_geotiff_bands, read_geotiff_from_buffer, write_geotiff,
    write_geotiff_bands, write_geotiff_to_buffer, GeoTiffOptions, SamplePrecision,
};
pub use occurrence::{read_occurrences, read_occurrences_from_reader, OccurrenceLoad};
pub use stack::{read_stack_dir, read_stack_file, write_stack_dir, write_stack_file};
