//! Raster stacks on disk: one multi-band file or a directory of single-band files

use crate::error::{Error, Result};
use crate::io::native::{read_geotiff_bands, write_geotiff, write_geotiff_bands, GeoTiffOptions};
use crate::raster::RasterStack;
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Other(format!("Invalid raster file name: {}", path.display())))
}

/// Read a multi-band GeoTIFF as a stack.
///
/// `names` labels the bands in file order; without it bands are named
/// `<stem>_<i>` (1-based). A count mismatch is an error.
pub fn read_stack_file<P: AsRef<Path>>(path: P, names: Option<&[String]>) -> Result<RasterStack> {
    let path = path.as_ref();
    let bands = read_geotiff_bands(path)?;

    let names: Vec<String> = match names {
        Some(names) => {
            if names.len() != bands.len() {
                return Err(Error::InvalidParameter {
                    name: "band names",
                    value: names.len().to_string(),
                    reason: format!("{} has {} bands", path.display(), bands.len()),
                });
            }
            names.to_vec()
        }
        None => {
            let stem = file_stem(path)?;
            if bands.len() == 1 {
                vec![stem]
            } else {
                (1..=bands.len()).map(|i| format!("{}_{}", stem, i)).collect()
            }
        }
    };

    debug!("Read {} bands from {}", bands.len(), path.display());
    RasterStack::new(names.into_iter().zip(bands).collect())
}

/// Read every `.tif`/`.tiff` file in a directory as one band each.
///
/// Band names are the file stems; files are ordered naturally so that
/// `bio_2` precedes `bio_10`. Multi-band files contribute `<stem>_<i>` bands.
pub fn read_stack_dir<P: AsRef<Path>>(dir: P) -> Result<RasterStack> {
    let dir = dir.as_ref();
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_tiff(p))
        .collect();

    if files.is_empty() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no GeoTIFF files in {}", dir.display()),
        )));
    }

    files.sort_by(|a, b| {
        let a = a.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let b = b.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        natord::compare(a, b)
    });

    let mut bands = Vec::new();
    for file in &files {
        let stem = file_stem(file)?;
        let rasters = read_geotiff_bands(file)?;
        let multi = rasters.len() > 1;
        for (i, raster) in rasters.into_iter().enumerate() {
            let name = if multi {
                format!("{}_{}", stem, i + 1)
            } else {
                stem.clone()
            };
            bands.push((name, raster));
        }
    }

    debug!("Read {} bands from {}", bands.len(), dir.display());
    RasterStack::new(bands)
}

/// Write each band to `<dir>/<name>.tif`, creating the directory if needed.
///
/// Returns the written paths in stack order.
pub fn write_stack_dir<P: AsRef<Path>>(
    stack: &RasterStack,
    dir: P,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    stack
        .iter()
        .map(|(name, band)| {
            let path = dir.join(format!("{}.tif", name));
            write_geotiff(band, &path, options.clone())?;
            Ok(path)
        })
        .collect()
}

/// Write a stack as one multi-page GeoTIFF, one page per band in stack order
pub fn write_stack_file<P: AsRef<Path>>(
    stack: &RasterStack,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()> {
    let bands: Vec<_> = stack.iter().map(|(_, band)| band).collect();
    write_geotiff_bands(&bands, path.as_ref(), options)?;
    debug!("Wrote {} bands to {}", bands.len(), path.as_ref().display());
    Ok(())
}
