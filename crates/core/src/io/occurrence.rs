//! Occurrence records from delimited text

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::OccurrenceSet;
use geo_types::Point;
use std::path::Path;
use tracing::warn;

const LON_COLUMNS: [&str; 4] = ["lon", "longitude", "x", "decimallongitude"];
const LAT_COLUMNS: [&str; 4] = ["lat", "latitude", "y", "decimallatitude"];

/// Occurrences loaded from a file plus bookkeeping on rejected rows
#[derive(Debug, Clone)]
pub struct OccurrenceLoad {
    /// Usable occurrence points
    pub occurrences: OccurrenceSet,
    /// Rows skipped because a coordinate was missing or not numeric
    pub skipped: usize,
}

/// Read occurrence points from a CSV file with a header row.
///
/// Coordinates are interpreted in `crs` (WGS84 when `None`).
pub fn read_occurrences<P: AsRef<Path>>(path: P, crs: Option<CRS>) -> Result<OccurrenceLoad> {
    let path = path.as_ref();
    let delimiter = if path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("tsv"))
    {
        b'\t'
    } else {
        b','
    };
    let file = std::fs::File::open(path)?;
    read_occurrences_from_reader(file, delimiter, crs)
}

/// Read occurrence points from any reader
pub fn read_occurrences_from_reader<R: std::io::Read>(
    reader: R,
    delimiter: u8,
    crs: Option<CRS>,
) -> Result<OccurrenceLoad> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |candidates: &[&str]| {
        headers
            .iter()
            .position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
    };
    let (lon_idx, lat_idx) = match (find(&LON_COLUMNS), find(&LAT_COLUMNS)) {
        (Some(lon), Some(lat)) => (lon, lat),
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "occurrence file needs longitude ({}) and latitude ({}) columns",
                LON_COLUMNS.join("/"),
                LAT_COLUMNS.join("/")
            )))
        }
    };

    let mut points = Vec::new();
    let mut skipped = 0;
    for record in rdr.records() {
        let record = record?;
        let coord = |idx: usize| {
            record
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        match (coord(lon_idx), coord(lat_idx)) {
            (Some(x), Some(y)) => points.push(Point::new(x, y)),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} occurrence rows with missing or invalid coordinates", skipped);
    }
    if points.is_empty() {
        return Err(Error::Other("no usable occurrence records".into()));
    }

    Ok(OccurrenceLoad {
        occurrences: OccurrenceSet::new(points, Some(crs.unwrap_or_else(CRS::wgs84))),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbif_style_columns() {
        let text = "species,decimalLongitude,decimalLatitude\n\
                    puma,-70.5,-33.4\n\
                    puma,,-33.0\n\
                    puma,-71.2,abc\n\
                    puma,-72.0,-35.1\n";
        let load = read_occurrences_from_reader(text.as_bytes(), b',', None).unwrap();
        assert_eq!(load.occurrences.len(), 2);
        assert_eq!(load.skipped, 2);
        assert_eq!(load.occurrences.points()[1].x(), -72.0);
        assert_eq!(load.occurrences.crs().and_then(|c| c.epsg()), Some(4326));
    }

    #[test]
    fn test_short_column_names() {
        let text = "LAT\tLON\n-33.0\t-70.0\n";
        let load = read_occurrences_from_reader(text.as_bytes(), b'\t', None).unwrap();
        assert_eq!(load.occurrences.points()[0].x(), -70.0);
        assert_eq!(load.occurrences.points()[0].y(), -33.0);
    }

    #[test]
    fn test_missing_columns_and_empty_rows() {
        let no_cols = "a,b\n1,2\n";
        assert!(read_occurrences_from_reader(no_cols.as_bytes(), b',', None).is_err());

        let all_bad = "lon,lat\n,\nx,y\n";
        assert!(read_occurrences_from_reader(all_bad.as_bytes(), b',', None).is_err());
    }
}
