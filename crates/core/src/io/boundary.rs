//! GeoJSON boundary reading

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::Boundary;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use std::path::Path;

/// Read a boundary polygon file.
///
/// Only GeoJSON (`.geojson`, `.json`) is supported. Any mix of Polygon and
/// MultiPolygon geometries, bare or wrapped in Feature/FeatureCollection,
/// is merged into one multipolygon. The CRS comes from the legacy `crs`
/// member and defaults to WGS84.
pub fn read_boundary<P: AsRef<Path>>(path: P) -> Result<Boundary> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext != "geojson" && ext != "json" {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!(
                "unsupported boundary format '{}' ({}); convert it to GeoJSON",
                ext,
                path.display()
            ),
        )));
    }

    let text = std::fs::read_to_string(path)?;
    parse_boundary(&text)
}

/// Parse a GeoJSON document into a boundary
pub fn parse_boundary(text: &str) -> Result<Boundary> {
    let doc: Value = serde_json::from_str(text)?;

    let crs = doc
        .get("crs")
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .and_then(CRS::parse)
        .unwrap_or_else(CRS::wgs84);

    let mut polygons = Vec::new();
    collect_polygons(&doc, &mut polygons)?;

    if polygons.is_empty() {
        return Err(Error::UnsupportedFormat(
            "GeoJSON contains no Polygon or MultiPolygon geometry".into(),
        ));
    }
    Ok(Boundary::new(MultiPolygon::new(polygons), Some(crs)))
}

fn collect_polygons(value: &Value, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "FeatureCollection" => {
            if let Some(features) = value.get("features").and_then(Value::as_array) {
                for feature in features {
                    collect_polygons(feature, out)?;
                }
            }
        }
        "Feature" => {
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_polygons(geometry, out)?;
            }
        }
        "GeometryCollection" => {
            if let Some(geoms) = value.get("geometries").and_then(Value::as_array) {
                for g in geoms {
                    collect_polygons(g, out)?;
                }
            }
        }
        "Polygon" => out.push(parse_polygon(coordinates(value)?)?),
        "MultiPolygon" => {
            let polys = coordinates(value)?
                .as_array()
                .ok_or_else(|| malformed("MultiPolygon coordinates must be an array"))?;
            for p in polys {
                out.push(parse_polygon(p)?);
            }
        }
        // points and lines carry no area
        _ => {}
    }
    Ok(())
}

fn coordinates(geometry: &Value) -> Result<&Value> {
    geometry
        .get("coordinates")
        .ok_or_else(|| malformed("geometry without coordinates"))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = value
        .as_array()
        .ok_or_else(|| malformed("Polygon coordinates must be an array of rings"))?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| malformed("Polygon without exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let positions = value
        .as_array()
        .ok_or_else(|| malformed("ring must be an array of positions"))?;
    let coords = positions
        .iter()
        .map(|pos| {
            let xy = pos.as_array().filter(|a| a.len() >= 2);
            match xy.map(|a| (a[0].as_f64(), a[1].as_f64())) {
                Some((Some(x), Some(y))) => Ok(Coord { x, y }),
                _ => Err(malformed("position must hold two numbers")),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    if coords.len() < 3 {
        return Err(malformed("ring needs at least three positions"));
    }
    Ok(LineString::new(coords))
}

fn malformed(msg: &str) -> Error {
    Error::UnsupportedFormat(format!("Malformed GeoJSON: {}", msg))
}
