//! Coordinate reference systems
//!
//! Only identification and comparison are supported: grids, boundaries and
//! occurrence points must already share a CRS, nothing is reprojected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A coordinate reference system known by EPSG code, WKT or PROJ string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    wkt: Option<String>,
    epsg: Option<u32>,
    proj: Option<String>,
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            ..Self::unset()
        }
    }

    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            ..Self::unset()
        }
    }

    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            proj: Some(proj.into()),
            ..Self::unset()
        }
    }

    fn unset() -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: None,
        }
    }

    /// Parse a user-facing identifier.
    ///
    /// Accepts `EPSG:4326`, `epsg:4326`, OGC URNs such as
    /// `urn:ogc:def:crs:EPSG::4326`, the GeoJSON default `urn:ogc:def:crs:OGC:1.3:CRS84`,
    /// PROJ strings starting with `+proj` and falls back to WKT otherwise.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.ends_with("crs84") {
            return Some(Self::wgs84());
        }
        if let Some(code) = lower.strip_prefix("epsg:") {
            return code.trim().parse().ok().map(Self::from_epsg);
        }
        if lower.starts_with("urn:ogc:def:crs:epsg") {
            return lower
                .rsplit(':')
                .next()
                .and_then(|code| code.parse().ok())
                .map(Self::from_epsg);
        }
        if lower.starts_with("+proj") {
            return Some(Self::from_proj(trimmed));
        }
        Some(Self::from_wkt(trimmed))
    }

    /// WGS84 longitude/latitude, the default for occurrence records
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether the EPSG code denotes a geographic (lon/lat) system.
    ///
    /// Only the common geographic codes are recognised.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | Some(4269) | Some(4258) | Some(4283) | Some(4674))
    }

    /// Same system by EPSG code, else by identical WKT or PROJ text.
    ///
    /// Definitions given in different forms never compare equal.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.wkt, &other.wkt, &self.proj, &other.proj) {
                (Some(a), Some(b), _, _) => a == b,
                (_, _, Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Short label for logs and error messages; WKT is cut to 50 characters
    pub fn identifier(&self) -> String {
        match (self.epsg, &self.proj, &self.wkt) {
            (Some(code), _, _) => format!("EPSG:{}", code),
            (None, Some(proj), _) => proj.clone(),
            (None, None, Some(wkt)) => format!("WKT:{}", wkt.chars().take(50).collect::<String>()),
            _ => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Compare two optional CRS values.
///
/// An unknown CRS on either side is treated as compatible; callers that need
/// stricter checks inspect the options themselves.
pub fn compatible(a: Option<&CRS>, b: Option<&CRS>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_equivalent(b),
        _ => true,
    }
}
