//! Named, co-registered band stacks

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, GRID_TOLERANCE};

/// An ordered set of co-registered single-band rasters, each tagged with
/// the name of the predictor it holds.
///
/// All bands share dimensions, geotransform and CRS. Bands are addressed
/// by name; the order only matters for display and file output.
#[derive(Debug, Clone)]
pub struct RasterStack {
    names: Vec<String>,
    bands: Vec<Raster<f64>>,
}

impl RasterStack {
    /// Build a stack, validating names and co-registration.
    ///
    /// Every band that declares a CRS must declare the same one; a clash is a
    /// `GeometryMismatch` naming the offending band.
    pub fn new(bands: Vec<(String, Raster<f64>)>) -> Result<Self> {
        let Some((first_name, first)) = bands.first() else {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: "0".into(),
                reason: "a raster stack needs at least one band".into(),
            });
        };

        // bands without a CRS are taken to share the first declared one
        let declared = bands
            .iter()
            .find_map(|(name, band)| band.crs().map(|crs| (name, crs)));

        for (i, (name, band)) in bands.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::InvalidParameter {
                    name: "band name",
                    value: format!("#{}", i),
                    reason: "band names must not be empty".into(),
                });
            }
            if bands[..i].iter().any(|(other, _)| other == name) {
                return Err(Error::InvalidParameter {
                    name: "band name",
                    value: name.clone(),
                    reason: "duplicate band name".into(),
                });
            }
            if band.shape() != first.shape() {
                return Err(Error::GeometryMismatch(format!(
                    "band '{}' is {}x{} but '{}' is {}x{}",
                    name,
                    band.rows(),
                    band.cols(),
                    first_name,
                    first.rows(),
                    first.cols()
                )));
            }
            if !band.transform().approx_eq(first.transform(), GRID_TOLERANCE) {
                return Err(Error::GeometryMismatch(format!(
                    "band '{}' is not aligned with '{}'",
                    name, first_name
                )));
            }
            if let (Some(crs), Some((declared_name, declared))) = (band.crs(), declared) {
                if !crs.is_equivalent(declared) {
                    return Err(Error::GeometryMismatch(format!(
                        "band '{}' is in {} but '{}' is in {}",
                        name,
                        crs.identifier(),
                        declared_name,
                        declared.identifier()
                    )));
                }
            }
        }

        let (names, bands) = bands.into_iter().unzip();
        Ok(Self { names, bands })
    }

    /// Band names in stack order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the stack has no bands (never true for a constructed stack)
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band by name
    pub fn band(&self, name: &str) -> Option<&Raster<f64>> {
        self.names.iter().position(|n| n == name).map(|i| &self.bands[i])
    }

    /// Iterate over (name, band) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.names.iter().map(|n| n.as_str()).zip(self.bands.iter())
    }

    /// First band, used as the grid template for derived rasters
    pub fn template(&self) -> &Raster<f64> {
        &self.bands[0]
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.template().shape()
    }

    /// Shared geotransform
    pub fn transform(&self) -> &GeoTransform {
        self.template().transform()
    }

    /// Shared CRS (first band that declares one)
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.iter().find_map(|b| b.crs())
    }

    /// Resolve predictor names to band indices.
    ///
    /// `owner` names the model or table that requires the predictors and is
    /// carried into the error.
    pub fn indices_of(&self, names: &[String], owner: &str) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.names.iter().position(|n| n == name) {
                Some(i) => indices.push(i),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::PredictorMismatch {
                model: owner.to_string(),
                missing,
            });
        }
        Ok(indices)
    }

    /// Stack restricted to `names`, in that order
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let indices = self.indices_of(names, "stack selection")?;
        Ok(Self {
            names: indices.iter().map(|&i| self.names[i].clone()).collect(),
            bands: indices.iter().map(|&i| self.bands[i].clone()).collect(),
        })
    }

    /// Values of every band at (row, col); no-data cells are `None`
    pub fn values_at(&self, row: usize, col: usize) -> Vec<Option<f64>> {
        self.bands.iter().map(|b| b.value_f64(row, col)).collect()
    }

    /// Value of a band at (row, col) by band index; `None` for no-data
    pub fn value_at(&self, band: usize, row: usize, col: usize) -> Option<f64> {
        self.bands.get(band).and_then(|b| b.value_f64(row, col))
    }

    /// Whether every band holds valid data at (row, col)
    pub fn is_complete(&self, row: usize, col: usize) -> bool {
        self.bands.iter().all(|b| b.value_f64(row, col).is_some())
    }

    /// Consume the stack into (name, band) pairs
    pub fn into_bands(self) -> Vec<(String, Raster<f64>)> {
        self.names.into_iter().zip(self.bands).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(3, 3, value);
        r.set_transform(GeoTransform::new(10.0, 20.0, 1.0, -1.0));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    fn make_stack() -> RasterStack {
        RasterStack::new(vec![
            ("bio_1".into(), band(1.0)),
            ("bio_12".into(), band(12.0)),
            ("elev".into(), band(100.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let stack = make_stack();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.band("bio_12").unwrap().get(0, 0).unwrap(), 12.0);
        assert!(stack.band("bio_2").is_none());

        let idx = stack
            .indices_of(&["elev".to_string(), "bio_1".to_string()], "rf")
            .unwrap();
        assert_eq!(idx, vec![2, 0]);
    }

    #[test]
    fn test_missing_predictor_is_reported() {
        let stack = make_stack();
        let err = stack
            .indices_of(&["bio_1".to_string(), "bio_7".to_string()], "maxent")
            .unwrap_err();
        match err {
            Error::PredictorMismatch { model, missing } => {
                assert_eq!(model, "maxent");
                assert_eq!(missing, vec!["bio_7".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_misaligned_band_rejected() {
        let mut shifted = band(2.0);
        shifted.set_transform(GeoTransform::new(11.0, 20.0, 1.0, -1.0));
        let result = RasterStack::new(vec![("a".into(), band(1.0)), ("b".into(), shifted)]);
        assert!(matches!(result, Err(Error::GeometryMismatch(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = RasterStack::new(vec![("a".into(), band(1.0)), ("a".into(), band(2.0))]);
        assert!(result.is_err());
        assert!(RasterStack::new(vec![]).is_err());
    }

    #[test]
    fn test_completeness() {
        let mut b = band(5.0);
        b.set(1, 1, f64::NAN).unwrap();
        let stack = RasterStack::new(vec![("a".into(), band(1.0)), ("b".into(), b)]).unwrap();
        assert!(stack.is_complete(0, 0));
        assert!(!stack.is_complete(1, 1));
        assert_eq!(stack.values_at(1, 1), vec![Some(1.0), None]);
    }

    #[test]
    fn test_crs_clash_behind_undeclared_band_rejected() {
        let mut undeclared = band(0.0);
        undeclared.set_crs(None);
        let mut utm = band(2.0);
        utm.set_crs(Some(CRS::from_epsg(32719)));

        let result = RasterStack::new(vec![
            ("a".into(), undeclared.clone()),
            ("b".into(), band(1.0)),
            ("c".into(), utm),
        ]);
        match result {
            Err(Error::GeometryMismatch(msg)) => assert!(msg.contains("'c'"), "{}", msg),
            other => panic!("unexpected result: {:?}", other.map(|s| s.names().to_vec())),
        }

        let ok = RasterStack::new(vec![("a".into(), undeclared), ("b".into(), band(1.0))]).unwrap();
        assert_eq!(ok.crs().and_then(|c| c.epsg()), Some(4326));
    }
}
