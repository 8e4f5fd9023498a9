//! Presence extraction and pseudo-absence sampling

use super::table::{FeatureTable, Label, SampleRecord};
use habitat_core::{crs, Error, OccurrenceSet, RasterStack, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Parameters for building a feature table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Exact number of pseudo-absences; overrides `absence_ratio`
    pub absence_count: Option<usize>,
    /// Pseudo-absences per presence when no count is given
    pub absence_ratio: f64,
    /// Never place a pseudo-absence in a cell holding a presence
    pub exclude_presence_cells: bool,
    /// Random seed for pseudo-absence placement
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            absence_count: None,
            absence_ratio: 2.0,
            exclude_presence_cells: true,
            seed: 1,
        }
    }
}

/// Row accounting of a feature table build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingSummary {
    /// Presence rows before dropping incomplete rows
    pub presences: usize,
    /// Pseudo-absence rows drawn
    pub absences: usize,
    /// Presence points outside the raster grid
    pub outside_grid: usize,
    /// Rows dropped for a missing predictor value
    pub dropped: usize,
    /// Rows in the final table
    pub rows: usize,
}

/// Build a labeled feature table from a predictor stack and occurrences.
///
/// Presence rows take the band values of the cell containing each point.
/// Pseudo-absences are drawn without replacement from cells valid in every
/// band. Any row with a missing predictor is dropped. The result depends
/// only on the inputs and `params.seed`.
pub fn build_feature_table(
    stack: &RasterStack,
    occurrences: &OccurrenceSet,
    params: &SamplingParams,
) -> Result<(FeatureTable, SamplingSummary)> {
    if !params.absence_ratio.is_finite() || params.absence_ratio < 0.0 {
        return Err(Error::InvalidParameter {
            name: "absence_ratio",
            value: params.absence_ratio.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }
    if !crs::compatible(stack.crs(), occurrences.crs()) {
        return Err(Error::GeometryMismatch(format!(
            "occurrences are in {} but the predictor stack is in {}",
            occurrences.crs().map(|c| c.identifier()).unwrap_or_default(),
            stack.crs().map(|c| c.identifier()).unwrap_or_default()
        )));
    }

    let template = stack.template();
    let (rows, cols) = stack.shape();

    let mut presence_cells = HashSet::new();
    let mut outside_grid = 0;
    let mut candidates_rows: Vec<(Label, f64, f64, Vec<Option<f64>>)> = Vec::new();

    for p in occurrences.points() {
        match template.cell_at(p.x(), p.y()) {
            Some((row, col)) => {
                presence_cells.insert((row, col));
                candidates_rows.push((Label::Presence, p.x(), p.y(), stack.values_at(row, col)));
            }
            None => {
                outside_grid += 1;
                candidates_rows.push((Label::Presence, p.x(), p.y(), vec![None; stack.len()]));
            }
        }
    }
    let presences = candidates_rows.len();

    let requested = params
        .absence_count
        .unwrap_or_else(|| (params.absence_ratio * presences as f64).round() as usize);

    let candidates: Vec<(usize, usize)> = (0..rows)
        .flat_map(|row| (0..cols).map(move |col| (row, col)))
        .filter(|&(row, col)| stack.is_complete(row, col))
        .filter(|cell| !(params.exclude_presence_cells && presence_cells.contains(cell)))
        .collect();

    let amount = if requested > candidates.len() {
        warn!(
            "Requested {} pseudo-absences but only {} candidate cells exist; using all of them",
            requested,
            candidates.len()
        );
        candidates.len()
    } else {
        requested
    };

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let drawn = rand::seq::index::sample(&mut rng, candidates.len(), amount);
    for idx in drawn.iter() {
        let (row, col) = candidates[idx];
        let (x, y) = template.pixel_to_geo(col, row);
        candidates_rows.push((Label::Absence, x, y, stack.values_at(row, col)));
    }
    let absences = amount;

    let total = candidates_rows.len();
    let records: Vec<SampleRecord> = candidates_rows
        .into_iter()
        .filter_map(|(label, x, y, values)| {
            let values = values.into_iter().collect::<Option<Vec<f64>>>()?;
            Some(SampleRecord { label, x, y, values })
        })
        .collect();
    let dropped = total - records.len();

    if outside_grid > 0 {
        warn!("{} occurrence points fall outside the predictor grid", outside_grid);
    }
    info!(
        "Feature table: {} presences, {} pseudo-absences, {} rows dropped for missing values",
        presences, absences, dropped
    );

    let summary = SamplingSummary {
        presences,
        absences,
        outside_grid,
        dropped,
        rows: records.len(),
    };
    let table = FeatureTable::new(stack.names().to_vec(), records)?;
    Ok((table, summary))
}
