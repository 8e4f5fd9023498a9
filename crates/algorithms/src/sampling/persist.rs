//! Feature table persistence as CSV
//!
//! Layout: header `label,x,y,<predictor...>`, one row per record, labels
//! written as `1`/`0`.

use super::table::{FeatureTable, Label, SampleRecord};
use habitat_core::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

const FIXED_COLUMNS: [&str; 3] = ["label", "x", "y"];

fn format_value(v: f64, precision: Option<usize>) -> String {
    match precision {
        Some(p) => format!("{:.*}", p, v),
        // shortest representation that parses back to the same f64
        None => format!("{}", v),
    }
}

/// Write a feature table to a CSV file.
///
/// `precision` fixes the number of decimals; `None` keeps full precision.
pub fn write_feature_table<P: AsRef<Path>>(
    table: &FeatureTable,
    path: P,
    precision: Option<usize>,
) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_feature_table_to(table, std::io::BufWriter::new(file), precision)
}

/// Write a feature table as CSV to any writer
pub fn write_feature_table_to<W: Write>(
    table: &FeatureTable,
    writer: W,
    precision: Option<usize>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header = FIXED_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .chain(table.predictors().iter().cloned());
    wtr.write_record(header)?;

    for rec in table.records() {
        let row = [
            rec.label.code().to_string(),
            format_value(rec.x, precision),
            format_value(rec.y, precision),
        ]
        .into_iter()
        .chain(rec.values.iter().map(|&v| format_value(v, precision)));
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a feature table written by [`write_feature_table`]
pub fn read_feature_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable> {
    let file = std::fs::File::open(path.as_ref())?;
    read_feature_table_from(file)
}

/// Read a feature table from any CSV reader
pub fn read_feature_table_from<R: Read>(reader: R) -> Result<FeatureTable> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let fixed_ok = headers.len() >= FIXED_COLUMNS.len()
        && FIXED_COLUMNS
            .iter()
            .zip(headers.iter())
            .all(|(want, got)| got.eq_ignore_ascii_case(want));
    if !fixed_ok {
        return Err(Error::UnsupportedFormat(format!(
            "feature table header must start with {}",
            FIXED_COLUMNS.join(",")
        )));
    }
    let predictors: Vec<String> = headers.iter().skip(3).map(str::to_string).collect();

    let mut records = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row?;
        let bad = |what: &str| {
            Error::UnsupportedFormat(format!("feature table row {}: invalid {}", line + 1, what))
        };
        let label = row
            .get(0)
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(Label::from_code)
            .ok_or_else(|| bad("label"))?;
        let number = |idx: usize, what: &str| {
            row.get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| bad(what))
        };
        let x = number(1, "x")?;
        let y = number(2, "y")?;
        let values = (0..predictors.len())
            .map(|j| number(3 + j, &predictors[j]))
            .collect::<Result<Vec<_>>>()?;
        records.push(SampleRecord { label, x, y, values });
    }

    FeatureTable::new(predictors, records)
}
