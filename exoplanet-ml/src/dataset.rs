//! In-memory tabular dataset loaded from an uploaded CSV.
//!
//! Cells keep their raw text. Only the feature columns handed to the model
//! are parsed as numbers; every other column is written back untouched.

use crate::error::MlError;
use crate::mapping::FeatureMapping;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::io::{Read, Write};

/// Spellings read as a missing value (the usual dataframe NA markers).
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A table of rows keyed by an ordered header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// A column that absorbed one or more later columns during renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameCollision {
    /// Name shared by the colliding columns after renaming.
    pub column: String,
    /// Original headers that ended up with that name, in header order.
    /// The last one supplied the surviving values.
    pub sources: Vec<String>,
}

/// Outcome of applying a [`FeatureMapping`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    /// `(external, internal)` pairs that were applied.
    pub renamed: Vec<(String, String)>,
    pub collisions: Vec<RenameCollision>,
}

/// Dense row-major feature matrix handed to a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    /// Build a matrix from row-major values.
    pub fn new(n_features: usize, values: Vec<f64>) -> Result<Self, MlError> {
        if n_features == 0 && !values.is_empty() {
            return Err(MlError::inference("feature matrix has values but no features"));
        }
        if n_features > 0 && values.len() % n_features != 0 {
            return Err(MlError::inference(format!(
                "{} values cannot be split into rows of {} features",
                values.len(),
                n_features
            )));
        }
        Ok(Self { n_features, values })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, MlError> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != n_features) {
            return Err(MlError::inference(format!(
                "row {} has {} features, expected {}",
                bad,
                rows[bad].len(),
                n_features
            )));
        }
        Self::new(n_features, rows.concat())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rows(&self) -> usize {
        if self.n_features == 0 {
            0
        } else {
            self.values.len() / self.n_features
        }
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_features..(i + 1) * self.n_features]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.n_features.max(1))
    }
}

impl Dataset {
    /// Build a dataset from a header and rows. Short rows are padded with
    /// empty cells; long rows are rejected.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, MlError> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(MlError::dataset(format!(
                    "row {} has {} fields but the header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            row.resize(width, String::new());
            padded.push(row);
        }
        Ok(Self {
            columns: dedupe_header(columns),
            rows: padded,
        })
    }

    /// Parse CSV text with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, MlError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
            return Err(MlError::dataset("No columns to parse from file"));
        }
        let columns: Vec<String> = headers.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        if rows.is_empty() {
            return Err(MlError::dataset("CSV contains no data rows"));
        }
        Self::new(columns, rows)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, MlError> {
        Self::from_csv_reader(bytes)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Raw cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Rename every mapped header in place. Unmapped headers pass through.
    ///
    /// When two columns end up sharing a name, the later column's values
    /// survive at the earlier column's position and the later slot is
    /// removed.
    pub fn rename_columns(&mut self, mapping: &FeatureMapping) -> RenameReport {
        let mut report = RenameReport::default();
        let targets: Vec<String> = self
            .columns
            .iter()
            .map(|c| match mapping.internal_for(c) {
                Some(internal) => {
                    report.renamed.push((c.clone(), internal.to_string()));
                    internal.to_string()
                }
                None => c.clone(),
            })
            .collect();

        let mut keep = vec![true; targets.len()];
        for i in 0..targets.len() {
            if !keep[i] {
                continue;
            }
            let later: Vec<usize> = (i + 1..targets.len())
                .filter(|&j| targets[j] == targets[i])
                .collect();
            let Some(&winner) = later.last() else {
                continue;
            };
            for row in &mut self.rows {
                row[i] = std::mem::take(&mut row[winner]);
            }
            let mut sources = vec![self.columns[i].clone()];
            for &j in &later {
                keep[j] = false;
                sources.push(self.columns[j].clone());
            }
            tracing::warn!(
                column = %targets[i],
                sources = ?sources,
                "Columns collided after renaming; keeping the last one"
            );
            report.collisions.push(RenameCollision {
                column: targets[i].clone(),
                sources,
            });
        }

        self.columns = retain_mask(targets, &keep);
        for row in &mut self.rows {
            *row = retain_mask(std::mem::take(row), &keep);
        }
        report
    }

    /// Names from `required` that are not columns of this dataset, in order.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .cloned()
            .collect()
    }

    /// Slice `features` (in that order) into a numeric matrix.
    pub fn feature_matrix(&self, features: &[String]) -> Result<FeatureMatrix, MlError> {
        let indices = features
            .iter()
            .map(|f| {
                self.column_index(f)
                    .ok_or_else(|| MlError::dataset(format!("column '{f}' not found")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = Vec::with_capacity(indices.len() * self.rows.len());
        for (r, row) in self.rows.iter().enumerate() {
            for (&idx, name) in indices.iter().zip(features) {
                let cell = &row[idx];
                let value = parse_cell(cell).ok_or_else(|| {
                    MlError::dataset(format!(
                        "could not convert string to float: '{cell}' (row {}, column '{name}')",
                        r + 1
                    ))
                })?;
                values.push(value);
            }
        }
        FeatureMatrix::new(indices.len(), values)
    }

    /// Append a column, or overwrite an existing one with the same name.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), MlError> {
        if values.len() != self.rows.len() {
            return Err(MlError::dataset(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Serialize as CSV with a header row and no index column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), MlError> {
        let mut writer = WriterBuilder::new().from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, MlError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }
}

/// Parse one feature cell; `None` means the text is not numeric.
fn parse_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if NA_VALUES.contains(&trimmed) {
        return Some(f64::NAN);
    }
    match trimmed {
        "True" | "true" | "TRUE" => return Some(1.0),
        "False" | "false" | "FALSE" => return Some(0.0),
        _ => {}
    }
    trimmed.parse::<f64>().ok()
}

/// Suffix repeated header names with `.1`, `.2`, ... so every column is addressable.
fn dedupe_header(columns: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for name in columns {
        let mut candidate = name.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}

fn retain_mask<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, &k)| k.then_some(item))
        .collect()
}
