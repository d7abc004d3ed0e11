//! C-factor lookup table.
//!
//! Tabular rows keyed by land-cover band index, columns
//! `[index, summer_coefficient, winter_coefficient]` with a header row.

use std::path::Path;

use crate::error::{Error, Result};

/// Seasonal coefficients for one land-cover class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CFactorRow {
    pub summer: f64,
    pub winter: f64,
}

/// Lookup table mapping band index `0..N-1` to seasonal coefficients.
///
/// Read-only after load; the batch runner shares it by reference across all
/// workers.
#[derive(Debug, Clone)]
pub struct CFactorTable {
    rows: Vec<CFactorRow>,
}

impl CFactorTable {
    /// Build a table directly from rows (mostly for tests).
    #[must_use]
    pub fn from_rows(rows: Vec<CFactorRow>) -> Self {
        Self { rows }
    }

    /// Load the table from a CSV file.
    ///
    /// Row order must match the band index column; a gap or out-of-order
    /// index is a malformed table.
    ///
    /// # Errors
    /// `LookupMismatch` for malformed rows, `Io` for unreadable files.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| Error::LookupMismatch(format!("{}: {e}", path.display())))?;

        let mut rows = Vec::new();
        for (pos, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| Error::LookupMismatch(format!("row {pos}: {e}")))?;
            if record.len() < 3 {
                return Err(Error::LookupMismatch(format!(
                    "row {pos}: expected [index, summer, winter], got {} columns",
                    record.len()
                )));
            }

            let index: usize = record[0]
                .parse()
                .map_err(|_| Error::LookupMismatch(format!("row {pos}: bad index `{}`", &record[0])))?;
            if index != pos {
                return Err(Error::LookupMismatch(format!(
                    "row {pos} carries index {index}; band indices must be contiguous from 0"
                )));
            }

            let summer: f64 = record[1].parse().map_err(|_| {
                Error::LookupMismatch(format!("row {pos}: bad summer coefficient `{}`", &record[1]))
            })?;
            let winter: f64 = record[2].parse().map_err(|_| {
                Error::LookupMismatch(format!("row {pos}: bad winter coefficient `{}`", &record[2]))
            })?;

            rows.push(CFactorRow { summer, winter });
        }

        if rows.is_empty() {
            return Err(Error::LookupMismatch(format!(
                "{}: table has no data rows",
                path.display()
            )));
        }

        Ok(Self { rows })
    }

    /// Number of rows (mapped band indices).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Coefficients for band `k`, or `None` when unmapped.
    #[must_use]
    pub fn get(&self, k: usize) -> Option<CFactorRow> {
        self.rows.get(k).copied()
    }
}
