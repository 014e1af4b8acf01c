//! Data loading utilities

use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use super::table::{Cell, Column, Table};
use crate::error::{Result, WorkbenchError};

/// Parses raw dataset bytes into a [`Table`]
#[derive(Debug, Clone)]
pub struct DataLoader {
    delimiter: u8,
    has_header: bool,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Whether the first row is a header
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Parse CSV bytes. Every column is read as text and typed per cell, so
    /// mixed columns survive until a pipeline step decides what to do with them.
    pub fn parse_csv(&self, bytes: &[u8]) -> Result<Table> {
        let start = Instant::now();

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);
        let df = CsvReadOptions::default()
            .with_has_header(self.has_header)
            .with_infer_schema_length(Some(0))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;

        let columns = df
            .get_columns()
            .iter()
            .map(|column| {
                let series = column.as_materialized_series().cast(&DataType::String)?;
                let values: Vec<Cell> = series.str()?.into_iter().map(Cell::parse).collect();
                Ok(Column::new(column.name().to_string(), values))
            })
            .collect::<Result<Vec<Column>>>()?;

        let table = Table::new(columns)?;
        debug!(
            rows = table.n_rows(),
            cols = table.n_cols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "parsed csv"
        );
        Ok(table)
    }

    /// Load a CSV/TSV file from disk
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<Table> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            WorkbenchError::DatasetAccess(format!("{}: {}", path.display(), e))
        })?;

        let is_tsv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("tsv"))
            .unwrap_or(false);
        if is_tsv {
            self.clone().with_delimiter(b'\t').parse_csv(&bytes)
        } else {
            self.parse_csv(&bytes)
        }
    }
}
