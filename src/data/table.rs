//! Cell table shared by the pipeline interpreter and the feature extractor

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};

/// A single dataset cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Parse a raw CSV cell. Empty and NA-like markers become `Missing`.
    pub fn parse(raw: Option<&str>) -> Cell {
        let Some(raw) = raw else {
            return Cell::Missing;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "nan" | "null" | "na" | "n/a" | "none" => return Cell::Missing,
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            Ok(_) => Cell::Missing,
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Key used for categorical grouping
    pub fn category_key(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) if !v.is_nan() => Some(v.to_string()),
            _ => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Cell::Missing
        } else {
            Cell::Number(v)
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Missing)
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, values.into_iter().map(Cell::from).collect())
    }

    /// True when every non-missing cell is a number and at least one number exists
    pub fn is_numeric(&self) -> bool {
        let mut seen = false;
        for cell in &self.values {
            match cell {
                Cell::Text(_) => return false,
                Cell::Number(v) if !v.is_nan() => seen = true,
                _ => {}
            }
        }
        seen
    }

    /// Non-missing numeric values, in row order
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Cell::as_number).collect()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(Cell::is_missing)
    }

    pub fn first_text(&self) -> Option<&str> {
        self.values.iter().find_map(|c| match c {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Partition a row was assigned to by a split step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Train,
    Validation,
    Test,
}

/// Column-major table with a header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subsets: Option<Vec<Subset>>,
}

impl Table {
    /// Build a table from columns of equal length
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != n_rows) {
            return Err(WorkbenchError::DatasetAccess(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.values.len(),
                n_rows
            )));
        }
        Ok(Self {
            columns,
            n_rows,
            subsets: None,
        })
    }

    /// Build a table from a header row and row-major cells
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let width = header.len();
        let mut columns: Vec<Column> = header
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(WorkbenchError::DatasetAccess(format!(
                    "row {} has {} cells, header has {}",
                    i,
                    row.len(),
                    width
                )));
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.values.push(cell);
            }
        }

        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Names of columns whose non-missing cells are all numbers, in table order
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Names of columns holding at least one text cell
    pub fn text_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.values.iter().any(|v| matches!(v, Cell::Text(_))))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Row `i` as cell references, in column order
    pub fn row(&self, i: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.values[i]).collect()
    }

    /// Keep only rows where `keep[i]` is true
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut idx = 0;
            column.values.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        if let Some(subsets) = &mut self.subsets {
            let mut idx = 0;
            subsets.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        self.n_rows = keep.iter().filter(|k| **k).count();
    }

    /// Replace the column at `index` with zero or more columns in its place
    pub fn splice_column(&mut self, index: usize, replacement: Vec<Column>) -> Result<()> {
        if let Some(bad) = replacement.iter().find(|c| c.values.len() != self.n_rows) {
            return Err(WorkbenchError::DatasetAccess(format!(
                "replacement column '{}' has {} rows, expected {}",
                bad.name,
                bad.values.len(),
                self.n_rows
            )));
        }
        self.columns.splice(index..=index, replacement);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let index = self.column_index(name)?;
        Some(self.columns.remove(index))
    }

    /// Reorder columns to the given complete list of names
    pub fn reorder(&mut self, order: &[String]) -> Result<()> {
        if order.len() != self.columns.len() {
            return Err(WorkbenchError::DatasetAccess(format!(
                "reorder lists {} columns, table has {}",
                order.len(),
                self.columns.len()
            )));
        }
        let mut remaining = std::mem::take(&mut self.columns);
        for name in order {
            let pos = remaining.iter().position(|c| &c.name == name).ok_or_else(|| {
                WorkbenchError::DatasetAccess(format!("unknown column '{}'", name))
            })?;
            self.columns.push(remaining.remove(pos));
        }
        Ok(())
    }

    pub fn subsets(&self) -> Option<&[Subset]> {
        self.subsets.as_deref()
    }

    pub fn set_subsets(&mut self, subsets: Vec<Subset>) -> Result<()> {
        if subsets.len() != self.n_rows {
            return Err(WorkbenchError::DatasetAccess(format!(
                "subset tags cover {} rows, table has {}",
                subsets.len(),
                self.n_rows
            )));
        }
        self.subsets = Some(subsets);
        Ok(())
    }

    /// True when row `i` belongs to the training partition (or no split exists)
    pub fn is_train_row(&self, i: usize) -> bool {
        self.subsets
            .as_ref()
            .map(|s| s[i] == Subset::Train)
            .unwrap_or(true)
    }
}
