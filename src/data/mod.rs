//! Dataset representation and loading
//!
//! The engine works on a column-major cell table: every dataset, whatever its
//! source format, is parsed into [`Table`] before any pipeline step runs.

mod loader;
mod table;

pub use loader::DataLoader;
pub use table::{Cell, Column, Subset, Table};
