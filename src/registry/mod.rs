//! Model version registry
//!
//! Versions are created when training starts and finalized when it ends.
//! Each one records its lineage through `parent_model_id`; within a lineage
//! exactly one completed version carries `is_latest_version`.

mod compare;
mod stats;
mod store;
mod version;

pub use compare::{compare_versions, ModelComparison};
pub use stats::ModelStatistics;
pub use store::{ExportFormat, Finalization, ModelVersionStore, NewModel};
pub use version::{
    parse_version, HistoryEntry, ModelMetrics, ModelStatus, ModelUpdate, ModelVersion,
    TrainingConfigSnapshot,
};
