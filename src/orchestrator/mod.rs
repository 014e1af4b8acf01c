//! Training orchestration
//!
//! [`TrainingEngine`] is the entry point: it takes a [`TrainingRequest`],
//! fetches the dataset, replays the pipeline, trains and stores the result.
//! Progress reaches callers as [`ProgressEvent`]s and the job store as
//! percentage updates.

mod engine;
mod progress;
mod request;

pub use engine::TrainingEngine;
pub use progress::{CancellationFlag, Phase, ProgressEvent, ProgressReporter};
pub use request::TrainingRequest;
