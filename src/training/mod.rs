//! Training driver
//!
//! Builds a network for the requested [`ModelFamily`], runs the mini-batch
//! loop on the tensor runtime and packages the result as a [`ModelArtifact`].
//! Epoch results and cancellation go through a [`TrainingObserver`].

mod artifact;
mod config;
mod driver;
mod metrics;

pub use artifact::{ModelArtifact, TrainingMetadata, ARTIFACT_FORMAT_VERSION};
pub use config::{
    ConvolutionalParams, DeclaredFamily, LinearParams, ModelFamily, NeuralNetworkParams, Schedule,
    TrainingConfig,
};
pub use driver::{
    DriverState, NoopObserver, TrainingData, TrainingDriver, TrainingObserver, TrainingOutcome,
};
pub use metrics::{EpochRecord, TrainingMetrics};
