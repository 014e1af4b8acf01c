//! Pipeline step interpreter
//!
//! Replays the recorded transformation steps of a pipeline against a raw
//! cell table:
//! - missing value handling (drop, mean, median, mode)
//! - normalization (min-max, z-score, robust) and scaling (standard, max-abs)
//! - categorical encoding (one-hot, label, target)
//! - train/validation/test split, outlier clipping, column drop/reorder
//!
//! Each step records its resolved parameters so a later replay reproduces the
//! same values without refitting.

mod columns;
mod encoder;
mod imputer;
mod interpreter;
mod outlier;
mod scaler;
mod split;
pub(crate) mod stats;
mod step;

pub use columns::ColumnsParams;
pub use encoder::{EncodeMethod, EncodeParams};
pub use imputer::{MissingParams, MissingStrategy};
pub use interpreter::{PipelineInterpreter, TransformedData};
pub use outlier::{ClipBounds, ClipMethod, ClipParams};
pub use scaler::{NormalizeMethod, NormalizeParams, ScaleMethod, ScaleParams, ScaleStepParams};
pub use split::{assign_subsets, partition_sizes, SplitParams, DEFAULT_SEED};
pub use step::{Step, StepType};
