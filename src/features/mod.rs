//! Feature and label extraction
//!
//! Turns transformed data into numeric tensors: tabular tables through
//! [`FeatureExtractor`] with an explicit [`LabelSelection`], image datasets
//! through [`ImagePreprocessor`].

pub mod image;
mod tabular;

pub use self::image::{ImageConfig, ImagePreprocessor, ImageTensors};
pub use tabular::{ExtractedTensors, FeatureExtractor, LabelSelection};
