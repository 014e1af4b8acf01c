//! Image decoding and tensor preparation

use image::imageops::FilterType;
use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorkbenchError};

/// Target geometry and pixel treatment for image datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    /// Collapse to one channel with ITU-R 601 luma weights
    pub grayscale: bool,
    /// Scale pixel values from [0, 255] to [0, 1]
    pub normalize: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            grayscale: false,
            normalize: true,
        }
    }
}

impl ImageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn channels(&self) -> usize {
        if self.grayscale {
            1
        } else {
            3
        }
    }
}

/// Stacked `[N, H, W, C]` pixel data with one label per image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensors {
    pub data: Vec<f64>,
    pub shape: [usize; 4],
    pub labels: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: ImageConfig,
}

impl ImagePreprocessor {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Decode, resize (nearest neighbour) and flatten one image to HWC order
    pub fn pixels(&self, img: &DynamicImage) -> Vec<f64> {
        let resized = img.resize_exact(self.config.width, self.config.height, FilterType::Nearest);
        let rgb = resized.to_rgb8();
        let scale = if self.config.normalize { 1.0 / 255.0 } else { 1.0 };

        let mut out = Vec::with_capacity(rgb.width() as usize * rgb.height() as usize * self.config.channels());
        for p in rgb.pixels() {
            let [r, g, b] = p.0;
            if self.config.grayscale {
                out.push(luminance(r, g, b) * scale);
            } else {
                out.extend([r as f64 * scale, g as f64 * scale, b as f64 * scale]);
            }
        }
        out
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<f64>> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.pixels(&img))
    }

    /// Decode every image in parallel and stack the results
    pub fn prepare(&self, images: &[Vec<u8>], labels: &[i64]) -> Result<ImageTensors> {
        if images.len() != labels.len() {
            return Err(WorkbenchError::InvalidParameter {
                name: "labels".to_string(),
                value: labels.len().to_string(),
                reason: format!("expected one label per image ({} images)", images.len()),
            });
        }
        if images.is_empty() {
            return Err(WorkbenchError::DatasetAccess("image dataset is empty".to_string()));
        }

        let decoded: Vec<Vec<f64>> = images
            .par_iter()
            .enumerate()
            .map(|(i, bytes)| {
                self.decode(bytes)
                    .map_err(|e| WorkbenchError::DatasetAccess(format!("image {}: {}", i, e)))
            })
            .collect::<Result<_>>()?;

        let (h, w, c) = (
            self.config.height as usize,
            self.config.width as usize,
            self.config.channels(),
        );
        debug!(images = decoded.len(), height = h, width = w, channels = c, "images prepared");
        Ok(ImageTensors {
            data: decoded.concat(),
            shape: [images.len(), h, w, c],
            labels: labels.iter().map(|&l| l as f64).collect(),
        })
    }
}

fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}
