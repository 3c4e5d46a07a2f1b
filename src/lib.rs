// This file is part of rustmtcnn, a port of the face detection cascade described in the following paper:
//
//      Joint Face Detection and Alignment using Multi-task Cascaded Convolutional Networks,
//      Kaipeng Zhang, Zhanpeng Zhang, Zhifeng Li, Yu Qiao.
//      In IEEE Signal Processing Letters, 2016
//
// You can redistribute rustmtcnn source codes and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

//! Three-stage cascaded face detector.
//!
//! A fully-convolutional proposal network scans an image pyramid, a refine
//! network re-scores 24x24 crops of the proposals, and an output network
//! re-scores 48x48 crops and regresses five facial landmarks. The networks
//! themselves are supplied by the caller through the [`Network`] trait.

mod common;
mod config;
mod detector;
mod error;
pub mod geometry;
pub mod mining;
mod model;
mod network;
pub mod nms;

pub use common::{
    normalize_into, resize_image, BBox, Detection, ImageData, ImagePyramid, Landmarks,
    ParseStageError, Stage, StageTimings,
};
pub use config::DetectorConfig;
pub use detector::{generate_candidates, Candidate, CascadeDetector};
pub use error::CascadeError;
pub use model::{load_networks, ModelProvider};
pub use network::{BoxError, Inference, Network, Networks};
pub use nms::{non_maximum_suppression, OverlapMode};

use std::path::PathBuf;

use tracing::warn;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Create a face detector, resolving each stage's network through `provider`.
pub fn create_detector<P>(
    provider: &P,
    config: DetectorConfig,
) -> Result<Box<dyn Detector>, CascadeError>
where
    P: ModelProvider + ?Sized,
{
    let networks = load_networks(provider)?;
    create_detector_with_networks(networks, config)
}

/// Create a face detector from already constructed networks.
pub fn create_detector_with_networks(
    networks: Networks,
    config: DetectorConfig,
) -> Result<Box<dyn Detector>, CascadeError> {
    Ok(Box::new(CascadeDetector::new(networks, config)?))
}

/// Face detector.
///
/// # Examples
///
/// ```rust,no_run
/// use rustmtcnn::{Detector, DetectorConfig, ImageData, ModelProvider, Stage};
///
/// fn run(provider: &dyn ModelProvider) -> Result<(), rustmtcnn::CascadeError> {
///     let detector = rustmtcnn::create_detector(provider, DetectorConfig::default())?;
///
///     let image = ImageData::open("/path/to/image.jpg")?;
///     let detection = detector.detect(&image, Stage::Output)?;
///     for (face, landmarks) in detection.boxes.iter().zip(&detection.landmarks) {
///         println!("found face: {:?} {:?}", face, landmarks);
///     }
///     Ok(())
/// }
/// ```
pub trait Detector: Send + Sync {
    /// Run the cascade up to and including `last_stage`.
    ///
    /// Returns the calibrated boxes of the last stage that ran. Landmarks are
    /// only populated when `last_stage` is [`Stage::Output`]. A stage that
    /// yields no candidates ends detection with an empty result, not an error.
    fn detect(&self, image: &ImageData, last_stage: Stage) -> Result<Detection, CascadeError>;

    /// Configuration the detector was built with.
    fn config(&self) -> &DetectorConfig;

    /// Detect faces on every image independently.
    ///
    /// The result has one entry per input image, in input order. A failure on
    /// one image is recorded in its entry and does not affect the others.
    fn detect_batch(
        &self,
        images: &[ImageData],
        last_stage: Stage,
    ) -> Vec<Result<Detection, CascadeError>> {
        let detect_one = |(index, image): (usize, &ImageData)| {
            let result = self.detect(image, last_stage);
            if let Err(error) = &result {
                warn!(index, %error, "detection failed");
            }
            result
        };

        #[cfg(feature = "rayon")]
        let results = images.par_iter().enumerate().map(detect_one).collect();
        #[cfg(not(feature = "rayon"))]
        let results = images.iter().enumerate().map(detect_one).collect();

        results
    }

    /// Load and detect faces on every image file independently.
    ///
    /// Files that cannot be read or decoded produce a
    /// [`CascadeError::ImageRead`] entry; the remaining files are still processed.
    fn detect_files(
        &self,
        paths: &[PathBuf],
        last_stage: Stage,
    ) -> Vec<Result<Detection, CascadeError>> {
        let detect_one = |path: &PathBuf| {
            let result = ImageData::open(path).and_then(|image| self.detect(&image, last_stage));
            if let Err(error) = &result {
                warn!(path = %path.display(), %error, "detection failed");
            }
            result
        };

        #[cfg(feature = "rayon")]
        let results = paths.par_iter().map(detect_one).collect();
        #[cfg(not(feature = "rayon"))]
        let results = paths.iter().map(detect_one).collect();

        results
    }
}
