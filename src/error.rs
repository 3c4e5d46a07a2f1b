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

use std::path::PathBuf;

use thiserror::Error;

use crate::common::Stage;
use crate::network::BoxError;

/// Errors surfaced by the detector.
///
/// Empty detections are not errors, and boxes that degenerate during
/// calibration or clipping are dropped without being reported.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load {stage} network: {source}")]
    ModelLoad {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{stage} network reports an illegal input size: {size}")]
    InputSize { stage: Stage, size: u32 },

    #[error("{stage} network inference failed: {source}")]
    Inference {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{stage} network returned malformed output: {reason}")]
    MalformedOutput { stage: Stage, reason: String },

    #[error("failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid image: {0}")]
    InvalidImage(String),
}
