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

use ndarray::{Array3, Array4, ArrayView4};

use crate::common::Stage;
use crate::error::CascadeError;

/// Error type network implementations report inference failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raw output of one network invocation.
///
/// Every tensor is laid out as `batch x rows x cols x ...`. The proposal
/// network is fully convolutional, so `rows x cols` is its output grid over
/// the whole input image. The refine and output networks see fixed-size
/// patches and produce a `1 x 1` grid per patch.
#[derive(Clone, Debug)]
pub struct Inference {
    /// Foreground probability, `batch x rows x cols`.
    pub scores: Array3<f32>,
    /// Box regression `(dx1, dy1, dx2, dy2)`, `batch x rows x cols x 4`.
    pub regression: Array4<f32>,
    /// Landmark regression `(x0, y0, ..., x4, y4)`, `batch x rows x cols x 10`.
    /// Only the output network is required to produce it.
    pub landmarks: Option<Array4<f32>>,
}

impl Inference {
    /// Check that every tensor agrees with the batch the network was given.
    /// Returns the output grid size.
    pub(crate) fn validate(&self, stage: Stage, batch: usize) -> Result<(usize, usize), CascadeError> {
        let malformed = |reason: String| CascadeError::MalformedOutput { stage, reason };

        let (n, rows, cols) = self.scores.dim();
        if n != batch {
            return Err(malformed(format!("expected {} score maps, got {}", batch, n)));
        }
        if rows == 0 || cols == 0 {
            return Err(malformed(format!("empty score grid {}x{}", rows, cols)));
        }
        if self.regression.dim() != (n, rows, cols, 4) {
            return Err(malformed(format!(
                "regression shape {:?} does not match scores {:?}",
                self.regression.shape(),
                self.scores.shape()
            )));
        }
        if stage == Stage::Output {
            match &self.landmarks {
                Some(landmarks) if landmarks.dim() == (n, rows, cols, 10) => {}
                Some(landmarks) => {
                    return Err(malformed(format!(
                        "landmark shape {:?} does not match scores {:?}",
                        landmarks.shape(),
                        self.scores.shape()
                    )))
                }
                None => return Err(malformed("missing landmark regression".to_owned())),
            }
        }

        Ok((rows, cols))
    }

    pub(crate) fn regression_at(&self, index: usize, row: usize, col: usize) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (k, value) in out.iter_mut().enumerate() {
            *value = self.regression[[index, row, col, k]];
        }
        out
    }

    pub(crate) fn landmarks_at(&self, index: usize) -> Option<[f32; 10]> {
        self.landmarks.as_ref().map(|landmarks| {
            let mut out = [0.0; 10];
            for (k, value) in out.iter_mut().enumerate() {
                *value = landmarks[[index, 0, 0, k]];
            }
            out
        })
    }
}

/// An opaque inference unit bound to a fixed input size.
///
/// Input batches are `batch x height x width x 3` tensors of pixels
/// normalized with `(p - 127.5) / 128`.
pub trait Network: Send + Sync {
    /// Side of the square patches the network was trained on.
    fn input_size(&self) -> u32;

    fn infer(&self, batch: ArrayView4<'_, f32>) -> Result<Inference, BoxError>;
}

/// The three networks of the cascade.
pub struct Networks {
    pub proposal: Box<dyn Network>,
    pub refine: Box<dyn Network>,
    pub output: Box<dyn Network>,
}

impl Networks {
    pub fn new(
        proposal: Box<dyn Network>,
        refine: Box<dyn Network>,
        output: Box<dyn Network>,
    ) -> Self {
        Networks {
            proposal,
            refine,
            output,
        }
    }

    pub fn get(&self, stage: Stage) -> &dyn Network {
        match stage {
            Stage::Proposal => &*self.proposal,
            Stage::Refine => &*self.refine,
            Stage::Output => &*self.output,
        }
    }
}
