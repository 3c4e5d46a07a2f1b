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

use ndarray::{ArrayView2, ArrayView3, Axis};
use tracing::trace;

use super::{is_usable, CascadeDetector, StageOutput};
use crate::common::{BBox, ImageData, ImagePyramid, Stage};
use crate::error::CascadeError;
use crate::geometry;
use crate::nms::{non_maximum_suppression, OverlapMode};

// Output grid geometry of the proposal network: one cell per 2 input pixels,
// each cell seeing a 12x12 window. Tied to the network architecture.
const STRIDE: f32 = 2.0;
const CELL_SIZE: f32 = 12.0;

/// A proposal box together with the regression predicted for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub regression: [f32; 4],
}

/// Turn the proposal network's output grid at one pyramid scale into boxes in
/// original image coordinates.
///
/// `scores` is `rows x cols`, `regression` is `rows x cols x 4`. Every cell
/// scoring above `threshold` yields a candidate; cells are visited row by row.
/// NaN scores never pass.
pub fn generate_candidates(
    scores: ArrayView2<'_, f32>,
    regression: ArrayView3<'_, f32>,
    scale: f32,
    threshold: f32,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for ((row, col), &score) in scores.indexed_iter() {
        // also rejects NaN
        if !(score > threshold) {
            continue;
        }

        let x = STRIDE * col as f32;
        let y = STRIDE * row as f32;
        let bbox = BBox::new(
            (x / scale).round_ties_even(),
            (y / scale).round_ties_even(),
            ((x + CELL_SIZE) / scale).round_ties_even(),
            ((y + CELL_SIZE) / scale).round_ties_even(),
            score,
        );

        candidates.push(Candidate {
            bbox,
            regression: [
                regression[[row, col, 0]],
                regression[[row, col, 1]],
                regression[[row, col, 2]],
                regression[[row, col, 3]],
            ],
        });
    }

    candidates
}

impl CascadeDetector {
    /// Scan the image pyramid with the proposal network.
    pub(super) fn propose(&self, image: &ImageData) -> Result<Option<StageOutput>, CascadeError> {
        let network = &*self.networks.proposal;
        let net_size = network.input_size();
        let max_scale = net_size as f32 / self.config.min_face_size as f32;
        let pyramid = ImagePyramid::new(image, max_scale, self.config.scale_factor, net_size);

        let mut candidates: Vec<Candidate> = Vec::new();
        for (scale, image_scaled) in pyramid.levels() {
            let input = image_scaled.to_tensor();
            let inference = network
                .infer(input.view())
                .map_err(|source| CascadeError::Inference {
                    stage: Stage::Proposal,
                    source,
                })?;
            inference.validate(Stage::Proposal, 1)?;

            let level = generate_candidates(
                inference.scores.index_axis(Axis(0), 0),
                inference.regression.index_axis(Axis(0), 0),
                scale,
                self.config.proposal_threshold,
            );
            trace!(
                scale,
                width = image_scaled.width(),
                height = image_scaled.height(),
                candidates = level.len(),
                "scanned pyramid level"
            );
            if level.is_empty() {
                continue;
            }

            let bboxes: Vec<BBox> = level.iter().map(|c| c.bbox).collect();
            let keep =
                non_maximum_suppression(&bboxes, self.config.proposal_scale_nms, OverlapMode::Union);
            candidates.extend(keep.into_iter().map(|i| level[i]));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let bboxes: Vec<BBox> = candidates.iter().map(|c| c.bbox).collect();
        let keep =
            non_maximum_suppression(&bboxes, self.config.proposal_merge_nms, OverlapMode::Union);

        let raw = keep.iter().map(|&i| bboxes[i]).collect();
        let calibrated = keep
            .iter()
            .map(|&i| geometry::calibrate(&candidates[i].bbox, &candidates[i].regression))
            .filter(is_usable)
            .collect();

        Ok(StageOutput::new(raw, calibrated, Vec::new()))
    }
}
