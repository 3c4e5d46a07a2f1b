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

//! Hard-sample mining: run the cascade over annotated images and sort what it
//! finds into training samples for the next stage.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{BBox, ImageData, Stage};
use crate::detector::extract_patch;
use crate::error::CascadeError;
use crate::geometry;
use crate::Detector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    Positive,
    Part,
    Negative,
}

impl SampleKind {
    /// Training label: 1 for positives, -1 for part faces, 0 for negatives.
    pub fn label(self) -> i32 {
        match self {
            SampleKind::Positive => 1,
            SampleKind::Part => -1,
            SampleKind::Negative => 0,
        }
    }
}

/// IoU thresholds deciding the kind of a detected box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningThresholds {
    pub positive: f32,
    pub part: f32,
    pub negative: f32,
    pub max_negatives_per_image: usize,
}

impl Default for MiningThresholds {
    fn default() -> Self {
        MiningThresholds {
            positive: 0.65,
            part: 0.4,
            negative: 0.3,
            max_negatives_per_image: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HardSample {
    /// Squared, rounded detection in image coordinates.
    pub bbox: BBox,
    pub kind: SampleKind,
    /// Offsets from `bbox` to the best matching ground-truth box, relative to
    /// the box size. `None` for negatives.
    pub offsets: Option<[f32; 4]>,
}

/// Classify detected boxes against the annotated faces of one image.
pub fn classify_detections(
    detected: &[BBox],
    ground_truth: &[BBox],
    image_width: u32,
    image_height: u32,
    min_face: u32,
    thresholds: &MiningThresholds,
) -> Vec<HardSample> {
    let max_x = image_width as f32 - 1.0;
    let max_y = image_height as f32 - 1.0;
    let mut negatives = 0;
    let mut samples = Vec::new();

    for bbox in detected {
        let bbox = geometry::round(&geometry::square(bbox));
        let size = bbox.width();
        if size < min_face as f32
            || bbox.x1 < 0.0
            || bbox.y1 < 0.0
            || bbox.x2 > max_x
            || bbox.y2 > max_y
        {
            continue;
        }

        let best = geometry::iou(&bbox, ground_truth)
            .into_iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, iou)| match best {
                Some((_, max)) if max >= iou => best,
                _ => Some((i, iou)),
            });
        let max_iou = best.map_or(0.0, |(_, iou)| iou);

        if max_iou < thresholds.negative && negatives < thresholds.max_negatives_per_image {
            negatives += 1;
            samples.push(HardSample {
                bbox,
                kind: SampleKind::Negative,
                offsets: None,
            });
            continue;
        }

        let kind = if max_iou >= thresholds.positive {
            SampleKind::Positive
        } else if max_iou >= thresholds.part {
            SampleKind::Part
        } else {
            continue;
        };

        if let Some((i, _)) = best {
            let truth = &ground_truth[i];
            let height = bbox.height();
            samples.push(HardSample {
                bbox,
                kind,
                offsets: Some([
                    (truth.x1 - bbox.x1) / size,
                    (truth.y1 - bbox.y1) / height,
                    (truth.x2 - bbox.x2) / size,
                    (truth.y2 - bbox.y2) / height,
                ]),
            });
        }
    }

    samples
}

/// Collects training patches for one cascade stage from the stages before it.
pub struct HardSampleMiner<'a> {
    detector: &'a dyn Detector,
    thresholds: MiningThresholds,
    min_face: u32,
}

impl<'a> HardSampleMiner<'a> {
    pub fn new(detector: &'a dyn Detector, thresholds: MiningThresholds, min_face: u32) -> Self {
        HardSampleMiner {
            detector,
            thresholds,
            min_face,
        }
    }

    /// Detect with the stages preceding `target_stage` and return every
    /// classified sample with its patch, sized for `target_stage`'s network.
    ///
    /// Samples for the proposal stage are mined from the proposal stage itself.
    pub fn mine(
        &self,
        image: &ImageData,
        ground_truth: &[BBox],
        target_stage: Stage,
    ) -> Result<Vec<(HardSample, ImageData)>, CascadeError> {
        let detect_stage = target_stage.previous().unwrap_or(Stage::Proposal);
        let detection = self.detector.detect(image, detect_stage)?;

        let samples = classify_detections(
            &detection.boxes,
            ground_truth,
            image.width(),
            image.height(),
            self.min_face,
            &self.thresholds,
        );
        debug!(
            %target_stage,
            detected = detection.len(),
            samples = samples.len(),
            "mined image"
        );

        let size = target_stage.input_size();
        Ok(samples
            .into_iter()
            .filter_map(|sample| {
                extract_patch(image, &sample.bbox, size).map(|patch| (sample, patch))
            })
            .collect())
    }
}
