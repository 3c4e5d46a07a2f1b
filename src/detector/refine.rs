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

use ndarray::Array4;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, trace};

use super::{is_usable, CascadeDetector, StageOutput};
use crate::common::{normalize_into, resize_image, BBox, ImageData, Landmarks, Stage};
use crate::error::CascadeError;
use crate::geometry;
use crate::network::{Inference, Network};
use crate::nms::{non_maximum_suppression, OverlapMode};

/// Crop `bbox` out of `image`, zero-filling whatever lies outside it, and
/// resize the crop to `size x size`.
///
/// `None` when the box is empty or entirely outside the image.
pub(crate) fn extract_patch(image: &ImageData, bbox: &BBox, size: u32) -> Option<ImageData> {
    let region = geometry::pad(bbox, image.width(), image.height())?;
    let crop = geometry::crop_padded(image, &region);
    Some(resize_image(&crop, size, size))
}

/// Square and round every box, then cut the patches the next network sees.
///
/// Returns the boxes that produced a patch, in input order, together with the
/// normalized `n x size x size x 3` batch.
fn crop_patches(image: &ImageData, boxes: &[BBox], size: u32) -> (Vec<BBox>, Array4<f32>) {
    let squared: Vec<BBox> = boxes
        .iter()
        .map(|bbox| geometry::round(&geometry::square(bbox)))
        .collect();

    #[cfg(feature = "rayon")]
    let patches: Vec<Option<ImageData>> = squared
        .par_iter()
        .map(|bbox| extract_patch(image, bbox, size))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let patches: Vec<Option<ImageData>> = squared
        .iter()
        .map(|bbox| extract_patch(image, bbox, size))
        .collect();

    let (kept, patches): (Vec<BBox>, Vec<ImageData>) = squared
        .into_iter()
        .zip(patches)
        .filter_map(|(bbox, patch)| match patch {
            Some(patch) => Some((bbox, patch)),
            None => {
                trace!(?bbox, "box cannot be cropped from the image");
                None
            }
        })
        .unzip();

    let side = size as usize;
    let mut batch = Array4::zeros((patches.len(), side, side, 3));
    for (patch, out) in patches.iter().zip(batch.outer_iter_mut()) {
        normalize_into(patch, out);
    }

    (kept, batch)
}

fn run_network(
    network: &dyn Network,
    stage: Stage,
    batch: &Array4<f32>,
) -> Result<Inference, CascadeError> {
    let inference = network
        .infer(batch.view())
        .map_err(|source| CascadeError::Inference { stage, source })?;
    inference.validate(stage, batch.dim().0)?;
    Ok(inference)
}

impl CascadeDetector {
    /// Re-score proposal boxes on 24x24 patches.
    pub(super) fn refine(
        &self,
        image: &ImageData,
        boxes: &[BBox],
    ) -> Result<Option<StageOutput>, CascadeError> {
        let network = &*self.networks.refine;
        let (squared, batch) = crop_patches(image, boxes, network.input_size());
        if squared.is_empty() {
            return Ok(None);
        }
        let inference = run_network(network, Stage::Refine, &batch)?;

        let mut passed = Vec::new();
        let mut regressions = Vec::new();
        for (i, bbox) in squared.iter().enumerate() {
            let score = inference.scores[[i, 0, 0]];
            if score > self.config.refine_threshold {
                passed.push(BBox { score, ..*bbox });
                regressions.push(inference.regression_at(i, 0, 0));
            }
        }
        trace!(patches = squared.len(), passed = passed.len(), "refine scores");
        if passed.is_empty() {
            return Ok(None);
        }

        let keep = non_maximum_suppression(&passed, self.config.refine_nms, OverlapMode::Union);
        let raw = keep.iter().map(|&i| passed[i]).collect();
        let calibrated = keep
            .iter()
            .map(|&i| geometry::calibrate(&passed[i], &regressions[i]))
            .filter(is_usable)
            .collect();

        Ok(StageOutput::new(raw, calibrated, Vec::new()))
    }

    /// Final scoring, box calibration and landmark regression on 48x48 patches.
    pub(super) fn output(
        &self,
        image: &ImageData,
        boxes: &[BBox],
    ) -> Result<Option<StageOutput>, CascadeError> {
        let network = &*self.networks.output;
        let (squared, batch) = crop_patches(image, boxes, network.input_size());
        if squared.is_empty() {
            return Ok(None);
        }
        let inference = run_network(network, Stage::Output, &batch)?;

        let mut passed = Vec::new();
        let mut calibrated = Vec::new();
        let mut landmarks = Vec::new();
        for (i, bbox) in squared.iter().enumerate() {
            let score = inference.scores[[i, 0, 0]];
            if !(score > self.config.output_threshold) {
                continue;
            }
            let offsets = inference
                .landmarks_at(i)
                .ok_or_else(|| CascadeError::MalformedOutput {
                    stage: Stage::Output,
                    reason: "missing landmark regression".to_owned(),
                })?;

            let bbox = BBox { score, ..*bbox };
            landmarks.push(geometry::decode_landmarks(&bbox, &offsets));
            calibrated.push(geometry::calibrate(&bbox, &inference.regression_at(i, 0, 0)));
            passed.push(bbox);
        }
        if passed.is_empty() {
            return Ok(None);
        }

        // Suppression over the uncalibrated boxes only decides what is reported
        // as `raw`; the final selection runs on the calibrated boxes below.
        let raw_keep = non_maximum_suppression(&passed, self.config.output_nms, OverlapMode::Minimum);
        let raw: Vec<BBox> = raw_keep.iter().map(|&i| passed[i]).collect();

        let (calibrated, landmarks): (Vec<BBox>, Vec<Landmarks>) = calibrated
            .into_iter()
            .zip(landmarks)
            .filter(|(bbox, _)| is_usable(bbox))
            .unzip();

        let keep = non_maximum_suppression(&calibrated, self.config.output_nms, OverlapMode::Minimum);
        debug!(
            raw_kept = raw.len(),
            calibrated_kept = keep.len(),
            "output suppression"
        );

        Ok(StageOutput::new(
            raw,
            keep.iter().map(|&i| calibrated[i]).collect(),
            keep.iter().map(|&i| landmarks[i]).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, ArrayView4};

    use super::*;
    use crate::config::DetectorConfig;
    use crate::network::{BoxError, Networks};

    /// Patch network answering with a fixed score per batch index.
    struct Scripted {
        size: u32,
        scores: Vec<f32>,
        regression: [f32; 4],
        landmark: f32,
    }

    impl Network for Scripted {
        fn input_size(&self) -> u32 {
            self.size
        }

        fn infer(&self, batch: ArrayView4<'_, f32>) -> Result<Inference, BoxError> {
            let n = batch.dim().0;
            let mut scores = Array3::zeros((n, 1, 1));
            let mut regression = Array4::zeros((n, 1, 1, 4));
            for i in 0..n {
                scores[[i, 0, 0]] = self.scores.get(i).copied().unwrap_or(0.0);
                for k in 0..4 {
                    regression[[i, 0, 0, k]] = self.regression[k];
                }
            }
            Ok(Inference {
                scores,
                regression,
                landmarks: Some(Array4::from_elem((n, 1, 1, 10), self.landmark)),
            })
        }
    }

    fn scripted(size: u32, scores: &[f32], regression: [f32; 4]) -> Box<dyn Network> {
        Box::new(Scripted {
            size,
            scores: scores.to_vec(),
            regression,
            landmark: 0.5,
        })
    }

    fn detector(refine: &[f32], output: &[f32], regression: [f32; 4]) -> CascadeDetector {
        let networks = Networks::new(
            scripted(12, &[], [0.0; 4]),
            scripted(24, refine, regression),
            scripted(48, output, regression),
        );
        CascadeDetector::new(networks, DetectorConfig::default()).unwrap()
    }

    fn gray_image() -> ImageData {
        ImageData::new(vec![128; 100 * 100 * 3], 100, 100).unwrap()
    }

    #[test]
    fn test_crop_patches_skips_boxes_outside_the_image() {
        let image = gray_image();
        let boxes = [
            BBox::new(10.0, 10.0, 29.0, 29.0, 0.9),
            BBox::new(200.0, 200.0, 219.0, 219.0, 0.9),
            BBox::new(90.0, 90.0, 109.0, 109.0, 0.9),
        ];
        let (kept, batch) = crop_patches(&image, &boxes, 24);
        assert_eq!(vec![boxes[0], boxes[2]], kept);
        assert_eq!((2, 24, 24, 3), batch.dim());
        // 128 normalizes to 0.5 / 128
        assert_eq!(0.00390625, batch[[0, 12, 12, 0]]);
        // bottom-right corner of the second patch is zero padding
        assert_eq!(-127.5 / 128.0, batch[[1, 23, 23, 2]]);
    }

    #[test]
    fn test_crop_patches_squares_boxes() {
        let (kept, _) = crop_patches(&gray_image(), &[BBox::new(10.0, 20.0, 29.0, 59.0, 0.9)], 24);
        assert_eq!(BBox::new(0.0, 20.0, 39.0, 59.0, 0.9), kept[0]);
    }

    #[test]
    fn test_refine_applies_threshold() {
        let detector = detector(&[0.5, 0.9], &[], [0.0; 4]);
        let boxes = [
            BBox::new(0.0, 0.0, 29.0, 29.0, 0.99),
            BBox::new(50.0, 50.0, 79.0, 79.0, 0.99),
        ];
        let output = detector.refine(&gray_image(), &boxes).unwrap().unwrap();
        assert_eq!(vec![BBox::new(50.0, 50.0, 79.0, 79.0, 0.9)], output.calibrated);
        assert!(output.landmarks.is_empty());
    }

    #[test]
    fn test_refine_nothing_passes() {
        let detector = detector(&[0.1], &[], [0.0; 4]);
        let boxes = [BBox::new(0.0, 0.0, 29.0, 29.0, 0.99)];
        assert!(detector.refine(&gray_image(), &boxes).unwrap().is_none());
    }

    #[test]
    fn test_output_decodes_landmarks_and_suppresses_nested_boxes() {
        let detector = detector(&[], &[0.95, 0.8], [0.0; 4]);
        let boxes = [
            BBox::new(20.0, 20.0, 69.0, 69.0, 0.99),
            BBox::new(30.0, 30.0, 49.0, 49.0, 0.99),
        ];
        let output = detector.output(&gray_image(), &boxes).unwrap().unwrap();

        assert_eq!(vec![BBox::new(20.0, 20.0, 69.0, 69.0, 0.95)], output.calibrated);
        // the pass over uncalibrated boxes drops the nested box as well
        assert_eq!(vec![BBox::new(20.0, 20.0, 69.0, 69.0, 0.95)], output.raw);
        assert_eq!(1, output.landmarks.len());
        // 50 * 0.5 + 20 - 1
        assert_eq!([(44.0, 44.0); 5], output.landmarks[0].points);
    }

    #[test]
    fn test_output_drops_degenerate_boxes() {
        let detector = detector(&[], &[0.95], [0.0, 0.0, -2.0, 0.0]);
        let boxes = [BBox::new(20.0, 20.0, 69.0, 69.0, 0.99)];
        assert!(detector.output(&gray_image(), &boxes).unwrap().is_none());
    }

    #[test]
    fn test_output_raw_boxes_are_uncalibrated() {
        let detector = detector(&[], &[0.95], [0.1, 0.1, 0.1, 0.1]);
        let boxes = [BBox::new(20.0, 20.0, 69.0, 69.0, 0.99)];
        let output = detector.output(&gray_image(), &boxes).unwrap().unwrap();

        assert_eq!(vec![BBox::new(20.0, 20.0, 69.0, 69.0, 0.95)], output.raw);
        assert_eq!(vec![BBox::new(25.0, 25.0, 74.0, 74.0, 0.95)], output.calibrated);
    }

    #[test]
    fn test_nan_scores_never_pass() {
        let detector = detector(&[f32::NAN], &[f32::NAN], [0.0; 4]);
        let boxes = [BBox::new(20.0, 20.0, 69.0, 69.0, 0.99)];
        assert!(detector.refine(&gray_image(), &boxes).unwrap().is_none());
        assert!(detector.output(&gray_image(), &boxes).unwrap().is_none());
    }
}
