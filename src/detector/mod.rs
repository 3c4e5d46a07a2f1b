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

mod proposal;
mod refine;

use std::time::Instant;

use tracing::{debug, info, trace};

use crate::common::{BBox, Detection, ImageData, Landmarks, Stage};
use crate::config::DetectorConfig;
use crate::error::CascadeError;
use crate::model::{check_input_size, load_networks, ModelProvider};
use crate::network::Networks;
use crate::Detector;

pub use self::proposal::{generate_candidates, Candidate};
pub(crate) use self::refine::extract_patch;

impl Detector for CascadeDetector {
    fn detect(&self, image: &ImageData, last_stage: Stage) -> Result<Detection, CascadeError> {
        let mut detection = Detection::default();

        for stage in last_stage.up_to() {
            let started = Instant::now();
            let output = match stage {
                Stage::Proposal => self.propose(image)?,
                Stage::Refine => self.refine(image, &detection.boxes)?,
                Stage::Output => self.output(image, &detection.boxes)?,
            };
            let elapsed = started.elapsed();
            detection.timings.record(stage, elapsed);

            match output {
                Some(output) => {
                    debug!(
                        %stage,
                        raw = output.raw.len(),
                        calibrated = output.calibrated.len(),
                        ?elapsed,
                        "stage finished"
                    );
                    detection.boxes = output.calibrated;
                    detection.landmarks = output.landmarks;
                }
                None => {
                    debug!(%stage, ?elapsed, "no candidates left");
                    return Ok(Detection {
                        timings: detection.timings,
                        ..Detection::default()
                    });
                }
            }
        }

        Ok(detection)
    }

    fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

/// The three-stage cascade.
///
/// Holds no mutable state, so one detector can serve many threads.
pub struct CascadeDetector {
    networks: Networks,
    config: DetectorConfig,
}

impl CascadeDetector {
    pub fn new(networks: Networks, config: DetectorConfig) -> Result<Self, CascadeError> {
        config.validate()?;
        for stage in Stage::ALL {
            check_input_size(stage, networks.get(stage))?;
        }

        info!(
            min_face_size = config.min_face_size,
            scale_factor = config.scale_factor,
            "created cascade detector"
        );

        Ok(CascadeDetector { networks, config })
    }

    pub fn from_provider<P>(provider: &P, config: DetectorConfig) -> Result<Self, CascadeError>
    where
        P: ModelProvider + ?Sized,
    {
        let networks = load_networks(provider)?;
        Self::new(networks, config)
    }

    pub fn networks(&self) -> &Networks {
        &self.networks
    }
}

/// Boxes a stage hands to the next one.
pub(crate) struct StageOutput {
    /// Boxes before calibration.
    raw: Vec<BBox>,
    calibrated: Vec<BBox>,
    /// Parallel to `calibrated` for the output stage, empty otherwise.
    landmarks: Vec<Landmarks>,
}

impl StageOutput {
    /// `None` when no calibrated box survived, which ends detection.
    fn new(raw: Vec<BBox>, calibrated: Vec<BBox>, landmarks: Vec<Landmarks>) -> Option<Self> {
        if calibrated.is_empty() {
            None
        } else {
            Some(StageOutput {
                raw,
                calibrated,
                landmarks,
            })
        }
    }
}

fn is_usable(bbox: &BBox) -> bool {
    if bbox.is_degenerate() {
        trace!(?bbox, "dropping degenerate box");
        false
    } else {
        true
    }
}
