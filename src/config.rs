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

use serde::{Deserialize, Serialize};

use crate::error::CascadeError;

/// Detector settings. Fixed for the lifetime of a detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest face side, in pixels, the proposal scan looks for. Sets the
    /// first pyramid scale to `proposal input size / min_face_size`.
    pub min_face_size: u32,
    /// Factor between adjacent pyramid scales, in `(0, 1)`.
    pub scale_factor: f32,
    /// Score a proposal cell must exceed to become a candidate.
    pub proposal_threshold: f32,
    pub refine_threshold: f32,
    pub output_threshold: f32,
    /// IoU threshold for suppression within one pyramid scale.
    pub proposal_scale_nms: f32,
    /// IoU threshold for suppression across all pyramid scales.
    pub proposal_merge_nms: f32,
    pub refine_nms: f32,
    /// Overlap threshold (intersection over minimum area) of the output stage.
    pub output_nms: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_face_size: 24,
            scale_factor: 0.79,
            proposal_threshold: 0.9,
            refine_threshold: 0.6,
            output_threshold: 0.7,
            proposal_scale_nms: 0.5,
            proposal_merge_nms: 0.7,
            refine_nms: 0.6,
            output_nms: 0.6,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), CascadeError> {
        if self.min_face_size == 0 {
            return Err(CascadeError::InvalidConfig(
                "min_face_size must be positive".to_owned(),
            ));
        }
        if !(self.scale_factor > 0.0 && self.scale_factor < 1.0) {
            return Err(CascadeError::InvalidConfig(format!(
                "scale_factor must lie in (0, 1), got {}",
                self.scale_factor
            )));
        }

        let unit_values = [
            ("proposal_threshold", self.proposal_threshold),
            ("refine_threshold", self.refine_threshold),
            ("output_threshold", self.output_threshold),
            ("proposal_scale_nms", self.proposal_scale_nms),
            ("proposal_merge_nms", self.proposal_merge_nms),
            ("refine_nms", self.refine_nms),
            ("output_nms", self.output_nms),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(CascadeError::InvalidConfig(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let config = DetectorConfig {
            scale_factor: 1.0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            min_face_size: 0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            refine_nms: f32::NAN,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            output_threshold: 1.5,
            ..DetectorConfig::default()
        };
        match config.validate() {
            Err(CascadeError::InvalidConfig(message)) => assert!(message.contains("output_threshold")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{ "min_face_size": 40, "refine_threshold": 0.7 }"#).unwrap();
        assert_eq!(40, config.min_face_size);
        assert_eq!(0.7, config.refine_threshold);
        assert_eq!(0.79, config.scale_factor);
        assert!(config.validate().is_ok());
    }
}
