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

mod image_pyramid;

use std::fmt;
use std::mem;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::image_pyramid::{normalize_into, resize_image, ImageData, ImagePyramid};

/// A stage of the cascade. Stages are ordered, so `Stage::Refine` as the last
/// stage means "run Proposal, then Refine".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Proposal,
    Refine,
    Output,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Proposal, Stage::Refine, Stage::Output];

    /// Spatial input size the stage's network is trained for.
    pub fn input_size(self) -> u32 {
        match self {
            Stage::Proposal => 12,
            Stage::Refine => 24,
            Stage::Output => 48,
        }
    }

    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Proposal => None,
            Stage::Refine => Some(Stage::Proposal),
            Stage::Output => Some(Stage::Refine),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Proposal => "PNet",
            Stage::Refine => "RNet",
            Stage::Output => "ONet",
        }
    }

    /// All stages from the first one up to and including `self`.
    pub fn up_to(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().take_while(move |stage| *stage <= self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown cascade stage: {0}")]
pub struct ParseStageError(String);

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pnet" | "proposal" => Ok(Stage::Proposal),
            "rnet" | "refine" => Ok(Stage::Refine),
            "onet" | "output" => Ok(Stage::Output),
            _ => Err(ParseStageError(s.to_owned())),
        }
    }
}

/// Bounding box in image pixel coordinates.
///
/// Both corners are inclusive, so a box spans `x2 - x1 + 1` pixels horizontally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        BBox {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// A box is degenerate when its corners are out of order or not finite.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.x2 < self.x1 || self.y2 < self.y1
    }
}

/// Five facial keypoints in absolute image coordinates: left eye, right eye,
/// nose, left and right mouth corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: [(f32, f32); 5],
}

/// Wall time spent in each stage of a single `detect` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub proposal: Duration,
    pub refine: Duration,
    pub output: Duration,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        match stage {
            Stage::Proposal => self.proposal = elapsed,
            Stage::Refine => self.refine = elapsed,
            Stage::Output => self.output = elapsed,
        }
    }

    pub fn total(&self) -> Duration {
        self.proposal + self.refine + self.output
    }
}

/// Result of running the cascade on one image.
///
/// `boxes` holds the calibrated boxes of the last stage that ran.
/// `landmarks` is parallel to `boxes` when the output stage ran, empty otherwise.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub boxes: Vec<BBox>,
    pub landmarks: Vec<Landmarks>,
    pub timings: StageTimings,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }
}

pub struct Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    generator: G,
    next: T,
}

impl<T, G> Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    pub fn new(first_element: T, generator: G) -> Self {
        Seq {
            generator,
            next: first_element,
        }
    }
}

impl<T, G> Iterator for Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let next = (self.generator)(&self.next);
        let current = mem::replace(&mut self.next, next);
        Some(current)
    }
}
