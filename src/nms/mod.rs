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

use crate::common::BBox;
use crate::geometry::intersection_area;

/// How the overlap between two boxes is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlapMode {
    /// Intersection over union.
    Union,
    /// Intersection over the smaller of the two areas.
    Minimum,
}

impl OverlapMode {
    pub fn overlap(self, a: &BBox, b: &BBox) -> f32 {
        let area_intersect = intersection_area(a, b);
        if area_intersect <= 0.0 {
            return 0.0;
        }

        let area_base = match self {
            OverlapMode::Union => a.area() + b.area() - area_intersect,
            OverlapMode::Minimum => a.area().min(b.area()),
        };
        if area_base <= 0.0 {
            return 0.0;
        }
        area_intersect / area_base
    }
}

/// Greedy non-maximum suppression.
///
/// Boxes are visited by descending score; equal scores keep their input
/// order. Scores are compared with `f32::total_cmp`, so a NaN score never
/// breaks the ordering. Each visited box is kept and removes every remaining
/// box whose overlap with it exceeds `thresh`. Returns indices into `bboxes`
/// in the order they were kept.
pub fn non_maximum_suppression(bboxes: &[BBox], thresh: f32, mode: OverlapMode) -> Vec<usize> {
    let mut order: Vec<usize> = (0..bboxes.len()).collect();
    // stable sort, so ties resolve to the lower index; NaN scores sort first
    order.sort_by(|&x, &y| bboxes[y].score.total_cmp(&bboxes[x].score));

    let mut keep = Vec::new();
    let mut select_idx = 0;
    let mut mask_merged = vec![false; order.len()];

    loop {
        while select_idx < order.len() && mask_merged[select_idx] {
            select_idx += 1;
        }

        if select_idx == order.len() {
            break;
        }

        let selected = &bboxes[order[select_idx]];
        keep.push(order[select_idx]);
        mask_merged[select_idx] = true;
        select_idx += 1;

        for i in select_idx..order.len() {
            if mask_merged[i] {
                continue;
            }
            if mode.overlap(selected, &bboxes[order[i]]) > thresh {
                mask_merged[i] = true;
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> BBox {
        BBox::new(x1, y1, x2, y2, score)
    }

    fn sample() -> Vec<BBox> {
        vec![
            bbox(0.0, 0.0, 9.0, 9.0, 0.6),
            bbox(1.0, 1.0, 10.0, 10.0, 0.9),
            bbox(50.0, 50.0, 59.0, 59.0, 0.7),
            bbox(2.0, 0.0, 11.0, 9.0, 0.8),
            bbox(52.0, 50.0, 61.0, 59.0, 0.3),
        ]
    }

    fn select(bboxes: &[BBox], keep: &[usize]) -> Vec<BBox> {
        keep.iter().map(|&i| bboxes[i]).collect()
    }

    #[test]
    fn test_suppresses_overlapping() {
        assert_eq!(vec![1, 2], non_maximum_suppression(&sample(), 0.5, OverlapMode::Union));
    }

    #[test]
    fn test_empty_input() {
        assert!(non_maximum_suppression(&[], 0.5, OverlapMode::Union).is_empty());
    }

    #[test]
    fn test_threshold_one_keeps_all_in_score_order() {
        let keep = non_maximum_suppression(&sample(), 1.0, OverlapMode::Union);
        assert_eq!(vec![1, 3, 2, 0, 4], keep);
        let keep = non_maximum_suppression(&sample(), 1.0, OverlapMode::Minimum);
        assert_eq!(vec![1, 3, 2, 0, 4], keep);
    }

    #[test]
    fn test_threshold_zero_keeps_only_top_of_overlapping_set() {
        let bboxes = vec![
            bbox(0.0, 0.0, 9.0, 9.0, 0.2),
            bbox(8.0, 8.0, 20.0, 20.0, 0.5),
            bbox(5.0, 0.0, 30.0, 9.0, 0.4),
        ];
        assert_eq!(vec![1], non_maximum_suppression(&bboxes, 0.0, OverlapMode::Union));
    }

    #[test]
    fn test_idempotent() {
        for mode in [OverlapMode::Union, OverlapMode::Minimum] {
            let bboxes = sample();
            let first = select(&bboxes, &non_maximum_suppression(&bboxes, 0.3, mode));
            let second = select(&first, &non_maximum_suppression(&first, 0.3, mode));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_ties_break_by_input_order() {
        let bboxes = vec![
            bbox(0.0, 0.0, 9.0, 9.0, 0.9),
            bbox(1.0, 0.0, 10.0, 9.0, 0.9),
            bbox(2.0, 0.0, 11.0, 9.0, 0.9),
            bbox(100.0, 0.0, 109.0, 9.0, 0.9),
        ];
        for _ in 0..10 {
            assert_eq!(vec![0, 3], non_maximum_suppression(&bboxes, 0.5, OverlapMode::Union));
        }

        let reversed: Vec<BBox> = bboxes.iter().rev().cloned().collect();
        assert_eq!(vec![0, 1], non_maximum_suppression(&reversed, 0.5, OverlapMode::Union));
    }

    #[test]
    fn test_minimum_mode_suppresses_nested_box() {
        let bboxes = vec![
            bbox(0.0, 0.0, 99.0, 99.0, 0.9),
            bbox(10.0, 10.0, 29.0, 29.0, 0.8),
        ];
        // a small box inside a large one: low IoU, full overlap of the smaller area
        assert_eq!(vec![0, 1], non_maximum_suppression(&bboxes, 0.6, OverlapMode::Union));
        assert_eq!(vec![0], non_maximum_suppression(&bboxes, 0.6, OverlapMode::Minimum));
    }

    #[test]
    fn test_nan_scores_keep_a_total_order() {
        let bboxes: Vec<BBox> = (0..64)
            .map(|i| {
                let x = 20.0 * i as f32;
                let score = if i % 3 == 0 { f32::NAN } else { (i % 7) as f32 / 10.0 };
                bbox(x, 0.0, x + 9.0, 9.0, score)
            })
            .collect();

        let keep = non_maximum_suppression(&bboxes, 0.5, OverlapMode::Union);
        assert_eq!(64, keep.len());

        let finite: Vec<f32> = keep
            .iter()
            .map(|&i| bboxes[i].score)
            .filter(|score| !score.is_nan())
            .collect();
        assert!(finite.windows(2).all(|pair| pair[0] >= pair[1]));
    }
}
