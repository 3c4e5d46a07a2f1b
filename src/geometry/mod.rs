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

//! Box geometry shared by every stage of the cascade.
//!
//! All routines use inclusive pixel extents: a box from `x1` to `x2` is
//! `x2 - x1 + 1` pixels wide.

use crate::common::{BBox, ImageData, Landmarks};

/// Area of the intersection of two boxes, zero when they don't overlap.
pub fn intersection_area(a: &BBox, b: &BBox) -> f32 {
    let w = a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0;
    let h = a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0;
    if w <= 0.0 || h <= 0.0 {
        0.0
    } else {
        w * h
    }
}

/// Intersection-over-union of `bbox` against each of `others`.
///
/// Pairs whose union is not positive yield 0 instead of NaN.
pub fn iou(bbox: &BBox, others: &[BBox]) -> Vec<f32> {
    others
        .iter()
        .map(|other| {
            let inter = intersection_area(bbox, other);
            let union = bbox.area() + other.area() - inter;
            if inter <= 0.0 || union <= 0.0 {
                0.0
            } else {
                inter / union
            }
        })
        .collect()
}

/// Expand a box to a square of side `max(width, height)` around the same centre.
pub fn square(bbox: &BBox) -> BBox {
    let w = bbox.width();
    let h = bbox.height();
    let side = w.max(h);
    let x1 = bbox.x1 + w * 0.5 - side * 0.5;
    let y1 = bbox.y1 + h * 0.5 - side * 0.5;

    BBox {
        x1,
        y1,
        x2: x1 + side - 1.0,
        y2: y1 + side - 1.0,
        score: bbox.score,
    }
}

/// Round the corners to integer pixels, halves to even.
pub fn round(bbox: &BBox) -> BBox {
    BBox {
        x1: bbox.x1.round_ties_even(),
        y1: bbox.y1.round_ties_even(),
        x2: bbox.x2.round_ties_even(),
        y2: bbox.y2.round_ties_even(),
        score: bbox.score,
    }
}

/// Shift each corner by its regression offset scaled by the box size.
///
/// `regression` is `(dx1, dy1, dx2, dy2)`; x offsets scale by the width and
/// y offsets by the height.
pub fn calibrate(bbox: &BBox, regression: &[f32; 4]) -> BBox {
    let w = bbox.width();
    let h = bbox.height();

    BBox {
        x1: bbox.x1 + regression[0] * w,
        y1: bbox.y1 + regression[1] * h,
        x2: bbox.x2 + regression[2] * w,
        y2: bbox.y2 + regression[3] * h,
        score: bbox.score,
    }
}

/// Turn relative landmark offsets `(x0, y0, x1, y1, ...)` into absolute
/// coordinates using the box's top-left corner and size.
pub fn decode_landmarks(bbox: &BBox, offsets: &[f32; 10]) -> Landmarks {
    let w = bbox.width();
    let h = bbox.height();
    let mut landmarks = Landmarks::default();
    for (point, offset) in landmarks.points.iter_mut().zip(offsets.chunks_exact(2)) {
        *point = (
            w * offset[0] + bbox.x1 - 1.0,
            h * offset[1] + bbox.y1 - 1.0,
        );
    }
    landmarks
}

/// Where a box lands relative to the image it is cropped from.
///
/// The crop canvas is `width x height`. Rows `y..=ey` and columns `x..=ex` of
/// the image are copied to rows `dy..=edy` and columns `dx..=edx` of the
/// canvas. Everything else on the canvas stays zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PadRegion {
    pub dy: i32,
    pub edy: i32,
    pub dx: i32,
    pub edx: i32,
    pub y: i32,
    pub ey: i32,
    pub x: i32,
    pub ex: i32,
    pub width: i32,
    pub height: i32,
}

/// Crops larger than this multiple of the image's longer side are rejected.
const MAX_CROP_FACTOR: i64 = 4;

/// Clip an integer box against an `image_width x image_height` image.
///
/// Returns `None` when the box is empty, lies entirely outside the image, or
/// is more than `MAX_CROP_FACTOR` times larger than the image's longer side.
pub fn pad(bbox: &BBox, image_width: u32, image_height: u32) -> Option<PadRegion> {
    let w = i64::from(image_width);
    let h = i64::from(image_height);

    if bbox.is_degenerate() {
        return None;
    }
    // f32 to i64 saturates, and the extents below are checked
    let mut x = bbox.x1 as i64;
    let mut y = bbox.y1 as i64;
    let mut ex = bbox.x2 as i64;
    let mut ey = bbox.y2 as i64;

    if ex < 0 || ey < 0 || x > w - 1 || y > h - 1 {
        return None;
    }

    let width = ex.checked_sub(x)?.checked_add(1)?;
    let height = ey.checked_sub(y)?.checked_add(1)?;
    let max_side = MAX_CROP_FACTOR * w.max(h);
    if width <= 0 || height <= 0 || width > max_side || height > max_side {
        return None;
    }

    let mut dx = 0;
    let mut dy = 0;
    let mut edx = width - 1;
    let mut edy = height - 1;

    if ex > w - 1 {
        edx = width + w - 2 - ex;
        ex = w - 1;
    }
    if ey > h - 1 {
        edy = height + h - 2 - ey;
        ey = h - 1;
    }
    if x < 0 {
        dx = -x;
        x = 0;
    }
    if y < 0 {
        dy = -y;
        y = 0;
    }

    if x > ex || y > ey {
        return None;
    }

    let narrow = |value: i64| i32::try_from(value).ok();
    Some(PadRegion {
        dy: narrow(dy)?,
        edy: narrow(edy)?,
        dx: narrow(dx)?,
        edx: narrow(edx)?,
        y: narrow(y)?,
        ey: narrow(ey)?,
        x: narrow(x)?,
        ex: narrow(ex)?,
        width: narrow(width)?,
        height: narrow(height)?,
    })
}

/// Copy the clipped region of `image` onto a zero canvas of the region's size.
pub fn crop_padded(image: &ImageData, region: &PadRegion) -> ImageData {
    let mut canvas = ImageData::blank(region.width as u32, region.height as u32);
    let len = (region.ex - region.x + 1) as u32;

    for (dest_y, src_y) in (region.dy..=region.edy).zip(region.y..=region.ey) {
        let src = image.row_span(region.x as u32, src_y as u32, len);
        canvas
            .row_span_mut(region.dx as u32, dest_y as u32, len)
            .copy_from_slice(src);
    }

    canvas
}
