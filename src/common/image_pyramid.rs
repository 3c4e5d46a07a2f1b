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

use std::cmp;
use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::{Array4, ArrayViewMut3, Axis};

use crate::common::Seq;
use crate::error::CascadeError;

const NUM_CHANNELS: usize = 3;

/// Owned, row-major, interleaved RGB image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    /// Wrap an RGB buffer of exactly `width * height * 3` bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, CascadeError> {
        if width == 0 || height == 0 {
            return Err(CascadeError::InvalidImage(format!(
                "illegal dimensions {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * NUM_CHANNELS;
        if data.len() != expected {
            return Err(CascadeError::InvalidImage(format!(
                "expected {} bytes for a {}x{} RGB image, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(ImageData {
            data,
            width,
            height,
        })
    }

    /// Read and decode an image file, converting it to RGB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CascadeError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| CascadeError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_rgb_image(&image.to_rgb8())
    }

    pub fn from_rgb_image(image: &RgbImage) -> Result<Self, CascadeError> {
        let (width, height) = image.dimensions();
        Self::new(image.as_raw().clone(), width, height)
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| Rgb(self.pixel(x, y)))
    }

    /// All-black image. Used as the zero padding canvas for crops.
    pub(crate) fn blank(width: u32, height: u32) -> Self {
        ImageData {
            data: vec![0; width as usize * height as usize * NUM_CHANNELS],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_channels(&self) -> u32 {
        NUM_CHANNELS as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = self.offset(x, y);
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Pixels `x..x + len` of row `y`, channels interleaved.
    pub(crate) fn row_span(&self, x: u32, y: u32, len: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + len as usize * NUM_CHANNELS]
    }

    pub(crate) fn row_span_mut(&mut self, x: u32, y: u32, len: u32) -> &mut [u8] {
        let start = self.offset(x, y);
        &mut self.data[start..start + len as usize * NUM_CHANNELS]
    }

    /// Normalized `1 x height x width x 3` tensor of the whole image.
    pub fn to_tensor(&self) -> Array4<f32> {
        let mut tensor = Array4::zeros((1, self.height as usize, self.width as usize, NUM_CHANNELS));
        normalize_into(self, tensor.index_axis_mut(Axis(0), 0));
        tensor
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * NUM_CHANNELS
    }
}

/// Write `(pixel - 127.5) / 128` for every pixel of `image` into a
/// `height x width x 3` view.
///
/// # Panics
///
/// Panics if `out` is larger than the image in any dimension.
pub fn normalize_into(image: &ImageData, mut out: ArrayViewMut3<'_, f32>) {
    let width = image.width() as usize;
    for ((y, x, c), value) in out.indexed_iter_mut() {
        let pixel = image.data[(y * width + x) * NUM_CHANNELS + c];
        *value = (f32::from(pixel) - 127.5) / 128.0;
    }
}

/// Bilinear resize. Destination pixel centres are mapped onto source pixel
/// centres and samples are clamped to the source edges.
pub fn resize_image(src: &ImageData, width: u32, height: u32) -> ImageData {
    if src.width() == width && src.height() == height {
        return src.clone();
    }

    let mut dest = ImageData::blank(width, height);

    let lf_x_scl = f64::from(src.width()) / f64::from(width);
    let lf_y_scl = f64::from(src.height()) / f64::from(height);
    let max_x = f64::from(src.width() - 1);
    let max_y = f64::from(src.height() - 1);

    for y in 0..height {
        let lf_y_s = num::clamp((f64::from(y) + 0.5) * lf_y_scl - 0.5, 0.0, max_y);
        let n_y_s = lf_y_s as u32;
        let n_y_s1 = cmp::min(n_y_s + 1, src.height() - 1);
        let lf_weight_y = lf_y_s - f64::from(n_y_s);

        for x in 0..width {
            let lf_x_s = num::clamp((f64::from(x) + 0.5) * lf_x_scl - 0.5, 0.0, max_x);
            let n_x_s = lf_x_s as u32;
            let n_x_s1 = cmp::min(n_x_s + 1, src.width() - 1);
            let lf_weight_x = lf_x_s - f64::from(n_x_s);

            let d1 = src.pixel(n_x_s, n_y_s);
            let d2 = src.pixel(n_x_s1, n_y_s);
            let d3 = src.pixel(n_x_s, n_y_s1);
            let d4 = src.pixel(n_x_s1, n_y_s1);

            let offset = dest.offset(x, y);
            for c in 0..NUM_CHANNELS {
                let dest_val = (1.0 - lf_weight_y)
                    * ((1.0 - lf_weight_x) * f64::from(d1[c]) + lf_weight_x * f64::from(d2[c]))
                    + lf_weight_y
                        * ((1.0 - lf_weight_x) * f64::from(d3[c]) + lf_weight_x * f64::from(d4[c]));
                dest.data[offset + c] = (dest_val + 0.5) as u8;
            }
        }
    }

    dest
}

/// Geometric sequence of downscaled copies of an image.
///
/// Starts at `max_scale` and multiplies by `scale_step` until the smaller side
/// of the scaled image is no longer larger than `min_size`.
pub struct ImagePyramid<'a> {
    image: &'a ImageData,
    max_scale: f32,
    scale_step: f32,
    min_size: u32,
}

impl<'a> ImagePyramid<'a> {
    /// # Panics
    ///
    /// Panics if `scale_step` is not in `(0, 1)`.
    pub fn new(image: &'a ImageData, max_scale: f32, scale_step: f32, min_size: u32) -> Self {
        if !(scale_step > 0.0 && scale_step < 1.0) {
            panic!("Illegal scale step: {}", scale_step);
        }
        ImagePyramid {
            image,
            max_scale,
            scale_step,
            min_size,
        }
    }

    /// `(scale, width, height)` of every pyramid level, largest first.
    pub fn scales(&self) -> impl Iterator<Item = (f32, u32, u32)> {
        let width = self.image.width() as f32;
        let height = self.image.height() as f32;
        let scale_step = self.scale_step;
        let min_size = self.min_size;

        Seq::new(self.max_scale, move |scale| scale * scale_step)
            .map(move |scale| (scale, (width * scale) as u32, (height * scale) as u32))
            .take_while(move |&(_, w, h)| cmp::min(w, h) > min_size)
    }

    /// Resized images of every pyramid level, computed lazily.
    pub fn levels(&self) -> impl Iterator<Item = (f32, ImageData)> + 'a {
        let image = self.image;
        self.scales()
            .map(move |(scale, width, height)| (scale, resize_image(image, width, height)))
    }
}
