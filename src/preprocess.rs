//! Image preprocessor: raw captured frame in, model-ready pixel buffer out.
//!
//! Conversion runs in three steps: source format to RGBA, orientation
//! rotation from the fixed interface-orientation table, then crop-and-scale
//! to fill. The scale factor is the larger of the two axis ratios so the
//! source always covers the model input; the overflow is center-cropped,
//! never letterboxed, matching the model's training preprocessing.
//!
//! Every output is written into a buffer borrowed from a bounded pool. The
//! returned [`PreparedInput`] owns that buffer exclusively until dropped.

use image::{imageops, RgbaImage};
use ndarray::Array4;

use crate::engine::ModelInputSpec;
use crate::error::ConversionError;
use crate::frame::{rotation_for, PixelFormat, RawFrame, Rotation};
use crate::pool::{ExhaustionPolicy, PixelBufferPool, PooledBuffer};

/// A pixel buffer matching the model input spec exactly, owned by one
/// in-flight inference call. Dropping it returns the buffer to the pool.
pub struct PreparedInput {
    buffer: PooledBuffer,
}

impl PreparedInput {
    pub fn buffer(&self) -> &crate::pool::PixelBuffer {
        self.buffer.get()
    }

    /// Normalized NCHW float tensor view of the buffer, RGB channel order,
    /// for engines that take a tensor rather than a pixel buffer.
    pub fn to_chw_array(&self) -> Array4<f32> {
        chw_tensor(self.buffer.get())
    }
}

/// Normalized NCHW float tensor from an interleaved pixel buffer, RGB order.
pub fn chw_tensor(buf: &crate::pool::PixelBuffer) -> Array4<f32> {
    let (w, h) = (buf.width() as usize, buf.height() as usize);
    let bpp = buf.format().bytes_per_pixel();
    let bytes = buf.bytes();
    let mut out = Array4::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            let px = &bytes[(y * w + x) * bpp..(y * w + x) * bpp + bpp];
            let (r, g, b) = match buf.format() {
                PixelFormat::Bgra8 => (px[2], px[1], px[0]),
                _ => (px[0], px[1], px[2]),
            };
            out[[0, 0, y, x]] = r as f32 / 255.0;
            out[[0, 1, y, x]] = g as f32 / 255.0;
            out[[0, 2, y, x]] = b as f32 / 255.0;
        }
    }
    out
}

/// Converts raw frames into the exact format, orientation and resolution the
/// model requires. Owns the destination buffer pool.
pub struct Preprocessor {
    spec: ModelInputSpec,
    pool: PixelBufferPool,
}

impl Preprocessor {
    pub fn new(spec: ModelInputSpec, pool_capacity: usize, policy: ExhaustionPolicy) -> Self {
        let pool = PixelBufferPool::new(
            spec.pixel_format,
            spec.width,
            spec.height,
            pool_capacity,
            policy,
        );
        Self { spec, pool }
    }

    pub fn spec(&self) -> &ModelInputSpec {
        &self.spec
    }

    pub fn pool(&self) -> &PixelBufferPool {
        &self.pool
    }

    /// Convert one raw frame into a prepared model input.
    pub fn prepare(&self, frame: &RawFrame) -> Result<PreparedInput, ConversionError> {
        if !frame.format.is_interleaved() {
            return Err(ConversionError::UnsupportedFormat(frame.format));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(ConversionError::EmptyFrame {
                width: frame.width,
                height: frame.height,
            });
        }
        let expected = frame.expected_len();
        if frame.data.len() < expected {
            return Err(ConversionError::TruncatedFrame {
                expected,
                actual: frame.data.len(),
            });
        }

        let rgba = to_rgba(frame);

        let rotated = match rotation_for(frame.orientation) {
            Rotation::None => rgba,
            Rotation::Cw90 => imageops::rotate90(&rgba),
            Rotation::Half => imageops::rotate180(&rgba),
            Rotation::Ccw90 => imageops::rotate270(&rgba),
        };

        let filled = fill_to(&rotated, self.spec.width, self.spec.height);

        let mut guard = self.pool.acquire()?;
        write_pixels(&filled, self.spec.pixel_format, guard.get_mut().bytes_mut());
        Ok(PreparedInput { buffer: guard })
    }
}

fn to_rgba(frame: &RawFrame) -> RgbaImage {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let bpp = frame.format.bytes_per_pixel();
    let src = frame.data.as_slice();
    let mut out = vec![0u8; w * h * 4];
    for i in 0..w * h {
        let px = &src[i * bpp..i * bpp + bpp];
        let dst = &mut out[i * 4..i * 4 + 4];
        match frame.format {
            PixelFormat::Rgb8 => {
                dst[..3].copy_from_slice(px);
                dst[3] = 255;
            }
            PixelFormat::Rgba8 => dst.copy_from_slice(px),
            PixelFormat::Bgra8 => {
                dst[0] = px[2];
                dst[1] = px[1];
                dst[2] = px[0];
                dst[3] = px[3];
            }
            PixelFormat::Nv12 => unreachable!("rejected above"),
        }
    }
    RgbaImage::from_raw(frame.width, frame.height, out).expect("sized to geometry")
}

/// Aspect-fill: scale up to cover the target, center-crop the overflow.
fn fill_to(src: &RgbaImage, target_w: u32, target_h: u32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if (w, h) == (target_w, target_h) {
        return src.clone();
    }
    let scale = (target_w as f32 / w as f32).max(target_h as f32 / h as f32);
    let scaled_w = ((w as f32 * scale).round() as u32).max(target_w);
    let scaled_h = ((h as f32 * scale).round() as u32).max(target_h);
    let scaled = if (scaled_w, scaled_h) == (w, h) {
        src.clone()
    } else {
        imageops::resize(src, scaled_w, scaled_h, imageops::FilterType::Triangle)
    };
    let crop_x = (scaled_w - target_w) / 2;
    let crop_y = (scaled_h - target_h) / 2;
    imageops::crop_imm(&scaled, crop_x, crop_y, target_w, target_h).to_image()
}

fn write_pixels(src: &RgbaImage, format: PixelFormat, dst: &mut [u8]) {
    let bpp = format.bytes_per_pixel();
    for (i, px) in src.pixels().enumerate() {
        let [r, g, b, a] = px.0;
        let out = &mut dst[i * bpp..i * bpp + bpp];
        match format {
            PixelFormat::Rgb8 => out.copy_from_slice(&[r, g, b]),
            PixelFormat::Rgba8 => out.copy_from_slice(&[r, g, b, a]),
            PixelFormat::Bgra8 => out.copy_from_slice(&[b, g, r, a]),
            PixelFormat::Nv12 => unreachable!("pool never holds planar buffers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Orientation;
    use std::sync::Arc;

    fn spec(w: u32, h: u32, format: PixelFormat) -> ModelInputSpec {
        ModelInputSpec {
            pixel_format: format,
            width: w,
            height: h,
            ..ModelInputSpec::default()
        }
    }

    fn rgb_frame(w: u32, h: u32, pixels: &[[u8; 3]]) -> RawFrame {
        let data: Vec<u8> = pixels.iter().flatten().copied().collect();
        RawFrame::new(Arc::new(data), PixelFormat::Rgb8, w, h, None)
    }

    #[test]
    fn rejects_planar_sources() {
        let pre = Preprocessor::new(spec(4, 4, PixelFormat::Rgb8), 2, ExhaustionPolicy::FailFast);
        let frame = RawFrame::new(Arc::new(vec![0; 24]), PixelFormat::Nv12, 4, 4, None);
        assert!(matches!(
            pre.prepare(&frame),
            Err(ConversionError::UnsupportedFormat(PixelFormat::Nv12))
        ));
    }

    #[test]
    fn rejects_truncated_data() {
        let pre = Preprocessor::new(spec(4, 4, PixelFormat::Rgb8), 2, ExhaustionPolicy::FailFast);
        let frame = RawFrame::new(Arc::new(vec![0; 10]), PixelFormat::Rgb8, 4, 4, None);
        assert!(matches!(
            pre.prepare(&frame),
            Err(ConversionError::TruncatedFrame { expected: 48, .. })
        ));
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let pre = Preprocessor::new(spec(2, 2, PixelFormat::Rgb8), 1, ExhaustionPolicy::FailFast);
        let frame = rgb_frame(2, 2, &[[0, 0, 0]; 4]);
        let held = pre.prepare(&frame).unwrap();
        assert_eq!(pre.pool().available(), 0);
        assert!(matches!(
            pre.prepare(&frame),
            Err(ConversionError::PoolExhausted { capacity: 1 })
        ));
        drop(held);
        assert_eq!(pre.pool().available(), 1);
        assert!(pre.prepare(&frame).is_ok());
    }

    #[test]
    fn aspect_fill_center_crops_wide_source() {
        // 8x4 source, left half red, right half blue. Scale is 1, so the
        // crop keeps columns 2..6: red on the left, blue on the right.
        let mut pixels = Vec::new();
        for _y in 0..4 {
            for x in 0..8 {
                pixels.push(if x < 4 { [255, 0, 0] } else { [0, 0, 255] });
            }
        }
        let pre = Preprocessor::new(spec(4, 4, PixelFormat::Rgb8), 2, ExhaustionPolicy::FailFast);
        let input = pre.prepare(&rgb_frame(8, 4, &pixels)).unwrap();
        let bytes = input.buffer().bytes();
        assert_eq!(&bytes[0..3], &[255, 0, 0]);
        let last = 4 * 4 * 3 - 3;
        assert_eq!(&bytes[last..], &[0, 0, 255]);
    }

    #[test]
    fn portrait_frame_is_rotated_clockwise() {
        // 2x2 source [[A, B], [C, D]]; after a 90 degree CW rotation the
        // top row reads [C, A].
        let a = [10, 0, 0];
        let b = [20, 0, 0];
        let c = [30, 0, 0];
        let d = [40, 0, 0];
        let mut frame = rgb_frame(2, 2, &[a, b, c, d]);
        frame.orientation = Some(Orientation::Portrait);
        let pre = Preprocessor::new(spec(2, 2, PixelFormat::Rgb8), 2, ExhaustionPolicy::FailFast);
        let input = pre.prepare(&frame).unwrap();
        let bytes = input.buffer().bytes();
        assert_eq!(&bytes[0..3], &c);
        assert_eq!(&bytes[3..6], &a);
        assert_eq!(&bytes[6..9], &d);
        assert_eq!(&bytes[9..12], &b);
    }

    #[test]
    fn bgra_source_lands_in_rgb_order() {
        let pre = Preprocessor::new(spec(1, 1, PixelFormat::Rgb8), 1, ExhaustionPolicy::FailFast);
        let frame = RawFrame::new(
            Arc::new(vec![1, 2, 3, 255]), // B=1 G=2 R=3
            PixelFormat::Bgra8,
            1,
            1,
            None,
        );
        let input = pre.prepare(&frame).unwrap();
        assert_eq!(input.buffer().bytes(), &[3, 2, 1]);
    }

    #[test]
    fn chw_array_is_normalized() {
        let pre = Preprocessor::new(spec(1, 1, PixelFormat::Rgb8), 1, ExhaustionPolicy::FailFast);
        let input = pre
            .prepare(&rgb_frame(1, 1, &[[255, 0, 51]]))
            .unwrap();
        let arr = input.to_chw_array();
        assert_eq!(arr.shape(), &[1, 3, 1, 1]);
        assert!((arr[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((arr[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }
}
