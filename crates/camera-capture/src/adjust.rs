//! Per-frame brightness, contrast and sharpness adjustment

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::frame::CHANNELS;
use crate::{CaptureError, Frame};

/// Sharpness values within +/- this band skip the kernel pass
pub const SHARPNESS_DEADBAND: f32 = 0.1;

/// Accepted brightness offset range
pub const BRIGHTNESS_RANGE: (f32, f32) = (-255.0, 255.0);
/// Accepted contrast gain range (always strictly positive)
pub const CONTRAST_RANGE: (f32, f32) = (0.01, 10.0);
/// Accepted sharpness range
pub const SHARPNESS_RANGE: (f32, f32) = (-10.0, 10.0);

/// Image adjustment parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageAdjustment {
    /// Additive offset, typically -100..100
    pub brightness: f32,
    /// Multiplicative gain, typically 0.5..3.0
    pub contrast: f32,
    /// Positive sharpens, negative blurs, typically -2..5
    pub sharpness: f32,
}

impl Default for ImageAdjustment {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            sharpness: 0.0,
        }
    }
}

impl ImageAdjustment {
    /// Apply this adjustment to a frame
    pub fn apply(&self, frame: &Frame) -> Frame {
        adjust(frame, self.brightness, self.contrast, self.sharpness)
    }

    /// Clamp every field into its accepted range, rejecting non-finite values
    pub fn validated(self) -> Result<Self, CaptureError> {
        Ok(Self {
            brightness: clamp_to("brightness", self.brightness, BRIGHTNESS_RANGE)?,
            contrast: clamp_to("contrast", self.contrast, CONTRAST_RANGE)?,
            sharpness: clamp_to("sharpness", self.sharpness, SHARPNESS_RANGE)?,
        })
    }

    /// True if applying this adjustment leaves every pixel unchanged
    pub fn is_identity(&self) -> bool {
        self.brightness == 0.0 && self.contrast == 1.0 && self.sharpness.abs() <= SHARPNESS_DEADBAND
    }
}

/// Validate a value against a range, clamping finite values into it
pub fn clamp_to(field: &'static str, value: f32, range: (f32, f32)) -> Result<f32, CaptureError> {
    if !value.is_finite() {
        return Err(CaptureError::InvalidValue { field, value });
    }
    Ok(value.clamp(range.0, range.1))
}

/// Adjustment values shared between the controller and the capture loop
///
/// Each field is an `f32` stored as bits in an atomic. Setters clamp before
/// storing, so a reader can never observe an out-of-range value. A single
/// frame may mix an old brightness with a new contrast, which is accepted.
#[derive(Debug)]
pub struct SharedAdjustment {
    brightness: AtomicU32,
    contrast: AtomicU32,
    sharpness: AtomicU32,
}

impl SharedAdjustment {
    /// Create shared state from initial values (clamped, non-finite replaced by defaults)
    pub fn new(initial: ImageAdjustment) -> Self {
        let defaults = ImageAdjustment::default();
        let clamp_or = |field: &'static str, value: f32, range: (f32, f32), fallback: f32| {
            clamp_to(field, value, range).unwrap_or(fallback)
        };
        Self {
            brightness: AtomicU32::new(
                clamp_or("brightness", initial.brightness, BRIGHTNESS_RANGE, defaults.brightness).to_bits(),
            ),
            contrast: AtomicU32::new(
                clamp_or("contrast", initial.contrast, CONTRAST_RANGE, defaults.contrast).to_bits(),
            ),
            sharpness: AtomicU32::new(
                clamp_or("sharpness", initial.sharpness, SHARPNESS_RANGE, defaults.sharpness).to_bits(),
            ),
        }
    }

    /// Current values
    pub fn snapshot(&self) -> ImageAdjustment {
        ImageAdjustment {
            brightness: f32::from_bits(self.brightness.load(Ordering::Relaxed)),
            contrast: f32::from_bits(self.contrast.load(Ordering::Relaxed)),
            sharpness: f32::from_bits(self.sharpness.load(Ordering::Relaxed)),
        }
    }

    /// Set brightness, returning the value actually stored
    pub fn set_brightness(&self, value: f32) -> Result<f32, CaptureError> {
        let value = clamp_to("brightness", value, BRIGHTNESS_RANGE)?;
        self.brightness.store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    /// Set contrast, returning the value actually stored
    pub fn set_contrast(&self, value: f32) -> Result<f32, CaptureError> {
        let value = clamp_to("contrast", value, CONTRAST_RANGE)?;
        self.contrast.store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    /// Set sharpness, returning the value actually stored
    pub fn set_sharpness(&self, value: f32) -> Result<f32, CaptureError> {
        let value = clamp_to("sharpness", value, SHARPNESS_RANGE)?;
        self.sharpness.store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    /// Restore brightness 0, contrast 1, sharpness 0
    pub fn reset(&self) {
        let defaults = ImageAdjustment::default();
        self.brightness.store(defaults.brightness.to_bits(), Ordering::Relaxed);
        self.contrast.store(defaults.contrast.to_bits(), Ordering::Relaxed);
        self.sharpness.store(defaults.sharpness.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedAdjustment {
    fn default() -> Self {
        Self::new(ImageAdjustment::default())
    }
}

/// Apply brightness, contrast and sharpness to a frame
///
/// 1. `out = clamp(round(p * contrast + brightness))` on every channel
/// 2. `sharpness > 0.1`: 3x3 kernel, center `9 + sharpness`, neighbours `-1`
/// 3. `sharpness < -0.1`: Gaussian blur, radius `floor(|sharpness|) + 1`
///
/// Borders are edge-replicated. The result always has the input's dimensions.
pub fn adjust(frame: &Frame, brightness: f32, contrast: f32, sharpness: f32) -> Frame {
    let lut = affine_lut(brightness, contrast);
    let adjusted: Vec<u8> = frame.data.iter().map(|&v| lut[v as usize]).collect();

    if frame.is_empty() || !frame.is_consistent() || sharpness.abs() <= SHARPNESS_DEADBAND || !sharpness.is_finite() {
        return frame.with_data(adjusted);
    }

    let (width, height) = (frame.width as usize, frame.height as usize);
    if sharpness < 0.0 {
        let radius = sharpness.abs().floor() as usize + 1;
        return frame.with_data(gaussian_blur(&adjusted, width, height, radius));
    }

    frame.with_data(sharpen(&adjusted, width, height, sharpness))
}

fn saturate(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

fn affine_lut(brightness: f32, contrast: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = saturate(v as f32 * contrast + brightness);
    }
    lut
}

/// Unnormalized 3x3 sharpening kernel with edge replication
fn sharpen(data: &[u8], width: usize, height: usize, amount: f32) -> Vec<u8> {
    let center = 9.0 + amount;
    let mut out = vec![0u8; data.len()];

    for y in 0..height {
        let rows = [y.saturating_sub(1), y, (y + 1).min(height - 1)];
        for x in 0..width {
            let cols = [x.saturating_sub(1), x, (x + 1).min(width - 1)];
            let base = (y * width + x) * CHANNELS;
            for c in 0..CHANNELS {
                let mut acc = 0.0f32;
                for (ky, &ry) in rows.iter().enumerate() {
                    for (kx, &rx) in cols.iter().enumerate() {
                        let v = data[(ry * width + rx) * CHANNELS + c] as f32;
                        acc += if ky == 1 && kx == 1 { center * v } else { -v };
                    }
                }
                out[base + c] = saturate(acc);
            }
        }
    }
    out
}

/// 1D Gaussian weights for an odd kernel size, sigma derived from the size
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as f32;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// Separable Gaussian blur with edge replication
fn gaussian_blur(data: &[u8], width: usize, height: usize, radius: usize) -> Vec<u8> {
    let kernel = gaussian_kernel(2 * radius + 1);
    let r = radius as isize;
    let clamp_idx = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

    // horizontal
    let mut tmp = vec![0.0f32; data.len()];
    for y in 0..height {
        for x in 0..width {
            for c in 0..CHANNELS {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    let sx = clamp_idx(x as isize + k as isize - r, width);
                    acc += w * data[(y * width + sx) * CHANNELS + c] as f32;
                }
                tmp[(y * width + x) * CHANNELS + c] = acc;
            }
        }
    }

    // vertical
    let mut out = vec![0u8; data.len()];
    for y in 0..height {
        for x in 0..width {
            for c in 0..CHANNELS {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    let sy = clamp_idx(y as isize + k as isize - r, height);
                    acc += w * tmp[(sy * width + x) * CHANNELS + c];
                }
                out[(y * width + x) * CHANNELS + c] = saturate(acc);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 7 + y * 13) % 256) as u8;
                data.extend_from_slice(&[v, v / 2, 255 - v]);
            }
        }
        Frame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_identity_adjustment() {
        let frame = gradient(16, 9);
        assert_eq!(adjust(&frame, 0.0, 1.0, 0.0), frame);
        assert!(ImageAdjustment::default().is_identity());
    }

    #[test]
    fn test_brightness_saturates() {
        let frame = Frame::filled(4, 4, [200, 10, 128]);
        let out = adjust(&frame, 100.0, 1.0, 0.0);
        assert_eq!(out.get_pixel(0, 0), Some([255, 110, 228]));

        let out = adjust(&frame, -100.0, 1.0, 0.0);
        assert_eq!(out.get_pixel(0, 0), Some([100, 0, 28]));
    }

    #[test]
    fn test_contrast_scales() {
        let frame = Frame::filled(2, 2, [50, 100, 200]);
        let out = adjust(&frame, 0.0, 2.0, 0.0);
        assert_eq!(out.get_pixel(1, 1), Some([100, 200, 255]));
    }

    #[test]
    fn test_deadband_skips_kernel() {
        let frame = gradient(12, 12);
        assert_eq!(adjust(&frame, 0.0, 1.0, 0.05), frame);
        assert_eq!(adjust(&frame, 0.0, 1.0, -0.1), frame);
    }

    #[test]
    fn test_sharpen_uniform_region() {
        // A flat image sees the kernel sum (1 + amount) as its gain.
        let frame = Frame::filled(5, 5, [40, 40, 40]);
        let out = adjust(&frame, 0.0, 1.0, 1.0);
        assert_eq!(out.get_pixel(2, 2), Some([80, 80, 80]));
        assert_eq!(out.get_pixel(0, 0), Some([80, 80, 80]));
    }

    #[test]
    fn test_sharpen_boosts_edges() {
        let mut frame = Frame::filled(5, 5, [100, 100, 100]);
        let idx = (2 * 5 + 2) * CHANNELS;
        frame.data[idx..idx + 3].copy_from_slice(&[150, 150, 150]);

        let out = adjust(&frame, 0.0, 1.0, 0.5);
        // center: 9.5 * 150 - 8 * 100 = 625 -> saturates
        assert_eq!(out.get_pixel(2, 2), Some([255, 255, 255]));
        // neighbour: 9.5 * 100 - 7 * 100 - 150 = 100
        assert_eq!(out.get_pixel(1, 2), Some([100, 100, 100]));
    }

    #[test]
    fn test_blur_preserves_flat_image() {
        let frame = Frame::filled(7, 5, [90, 30, 200]);
        let out = adjust(&frame, 0.0, 1.0, -1.5);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_blur_smooths_spike() {
        let mut frame = Frame::filled(9, 9, [0, 0, 0]);
        let idx = (4 * 9 + 4) * CHANNELS;
        frame.data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);

        let out = adjust(&frame, 0.0, 1.0, -2.0);
        let center = out.get_pixel(4, 4).unwrap()[0];
        let neighbour = out.get_pixel(5, 4).unwrap()[0];
        assert!(center < 255);
        assert!(neighbour > 0);
        assert!(center >= neighbour);
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        for radius in 1..=6 {
            let k = gaussian_kernel(2 * radius + 1);
            assert_eq!(k.len(), 2 * radius + 1);
            assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            assert!((k[0] - k[k.len() - 1]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::new(Vec::new(), 0, 0, 0, 0);
        assert_eq!(adjust(&frame, 10.0, 2.0, 3.0), frame);
    }

    #[test]
    fn test_shared_adjustment_clamps() {
        let shared = SharedAdjustment::default();
        assert_eq!(shared.set_contrast(-3.0).unwrap(), CONTRAST_RANGE.0);
        assert_eq!(shared.set_brightness(1000.0).unwrap(), 255.0);
        assert!(shared.set_sharpness(f32::NAN).is_err());
        assert_eq!(shared.snapshot().sharpness, 0.0);
        assert!(shared.snapshot().contrast > 0.0);
    }

    #[test]
    fn test_shared_adjustment_reset() {
        let shared = SharedAdjustment::new(ImageAdjustment {
            brightness: 20.0,
            contrast: 1.5,
            sharpness: 2.0,
        });
        shared.reset();
        assert_eq!(shared.snapshot(), ImageAdjustment::default());
    }

    #[test]
    fn test_shared_adjustment_sanitizes_initial_values() {
        let shared = SharedAdjustment::new(ImageAdjustment {
            brightness: f32::INFINITY,
            contrast: 0.0,
            sharpness: 42.0,
        });
        let snap = shared.snapshot();
        assert_eq!(snap.brightness, 0.0);
        assert_eq!(snap.contrast, CONTRAST_RANGE.0);
        assert_eq!(snap.sharpness, SHARPNESS_RANGE.1);
    }

    proptest! {
        #[test]
        fn prop_adjust_preserves_dimensions(
            width in 1u32..24,
            height in 1u32..24,
            brightness in -100.0f32..100.0,
            contrast in 0.5f32..3.0,
            sharpness in -2.0f32..5.0,
        ) {
            let frame = gradient(width, height);
            let out = adjust(&frame, brightness, contrast, sharpness);
            prop_assert_eq!(out.dimensions(), frame.dimensions());
            prop_assert!(out.is_consistent());
        }

        #[test]
        fn prop_adjust_is_deterministic(
            brightness in -100.0f32..100.0,
            contrast in 0.5f32..3.0,
            sharpness in -2.0f32..5.0,
        ) {
            let frame = gradient(10, 6);
            prop_assert_eq!(
                adjust(&frame, brightness, contrast, sharpness),
                adjust(&frame, brightness, contrast, sharpness)
            );
        }
    }
}
