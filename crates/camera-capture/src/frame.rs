//! Video frame type shared by the capture, detection and presentation stages

use image::RgbImage;

/// Number of interleaved color channels in a frame
pub const CHANNELS: usize = 3;

/// Decoded RGB video frame
///
/// Frames are immutable once produced. Every consumer receives its own copy,
/// the live buffer inside the capture service is never handed out by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (milliseconds since the Unix epoch)
    pub timestamp_ms: i64,
    /// Frame sequence number
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: i64, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
            sequence,
        }
    }

    /// Create a frame where every pixel has the same color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 0, 0)
    }

    /// Wrap an `image` buffer
    pub fn from_image(image: RgbImage, timestamp_ms: i64, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ms, sequence)
    }

    /// Copy the pixels into an `image` buffer for drawing or resizing
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Same frame metadata, different pixels
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self {
            data,
            width: self.width,
            height: self.height,
            timestamp_ms: self.timestamp_ms,
            sequence: self.sequence,
        }
    }

    /// Frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True if the frame holds no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the buffer length agrees with width * height * 3
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * CHANNELS
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(idx..idx + CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame() {
        let frame = Frame::filled(4, 3, [10, 20, 30]);
        assert_eq!(frame.data.len(), 36);
        assert!(frame.is_consistent());
        assert_eq!(frame.get_pixel(3, 2), Some([10, 20, 30]));
    }

    #[test]
    fn test_get_pixel_out_of_bounds() {
        let frame = Frame::filled(2, 2, [0, 0, 0]);
        assert_eq!(frame.get_pixel(2, 0), None);
        assert_eq!(frame.get_pixel(0, 2), None);
    }

    #[test]
    fn test_to_image_rejects_short_buffer() {
        let frame = Frame::new(vec![0; 5], 2, 2, 0, 0);
        assert!(!frame.is_consistent());
        assert!(frame.to_image().is_none());
    }
}
