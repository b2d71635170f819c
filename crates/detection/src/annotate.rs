//! Rendering of boxes, labels and masks onto frames

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use ndarray::Array2;
use studio_config::{ColorConfig, DisplayConfig};

use crate::font::{self, ADVANCE, GLYPH_HEIGHT};
use crate::{Detection, DetectionError};

/// Box outline thickness in pixels
pub const BOX_THICKNESS: i32 = 2;
/// Label glyph scale (5x7 glyphs become 10x14)
pub const LABEL_SCALE: u32 = 2;
/// Mask values above this are inside the object
pub const MASK_THRESHOLD: f32 = 0.5;
/// Weight of the detection color when blending masks
pub const MASK_ALPHA: f32 = 0.3;

type MaskImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Label for a detection per the display flags, `None` when neither is shown
pub fn label_text(detection: &Detection, display: &DisplayConfig) -> Option<String> {
    match (display.show_labels, display.show_confidence) {
        (true, true) => Some(format!("{} {:.2}", detection.class_name, detection.confidence)),
        (true, false) => Some(detection.class_name.clone()),
        (false, true) => Some(format!("{:.2}", detection.confidence)),
        (false, false) => None,
    }
}

/// Clip a box to the image, `None` when nothing of it is left
fn clip_box(bbox: [f32; 4], width: u32, height: u32) -> Option<[f32; 4]> {
    let (w, h) = (width as f32, height as f32);
    let x1 = bbox[0].clamp(0.0, w);
    let y1 = bbox[1].clamp(0.0, h);
    let x2 = bbox[2].clamp(0.0, w);
    let y2 = bbox[3].clamp(0.0, h);
    if !(x2 > x1 && y2 > y1) {
        return None;
    }
    Some([x1, y1, x2, y2])
}

/// Draw a box outline, growing outward from the box edge
///
/// The box is clipped to the image first; a box entirely outside it draws nothing.
pub fn draw_box(image: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>) {
    let Some([x1, y1, x2, y2]) = clip_box(bbox, image.width(), image.height()) else {
        return;
    };
    let x = x1.round() as i32;
    let y = y1.round() as i32;
    let width = ((x2 - x1).round() as u32).max(1);
    let height = ((y2 - y1).round() as u32).max(1);

    for offset in 0..BOX_THICKNESS {
        let grow = (offset * 2) as u32;
        let rect = Rect::at(x - offset, y - offset).of_size(width + grow, height + grow);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Draw text with the bitmap font, top-left at (x, y); off-image pixels are clipped
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x.saturating_add((i as u32 * ADVANCE * scale) as i32);
        for (row, bits) in font::glyph(ch).iter().enumerate() {
            for col in 0..font::GLYPH_WIDTH {
                if (bits >> (font::GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                    let px = origin_x.saturating_add((col * scale) as i32);
                    let py = y.saturating_add((row as u32 * scale) as i32);
                    draw_filled_rect_mut(image, Rect::at(px, py).of_size(scale, scale), color);
                }
            }
        }
    }
}

/// Draw a label on a filled block sitting on top of the box
pub fn draw_label(image: &mut RgbImage, bbox: [f32; 4], text: &str, background: Rgb<u8>, foreground: Rgb<u8>) {
    let text_width = font::text_width(text, LABEL_SCALE);
    if text_width == 0 {
        return;
    }
    let Some([x1, y1, _, _]) = clip_box(bbox, image.width(), image.height()) else {
        return;
    };
    let text_height = (GLYPH_HEIGHT * LABEL_SCALE) as i32;
    let x = x1.round() as i32;
    let y = y1.round() as i32;

    let block = Rect::at(x, y.saturating_sub(text_height + 10)).of_size(text_width, (text_height + 10) as u32);
    draw_filled_rect_mut(image, block, background);
    draw_text(image, text, x, y.saturating_sub(text_height + 5), LABEL_SCALE, foreground);
}

/// Resize a mask to the frame with bilinear filtering
pub fn fit_mask(mask: &Array2<f32>, width: u32, height: u32) -> Result<MaskImage, DetectionError> {
    let (rows, cols) = mask.dim();
    let mismatch = || DetectionError::MaskDimensionMismatch {
        mask_width: cols,
        mask_height: rows,
        frame_width: width,
        frame_height: height,
    };

    if rows == 0 || cols == 0 || width == 0 || height == 0 {
        return Err(mismatch());
    }

    let source = MaskImage::from_raw(cols as u32, rows as u32, mask.iter().copied().collect()).ok_or_else(mismatch)?;
    if (cols as u32, rows as u32) == (width, height) {
        return Ok(source);
    }
    Ok(imageops::resize(&source, width, height, FilterType::Triangle))
}

/// Blend `color` into every pixel whose mask value exceeds the threshold
pub fn blend_mask(image: &mut RgbImage, mask: &MaskImage, color: Rgb<u8>) {
    for (pixel, value) in image.pixels_mut().zip(mask.pixels()) {
        if value[0] > MASK_THRESHOLD {
            for c in 0..3 {
                let blended = (1.0 - MASK_ALPHA) * pixel[c] as f32 + MASK_ALPHA * color[c] as f32;
                pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Render one detection: box, then label, then mask
///
/// Box and label are always drawn when enabled; a mask that cannot be fitted
/// to the image is reported after they are drawn.
pub fn annotate(
    image: &mut RgbImage,
    detection: &Detection,
    display: &DisplayConfig,
    colors: &ColorConfig,
) -> Result<(), DetectionError> {
    let color = Rgb(colors.detection_color);

    if display.show_boxes {
        draw_box(image, detection.bbox, color);
    }

    if let Some(text) = label_text(detection, display) {
        draw_label(image, detection.bbox, &text, color, Rgb(colors.text_color));
    }

    if display.show_masks {
        if let Some(mask) = &detection.mask {
            let fitted = fit_mask(mask, image.width(), image.height())?;
            blend_mask(image, &fitted, color);
        }
    }

    Ok(())
}
