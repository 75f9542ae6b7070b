//! FrameAnnotator - Detection Overlay Drawing
//!
//! Pure functions: the input frame is never mutated, callers get a new
//! image with boxes and confidence labels drawn on it.

use crate::detector::Detection;
use image::{Rgb, RgbImage};

/// Box and label color
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Rectangle edge thickness in pixels
const BOX_THICKNESS: u32 = 2;
/// Glyph cell advance in pixels
const GLYPH_ADVANCE: i64 = 6;
const GLYPH_HEIGHT: i64 = 7;

/// Draw each detection as a rectangle with a confidence label
///
/// Box coordinates are clamped to the frame bounds; a detection entirely
/// outside the frame draws nothing.
pub fn annotate(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut out = frame.clone();

    for detection in detections {
        draw_rect(
            &mut out,
            detection.x,
            detection.y,
            detection.x.saturating_add(detection.w as i32),
            detection.y.saturating_add(detection.h as i32),
        );

        let label = format!("{} {:.2}", detection.label.to_uppercase(), detection.confidence);
        let text_y = i64::from(detection.y) - GLYPH_HEIGHT - 3;
        draw_text(&mut out, i64::from(detection.x), text_y.max(0), &label);
    }

    out
}

/// Hollow rectangle with clamped edges
fn draw_rect(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32) {
    let w = image.width() as i64;
    let h = image.height() as i64;
    let (x1, y1, x2, y2) = (i64::from(x1), i64::from(y1), i64::from(x2), i64::from(y2));

    for t in 0..i64::from(BOX_THICKNESS) {
        for x in x1.max(0)..=x2.min(w - 1) {
            put_pixel(image, x, y1 + t, w, h);
            put_pixel(image, x, y2 - t, w, h);
        }
        for y in y1.max(0)..=y2.min(h - 1) {
            put_pixel(image, x1 + t, y, w, h);
            put_pixel(image, x2 - t, y, w, h);
        }
    }
}

fn put_pixel(image: &mut RgbImage, x: i64, y: i64, w: i64, h: i64) {
    if x >= 0 && x < w && y >= 0 && y < h {
        image.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

/// Render text with the built-in glyph face
///
/// Characters without a glyph advance the cursor without drawing.
fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str) {
    let w = image.width() as i64;
    let h = image.height() as i64;

    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (dy, row) in rows.iter().enumerate() {
                for dx in 0..5 {
                    if row & (0b10000 >> dx) != 0 {
                        put_pixel(image, cursor + dx, y + dy as i64, w, h);
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap rows for the characters labels actually use
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch.to_ascii_uppercase() {
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::PERSON_LABEL;

    fn detection(x: i32, y: i32, w: u32, h: u32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: 0.87,
            label: PERSON_LABEL.to_string(),
        }
    }

    #[test]
    fn test_annotate_does_not_mutate_input() {
        let frame = RgbImage::new(64, 64);
        let annotated = annotate(&frame, &[detection(10, 20, 30, 30)]);

        // Input untouched, output carries the box
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
        assert_eq!(*annotated.get_pixel(15, 20), BOX_COLOR);
    }

    #[test]
    fn test_annotate_clamps_out_of_bounds_boxes() {
        let frame = RgbImage::new(32, 32);
        // Box extends past every edge; must not panic
        let annotated = annotate(&frame, &[detection(-10, -10, 60, 60)]);
        assert_eq!(annotated.dimensions(), (32, 32));
    }

    #[test]
    fn test_annotate_empty_detections_is_copy() {
        let frame = RgbImage::from_pixel(16, 16, Rgb([7, 7, 7]));
        let annotated = annotate(&frame, &[]);
        assert_eq!(frame, annotated);
    }
}
