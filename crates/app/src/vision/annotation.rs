//! CPU drawing primitives for detection overlays.

use anyhow::{Result, anyhow, bail};
use image::{Rgb, RgbImage};
use video_ingest::{Frame, FrameFormat};

use crate::vision::data::{BoundingBox, LabeledDetection};

pub(crate) const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
pub(crate) const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub(crate) const BOX_THICKNESS: i32 = 2;
pub(crate) const TOP_BOX_THICKNESS: i32 = 3;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;
/// Vertical room added around the label text inside its plate.
const PLATE_PADDING: i32 = 10;
const TEXT_INSET_X: i32 = 3;
const TEXT_BASELINE_OFFSET: i32 = 7;

/// Background plate and text origin for the top detection's label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelPlate {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub text_x: i32,
    pub text_y: i32,
}

/// Copy a BGR8 frame into an RGB image buffer.
pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    if !frame.is_well_formed() {
        bail!(
            "frame buffer holds {} bytes, expected {} for {}x{}",
            frame.data.len(),
            frame.expected_len(),
            frame.width,
            frame.height
        );
    }
    let rgb = match frame.format {
        FrameFormat::Bgr8 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect::<Vec<u8>>(),
    };
    RgbImage::from_raw(frame.width as u32, frame.height as u32, rgb)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

/// Text rendered on the top detection's plate, e.g. `cup: 0.42`.
pub fn label_text(detection: &LabeledDetection) -> String {
    format!("{}: {:.2}", detection.label, detection.confidence)
}

pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

/// Place the label plate above `bbox`, pushed down so it never starts above row 0.
pub fn label_plate(bbox: &BoundingBox, text: &str) -> LabelPlate {
    let baseline = bbox.y1.max(GLYPH_HEIGHT + PLATE_PADDING);
    LabelPlate {
        left: bbox.x1,
        top: baseline - GLYPH_HEIGHT - PLATE_PADDING,
        right: bbox.x1 + text_width(text),
        bottom: baseline,
        text_x: bbox.x1 + TEXT_INSET_X,
        text_y: baseline - TEXT_BASELINE_OFFSET - GLYPH_HEIGHT,
    }
}

/// Outline every detection, then highlight and label the top one.
pub fn annotate(
    image: &mut RgbImage,
    detections: &[LabeledDetection],
    top: Option<&LabeledDetection>,
) {
    for detection in detections {
        draw_rectangle(image, &detection.bbox, BOX_COLOR, BOX_THICKNESS);
    }

    if let Some(top) = top {
        draw_rectangle(image, &top.bbox, BOX_COLOR, TOP_BOX_THICKNESS);
        let text = label_text(top);
        let plate = label_plate(&top.bbox, &text);
        fill_rect(
            image,
            plate.left,
            plate.top,
            plate.right,
            plate.bottom,
            BOX_COLOR,
        );
        draw_label(image, plate.text_x, plate.text_y, &text, TEXT_COLOR);
    }
}

/// Draw a rectangle border `thickness` pixels wide, growing inwards.
pub(crate) fn draw_rectangle(
    image: &mut RgbImage,
    bbox: &BoundingBox,
    color: Rgb<u8>,
    thickness: i32,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    for t in 0..thickness.max(1) {
        let left = (bbox.x1 + t).clamp(0, width - 1);
        let right = (bbox.x2 - t).clamp(0, width - 1);
        let top = (bbox.y1 + t).clamp(0, height - 1);
        let bottom = (bbox.y2 - t).clamp(0, height - 1);
        if left > right || top > bottom {
            break;
        }
        for x in left..=right {
            image.put_pixel(x as u32, top as u32, color);
            image.put_pixel(x as u32, bottom as u32, color);
        }
        for y in top..=bottom {
            image.put_pixel(left as u32, y as u32, color);
            image.put_pixel(right as u32, y as u32, color);
        }
    }
}

fn fill_rect(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32, bbox: (i32, i32, i32, i32)) -> LabeledDetection {
        LabeledDetection {
            label: label.to_string(),
            confidence,
            bbox: BoundingBox {
                x1: bbox.0,
                y1: bbox.1,
                x2: bbox.2,
                y2: bbox.3,
            },
        }
    }

    #[test]
    fn label_text_uses_two_decimals() {
        assert_eq!(label_text(&detection("cup", 0.4, (0, 0, 1, 1))), "cup: 0.40");
        assert_eq!(
            label_text(&detection("bottle", 0.956, (0, 0, 1, 1))),
            "bottle: 0.96"
        );
    }

    #[test]
    fn label_plate_sits_above_box() {
        let det = detection("cup", 0.9, (40, 60, 90, 120));
        let text = label_text(&det);
        let plate = label_plate(&det.bbox, &text);
        assert_eq!(plate.bottom, 60);
        assert_eq!(plate.top, 60 - GLYPH_HEIGHT - PLATE_PADDING);
        assert_eq!(plate.left, 40);
        assert_eq!(plate.right, 40 + text_width(&text));
        assert!(plate.text_y >= plate.top && plate.text_y + GLYPH_HEIGHT <= plate.bottom);
    }

    #[test]
    fn label_plate_never_renders_above_the_top_edge() {
        for y1 in [0, 1, 5, 16, 17] {
            let det = detection("person", 0.5, (10, y1, 60, 80));
            let plate = label_plate(&det.bbox, &label_text(&det));
            assert!(plate.top >= 0, "plate top {} for y1 {y1}", plate.top);
            assert!(plate.text_y >= 0);
        }
        let det = detection("person", 0.5, (10, 0, 60, 80));
        assert_eq!(label_plate(&det.bbox, &label_text(&det)).top, 0);
    }

    #[test]
    fn frame_to_rgb_swaps_channels() {
        let frame = Frame::bgr8(vec![10, 20, 30, 40, 50, 60], 2, 1);
        let image = frame_to_rgb(&frame).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgb([30, 20, 10]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([60, 50, 40]));
    }

    #[test]
    fn frame_to_rgb_rejects_short_buffers() {
        let frame = Frame::bgr8(vec![0; 10], 4, 4);
        assert!(frame_to_rgb(&frame).is_err());
    }

    #[test]
    fn annotate_draws_boxes_and_plate() {
        let mut image = RgbImage::new(160, 160);
        let cup = detection("cup", 0.9, (5, 5, 40, 40));
        let bottle = detection("bottle", 0.95, (60, 60, 100, 120));
        annotate(&mut image, &[cup.clone(), bottle.clone()], Some(&bottle));

        assert_eq!(image.get_pixel(5, 20), &BOX_COLOR);
        assert_eq!(image.get_pixel(6, 20), &BOX_COLOR);
        assert_eq!(image.get_pixel(20, 20), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(62, 90), &BOX_COLOR);
        // plate pixel left of the text inset
        assert_eq!(image.get_pixel(61, 45), &BOX_COLOR);
    }

    #[test]
    fn drawing_clips_to_image_bounds() {
        let mut image = RgbImage::new(8, 8);
        let det = detection("x", 0.5, (-5, -5, 20, 20));
        annotate(&mut image, &[det.clone()], Some(&det));
        assert_eq!(image.get_pixel(0, 7), &BOX_COLOR);
    }

    #[test]
    fn every_label_character_has_a_glyph() {
        for ch in "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789:.-_/% ".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
        }
    }
}
