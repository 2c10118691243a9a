//! JPEG encoding and multipart/x-mixed-replace framing.

use actix_web::web::Bytes;
use anyhow::{Result, anyhow};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Encode an annotated frame as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, jpeg_quality: u8) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("cannot encode an empty image"));
    }
    let mut buffer = Vec::new();
    let quality = jpeg_quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// Wrap encoded image bytes in one multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    payload.extend_from_slice(PART_HEADER);
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(PART_TRAILER);
    Bytes::from(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_has_exact_framing() {
        let part = multipart_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\xFF\xD9\r\n"
        );
    }

    #[test]
    fn encodes_a_decodable_jpeg() {
        let image = RgbImage::from_pixel(16, 8, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&image, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn empty_image_fails_to_encode() {
        assert!(encode_jpeg(&RgbImage::new(0, 0), 85).is_err());
    }
}
