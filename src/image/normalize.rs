//! Image intake and normalization.
//!
//! Every accepted image goes through the same pipeline before upload:
//!
//! 1. Read the file bytes
//! 2. Decode them into pixels
//! 3. Scale the longer edge down to [`MAX_DIMENSION`] if it is larger
//! 4. Composite onto an opaque white canvas, dropping any transparency
//! 5. Encode as JPEG at [`JPEG_QUALITY`]
//!
//! Small, opaque images are re-encoded too, so every upload has the same
//! format.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::error::{PlushyError, Result};

use super::types::{SourceFile, SourceImage};

/// Longest edge, in pixels, of a normalized image.
pub const MAX_DIMENSION: u32 = 1024;

/// JPEG quality used for the normalized payload.
pub const JPEG_QUALITY: u8 = 85;

/// MIME type of every normalized payload.
pub const NORMALIZED_MIME_TYPE: &str = "image/jpeg";

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// A normalized, JPEG-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    /// Encoded JPEG bytes.
    pub bytes: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl NormalizedImage {
    /// Encodes the JPEG bytes as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Returns the image as a data URI.
    pub fn to_data_url(&self) -> String {
        format!("data:{NORMALIZED_MIME_TYPE};base64,{}", self.to_base64())
    }
}

/// Computes the normalized dimensions of a `width` x `height` image.
///
/// The longer edge is capped at [`MAX_DIMENSION`] and the shorter edge is
/// scaled by the same factor, rounded to the nearest pixel. When both edges
/// are equal the height is treated as the longer one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let scale = |short: u32, long: u32| -> u32 {
        (f64::from(short) * f64::from(MAX_DIMENSION) / f64::from(long)).round() as u32
    };

    if width > height {
        if width > MAX_DIMENSION {
            return (MAX_DIMENSION, scale(height, width));
        }
    } else if height > MAX_DIMENSION {
        return (scale(width, height), MAX_DIMENSION);
    }

    (width, height)
}

/// Decodes encoded image bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(PlushyError::LoadImage)
}

/// Draws `img` at `width` x `height` onto a white canvas.
///
/// Transparent and translucent pixels are blended over white at the source
/// size, before any scaling, so transparent neighbors never bleed their
/// stored color into the result.
pub fn render_on_white(img: &DynamicImage, width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        return Err(PlushyError::Canvas(format!(
            "cannot allocate a {width}x{height} canvas"
        )));
    }

    let rgba = img.to_rgba8();
    let mut flattened = RgbImage::from_pixel(rgba.width(), rgba.height(), WHITE);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        flattened.put_pixel(x, y, Rgb([over_white(r, a), over_white(g, a), over_white(b, a)]));
    }

    if flattened.dimensions() == (width, height) {
        return Ok(flattened);
    }
    Ok(image::imageops::resize(
        &flattened,
        width,
        height,
        FilterType::Lanczos3,
    ))
}

/// Blends one channel with straight alpha over white.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    // Bounded by 255: (255*a + 255*(255-a) + 127) / 255 == 255
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Encodes a canvas as JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(canvas: RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    DynamicImage::ImageRgb8(canvas)
        .write_with_encoder(encoder)
        .map_err(|e| PlushyError::Canvas(e.to_string()))?;
    Ok(bytes)
}

/// Normalizes a decoded image: bound, flatten onto white, re-encode.
pub fn normalize(img: &DynamicImage) -> Result<NormalizedImage> {
    let (src_width, src_height) = img.dimensions();
    let (width, height) = target_dimensions(src_width, src_height);

    let canvas = render_on_white(img, width, height)?;
    let bytes = encode_jpeg(canvas)?;

    tracing::debug!(
        src_width,
        src_height,
        width,
        height,
        size_bytes = bytes.len(),
        "normalized image"
    );

    Ok(NormalizedImage {
        bytes,
        width,
        height,
    })
}

/// Accepts a user-supplied file and produces a normalized [`SourceImage`].
///
/// Files whose declared content type is not `image/*` are rejected before
/// anything is read.
pub async fn intake(file: &SourceFile) -> Result<SourceImage> {
    if !file.is_image() {
        return Err(PlushyError::InvalidFileType {
            content_type: file.content_type().to_string(),
        });
    }

    let bytes = file.read().await?;
    let decoded = decode(&bytes)?;
    let normalized = normalize(&decoded)?;

    let base64 = normalized.to_base64();
    let preview_url = format!("data:{NORMALIZED_MIME_TYPE};base64,{base64}");

    Ok(SourceImage {
        name: file.name().to_string(),
        content_type: file.content_type().to_string(),
        base64,
        mime_type: NORMALIZED_MIME_TYPE.to_string(),
        preview_url,
        width: normalized.width,
        height: normalized.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageFormat;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_small_images_keep_dimensions() {
        assert_eq!(target_dimensions(800, 600), (800, 600));
        assert_eq!(target_dimensions(1024, 1024), (1024, 1024));
        assert_eq!(target_dimensions(1, 1), (1, 1));
        assert_eq!(target_dimensions(1024, 10), (1024, 10));
    }

    #[test]
    fn test_landscape_is_bounded_by_width() {
        assert_eq!(target_dimensions(2048, 1536), (1024, 768));
        assert_eq!(target_dimensions(1500, 500), (1024, 341));
    }

    #[test]
    fn test_portrait_is_bounded_by_height() {
        assert_eq!(target_dimensions(1000, 3000), (341, 1024));
        assert_eq!(target_dimensions(600, 1025), (599, 1024));
    }

    #[test]
    fn test_square_over_bound() {
        assert_eq!(target_dimensions(4000, 4000), (1024, 1024));
    }

    #[test]
    fn test_aspect_ratio_preserved_within_rounding() {
        for &(w, h) in &[(4032, 3024), (3000, 2001), (1025, 77), (513, 4096), (5000, 4999)] {
            let (tw, th) = target_dimensions(w, h);
            assert_eq!(tw.max(th), MAX_DIMENSION, "{w}x{h}");

            let expected_short = f64::from(w.min(h)) * f64::from(MAX_DIMENSION) / f64::from(w.max(h));
            let actual_short = f64::from(tw.min(th));
            assert!(
                (expected_short - actual_short).abs() <= 1.0,
                "{w}x{h} -> {tw}x{th}"
            );
        }
    }

    #[test]
    fn test_over_white() {
        assert_eq!(over_white(0, 0), 255);
        assert_eq!(over_white(0, 255), 0);
        assert_eq!(over_white(200, 255), 200);
        assert_eq!(over_white(0, 128), 127);
    }

    #[test]
    fn test_transparent_image_becomes_opaque_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 0])));
        let normalized = normalize(&img).unwrap();
        assert_eq!((normalized.width, normalized.height), (40, 30));

        let decoded = decode(&normalized.bytes).unwrap();
        assert!(!decoded.color().has_alpha());
        for (_, _, pixel) in decoded.to_rgb8().enumerate_pixels() {
            assert!(pixel.0.iter().all(|&c| c >= 250), "{pixel:?}");
        }
    }

    #[test]
    fn test_downscaled_transparency_stays_white() {
        // Alternating opaque white and fully transparent black columns
        let src = RgbaImage::from_fn(2048, 64, |x, _| {
            if x % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let canvas = render_on_white(&DynamicImage::ImageRgba8(src), 1024, 32).unwrap();
        assert_eq!(canvas.dimensions(), (1024, 32));

        let min = canvas.pixels().flat_map(|p| p.0).min().unwrap();
        assert!(min >= 250, "darkest channel after downscale = {min}");
    }

    #[test]
    fn test_downscaled_translucent_edge_has_no_dark_fringe() {
        // Opaque red left half, transparent black right half
        let src = RgbaImage::from_fn(2048, 64, |x, _| {
            if x < 1024 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let canvas = render_on_white(&DynamicImage::ImageRgba8(src), 1024, 32).unwrap();

        // Across the boundary red stays saturated and blends toward white only
        for pixel in canvas.pixels() {
            let [r, g, b] = pixel.0;
            assert!(r >= 250, "{pixel:?}");
            assert!(g.abs_diff(b) <= 2, "{pixel:?}");
        }
        assert!(canvas.get_pixel(1023, 16).0[1] >= 250);
    }

    #[test]
    fn test_normalized_payload_is_jpeg() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 120, 30])));
        let normalized = normalize(&img).unwrap();
        assert_eq!(
            ImageFormat::from_magic_bytes(&normalized.bytes),
            Some(ImageFormat::Jpeg)
        );
        assert!(normalized
            .to_data_url()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_large_image_is_downscaled() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1500, 500, WHITE));
        let normalized = normalize(&img).unwrap();
        assert_eq!((normalized.width, normalized.height), (1024, 341));

        let decoded = decode(&normalized.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (1024, 341));
    }

    #[test]
    fn test_sliver_collapsing_to_zero_is_canvas_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 3000, WHITE));
        let err = normalize(&img).unwrap_err();
        assert!(matches!(err, PlushyError::Canvas(_)));
    }

    #[test]
    fn test_decode_garbage_is_load_error() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PlushyError::LoadImage(_)));
        assert_eq!(err.to_string(), "Failed to load image");
    }

    #[tokio::test]
    async fn test_intake_rejects_non_image_type() {
        let file = SourceFile::from_bytes("notes.txt", "text/plain", b"hello".to_vec());
        let err = intake(&file).await.unwrap_err();
        assert!(matches!(err, PlushyError::InvalidFileType { .. }));
        assert!(err.is_intake());
    }

    #[tokio::test]
    async fn test_intake_rejects_undecodable_image() {
        let file = SourceFile::from_bytes("broken.png", "image/png", vec![0u8; 64]);
        let err = intake(&file).await.unwrap_err();
        assert!(matches!(err, PlushyError::LoadImage(_)));
    }

    #[tokio::test]
    async fn test_intake_svg_from_disk_is_load_error() {
        let path = std::env::temp_dir().join(format!("plushy-intake-{}.svg", std::process::id()));
        std::fs::write(&path, br#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).unwrap();

        let err = intake(&SourceFile::from_path(&path)).await.unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, PlushyError::LoadImage(_)));
        assert_eq!(err.to_string(), "Failed to load image");
    }

    #[tokio::test]
    async fn test_intake_produces_source_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2048,
            1024,
            Rgba([200, 30, 30, 128]),
        ));
        let file = SourceFile::from_bytes("mushroom.png", "image/png", png_bytes(&img));

        let source = intake(&file).await.unwrap();
        assert_eq!(source.name, "mushroom.png");
        assert_eq!(source.content_type, "image/png");
        assert_eq!(source.mime_type, "image/jpeg");
        assert_eq!((source.width, source.height), (1024, 512));
        assert_eq!(
            source.preview_url,
            format!("data:image/jpeg;base64,{}", source.base64)
        );

        let bytes = source.to_bytes().unwrap();
        assert_eq!(ImageFormat::from_magic_bytes(&bytes), Some(ImageFormat::Jpeg));
    }

    #[tokio::test]
    async fn test_intake_reads_from_disk() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([1, 2, 3])));
        let path = std::env::temp_dir().join(format!("plushy-intake-{}.png", std::process::id()));
        std::fs::write(&path, png_bytes(&img)).unwrap();

        let source = intake(&SourceFile::from_path(&path)).await;
        std::fs::remove_file(&path).unwrap();

        let source = source.unwrap();
        assert_eq!((source.width, source.height), (64, 48));
    }
}
