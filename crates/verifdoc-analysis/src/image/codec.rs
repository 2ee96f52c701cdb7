// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PixelBuffer adapter. Every conversion between the engine's immutable
// `PixelBuffer` and the `image` crate's buffers goes through here, so the
// analyzers never touch a codec directly.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use tracing::{debug, instrument};
use verifdoc_core::{AnalysisError, Channels, EncodedImage, ImageEncoding, PixelBuffer, Result};

/// Decode encoded bytes (PNG, JPEG, TIFF, ...) into an RGB `PixelBuffer`.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<PixelBuffer> {
    let img = image::load_from_memory(data).map_err(|err| {
        AnalysisError::UnsupportedFormat(format!("failed to decode image: {}", err))
    })?;
    debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    PixelBuffer::new(width, height, Channels::Rgb, rgb.into_raw())
}

/// Copy the buffer into an `RgbImage`, expanding gray to three equal channels.
pub fn to_rgb_image(buffer: &PixelBuffer) -> Result<RgbImage> {
    match buffer.channels() {
        Channels::Rgb => RgbImage::from_raw(buffer.width(), buffer.height(), buffer.data().to_vec())
            .ok_or_else(|| mismatch(buffer)),
        Channels::Gray => {
            let gray = to_gray_image(buffer)?;
            Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
        }
    }
}

/// Copy the buffer into a `GrayImage` using the `image` crate's luma weights.
pub fn to_gray_image(buffer: &PixelBuffer) -> Result<GrayImage> {
    match buffer.channels() {
        Channels::Gray => {
            GrayImage::from_raw(buffer.width(), buffer.height(), buffer.data().to_vec())
                .ok_or_else(|| mismatch(buffer))
        }
        Channels::Rgb => {
            let rgb = to_rgb_image(buffer)?;
            Ok(DynamicImage::ImageRgb8(rgb).to_luma8())
        }
    }
}

/// Shrink `gray` so its width is at most `max_width`, preserving aspect
/// ratio (Lanczos3). Images already within bounds are returned unchanged.
#[instrument(skip(gray), fields(width = gray.width(), height = gray.height()))]
pub fn downscale_to_width(gray: GrayImage, max_width: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width <= max_width {
        return gray;
    }
    let new_height = ((height as f64 * max_width as f64 / width as f64).round() as u32).max(1);
    debug!(new_width = max_width, new_height, "Downscaling for analysis");
    image::imageops::resize(&gray, max_width, new_height, FilterType::Lanczos3)
}

/// Encode `rgb` as JPEG at `quality` and decode it straight back.
pub fn jpeg_round_trip(rgb: &RgbImage, quality: u8) -> Result<RgbImage> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder).map_err(|err| {
        AnalysisError::UnsupportedFormat(format!("JPEG encoding failed: {}", err))
    })?;
    let decoded = image::load_from_memory_with_format(&buffer, ImageFormat::Jpeg).map_err(|err| {
        AnalysisError::UnsupportedFormat(format!("JPEG decoding failed: {}", err))
    })?;
    debug!(jpeg_bytes = buffer.len(), quality, "JPEG round trip complete");
    Ok(decoded.to_rgb8())
}

/// Encode an RGBA raster as PNG.
pub fn encode_png(rgba: RgbaImage) -> Result<EncodedImage> {
    let (width, height) = rgba.dimensions();
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| AnalysisError::UnsupportedFormat(format!("PNG encoding failed: {}", err)))?;
    Ok(EncodedImage {
        encoding: ImageEncoding::Png,
        width,
        height,
        bytes,
    })
}

fn mismatch(buffer: &PixelBuffer) -> AnalysisError {
    AnalysisError::InvalidMetadata(format!(
        "buffer of {} bytes does not fit {}x{}",
        buffer.data().len(),
        buffer.width(),
        buffer.height()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"not an image").unwrap_err();
        assert_eq!(err.code(), "unsupported format");
    }

    #[test]
    fn png_encode_then_decode_keeps_dimensions() {
        let rgba = RgbaImage::from_pixel(7, 5, image::Rgba([10, 20, 30, 255]));
        let encoded = encode_png(rgba).unwrap();
        assert_eq!((encoded.width, encoded.height), (7, 5));

        let buffer = decode(&encoded.bytes).unwrap();
        assert_eq!((buffer.width(), buffer.height()), (7, 5));
        assert_eq!(buffer.channels(), Channels::Rgb);
        assert_eq!(&buffer.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn gray_expands_to_equal_rgb_channels() {
        let gray = PixelBuffer::new(2, 1, Channels::Gray, vec![40, 200]).unwrap();
        let rgb = to_rgb_image(&gray).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([40, 40, 40]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let gray = GrayImage::from_pixel(1600, 900, Luma([128]));
        let small = downscale_to_width(gray, 800);
        assert_eq!(small.dimensions(), (800, 450));
    }

    #[test]
    fn downscale_leaves_small_images_alone() {
        let gray = GrayImage::from_pixel(640, 480, Luma([128]));
        let same = downscale_to_width(gray, 800);
        assert_eq!(same.dimensions(), (640, 480));
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let rgb = RgbImage::from_fn(24, 16, |x, y| Rgb([(x * 10) as u8, (y * 15) as u8, 90]));
        let back = jpeg_round_trip(&rgb, 90).unwrap();
        assert_eq!(back.dimensions(), (24, 16));
    }
}
