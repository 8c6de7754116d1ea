// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native raster backend — probing and transcoding in-process with the `image`
// and `png` crates.

use std::io::Cursor;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{ImageInfo, PixelFormat, RasterFormat, ResolutionUnit};
use image::codecs::jpeg::{JpegDecoder, JpegEncoder, PixelDensity, PixelDensityUnit};
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat};
use tracing::{debug, instrument};

use super::backend::{RasterBackend, TranscodeRequest};
use super::bitpack::{WHITE_THRESHOLD, pack_bilevel};

const METRES_PER_INCH: f64 = 0.0254;
const DEFAULT_JPEG_QUALITY: u8 = 85;
const PNG_COMMENT_KEYWORD: &str = "Comment";

/// In-process backend for PNG and JPEG, with dimension-only support for the
/// other formats the `image` crate can sniff.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    jpeg_quality: u8,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// JPEG quality (1-100) used when transcoding to JPEG.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

impl RasterBackend for NativeBackend {
    #[instrument(skip_all, fields(data_len = data.len()))]
    fn probe(&self, data: &[u8]) -> Result<ImageInfo> {
        let format = image::guess_format(data)
            .map_err(|err| BulkscanError::InvalidImage(format!("unrecognised image: {err}")))?;
        let info = match format {
            ImageFormat::Png => probe_png(data)?,
            ImageFormat::Jpeg => probe_jpeg(data)?,
            other => probe_generic(data, other)?,
        };
        debug!(
            format = %info.format,
            width = info.width,
            height = info.height,
            pixels = %info.pixel_format,
            "image probed"
        );
        Ok(info)
    }

    #[instrument(skip(self, data), fields(data_len = data.len()))]
    fn transcode(&self, data: &[u8], request: &TranscodeRequest) -> Result<Vec<u8>> {
        let source = self.probe(data)?;
        let mut image = image::load_from_memory(data).map_err(|err| {
            BulkscanError::InvalidImage(format!("failed to decode image: {err}"))
        })?;

        if let Some((width, height)) = request.size {
            if (width, height) != (image.width(), image.height()) {
                image = image.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
            }
        }

        let density = match request.resolution_dpi {
            Some(dpi) => Some((dpi, dpi)),
            None => source.dpi().ok(),
        };

        let pixels = match request.pixel_format {
            PixelFormat::BlackWhite => DynamicImage::ImageLuma8(threshold(image.to_luma8())),
            PixelFormat::Grayscale => DynamicImage::ImageLuma8(image.to_luma8()),
            PixelFormat::Rgb => DynamicImage::ImageRgb8(image.to_rgb8()),
        };

        let encoded = match &request.format {
            RasterFormat::Png => encode_png(
                &pixels,
                request.pixel_format,
                density,
                source.comment.as_deref(),
            )?,
            RasterFormat::Jpeg => encode_jpeg(&pixels, self.jpeg_quality, density)?,
            RasterFormat::Gray => pixels.to_luma8().into_raw(),
            RasterFormat::Rgb => pixels.to_rgb8().into_raw(),
            other => {
                return Err(BulkscanError::Unsupported(format!(
                    "native backend cannot encode {other}"
                )));
            }
        };

        debug!(
            to = %request.format,
            width = pixels.width(),
            height = pixels.height(),
            bytes = encoded.len(),
            "image transcoded"
        );
        Ok(encoded)
    }
}

// -- Probing ------------------------------------------------------------------

fn probe_png(data: &[u8]) -> Result<ImageInfo> {
    let decoder = png::Decoder::new(Cursor::new(data));
    let reader = decoder
        .read_info()
        .map_err(|err| BulkscanError::InvalidImage(format!("PNG header: {err}")))?;
    let info = reader.info();

    let pixel_format = match info.color_type {
        png::ColorType::Grayscale | png::ColorType::GrayscaleAlpha => {
            if info.bit_depth == png::BitDepth::One {
                PixelFormat::BlackWhite
            } else {
                PixelFormat::Grayscale
            }
        }
        png::ColorType::Rgb | png::ColorType::Rgba | png::ColorType::Indexed => PixelFormat::Rgb,
    };

    let (resolution_x, resolution_y, unit) = match info.pixel_dims {
        Some(png::PixelDimensions {
            xppu,
            yppu,
            unit: png::Unit::Meter,
        }) => (
            f64::from(xppu) * METRES_PER_INCH,
            f64::from(yppu) * METRES_PER_INCH,
            ResolutionUnit::PixelsPerInch,
        ),
        _ => (0.0, 0.0, ResolutionUnit::Undefined),
    };

    let comment = info
        .uncompressed_latin1_text
        .iter()
        .find(|chunk| chunk.keyword == PNG_COMMENT_KEYWORD)
        .map(|chunk| chunk.text.clone());

    Ok(ImageInfo {
        width: info.width,
        height: info.height,
        resolution_x,
        resolution_y,
        unit,
        format: RasterFormat::Png,
        pixel_format,
        comment,
    })
}

fn probe_jpeg(data: &[u8]) -> Result<ImageInfo> {
    let decoder = JpegDecoder::new(Cursor::new(data))
        .map_err(|err| BulkscanError::InvalidImage(format!("JPEG header: {err}")))?;
    let (width, height) = decoder.dimensions();
    let pixel_format = pixel_format_of(decoder.color_type());
    let segments = scan_jpeg_segments(data);

    let (resolution_x, resolution_y, unit) = match segments.density {
        Some((1, x, y)) => (f64::from(x), f64::from(y), ResolutionUnit::PixelsPerInch),
        Some((2, x, y)) => (f64::from(x), f64::from(y), ResolutionUnit::PixelsPerCentimeter),
        _ => (0.0, 0.0, ResolutionUnit::Undefined),
    };

    Ok(ImageInfo {
        width,
        height,
        resolution_x,
        resolution_y,
        unit,
        format: RasterFormat::Jpeg,
        pixel_format,
        comment: segments.comment,
    })
}

fn probe_generic(data: &[u8], format: ImageFormat) -> Result<ImageInfo> {
    let image = image::load_from_memory_with_format(data, format)
        .map_err(|err| BulkscanError::InvalidImage(format!("failed to decode image: {err}")))?;
    Ok(ImageInfo {
        width: image.width(),
        height: image.height(),
        resolution_x: 0.0,
        resolution_y: 0.0,
        unit: ResolutionUnit::Undefined,
        format: RasterFormat::from_name(&format!("{format:?}")),
        pixel_format: pixel_format_of(image.color()),
        comment: None,
    })
}

fn pixel_format_of(color: image::ColorType) -> PixelFormat {
    match color {
        image::ColorType::L8
        | image::ColorType::La8
        | image::ColorType::L16
        | image::ColorType::La16 => PixelFormat::Grayscale,
        _ => PixelFormat::Rgb,
    }
}

/// Density and comment found in a JPEG's header segments.
#[derive(Debug, Default)]
struct JpegSegments {
    /// JFIF `(units, x, y)`.
    density: Option<(u8, u16, u16)>,
    comment: Option<String>,
}

/// Walk JPEG marker segments up to start-of-scan.
fn scan_jpeg_segments(data: &[u8]) -> JpegSegments {
    let mut found = JpegSegments::default();
    let mut pos = 2; // past SOI
    while pos + 4 <= data.len() && data[pos] == 0xFF {
        let marker = data[pos + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        let len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let body_start = pos + 4;
        let body_end = pos + 2 + len;
        if len < 2 || body_end > data.len() {
            break;
        }
        let body = &data[body_start..body_end];
        match marker {
            0xE0 if body.len() >= 12 && body.starts_with(b"JFIF\0") => {
                let units = body[7];
                let x = u16::from_be_bytes([body[8], body[9]]);
                let y = u16::from_be_bytes([body[10], body[11]]);
                found.density = Some((units, x, y));
            }
            0xFE => {
                found.comment = Some(String::from_utf8_lossy(body).into_owned());
            }
            _ => {}
        }
        pos = body_end;
    }
    found
}

// -- Encoding -----------------------------------------------------------------

fn threshold(mut luma: GrayImage) -> GrayImage {
    for pixel in luma.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= WHITE_THRESHOLD { 255 } else { 0 };
    }
    luma
}

fn png_err(err: png::EncodingError) -> BulkscanError {
    BulkscanError::InvalidImage(format!("PNG encoding failed: {err}"))
}

fn encode_png(
    image: &DynamicImage,
    pixel_format: PixelFormat,
    density: Option<(f64, f64)>,
    comment: Option<&str>,
) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let (color, depth, samples) = match pixel_format {
        PixelFormat::BlackWhite => (
            png::ColorType::Grayscale,
            png::BitDepth::One,
            pack_bilevel(image.to_luma8().as_raw(), width, height)?,
        ),
        PixelFormat::Grayscale => (
            png::ColorType::Grayscale,
            png::BitDepth::Eight,
            image.to_luma8().into_raw(),
        ),
        PixelFormat::Rgb => (
            png::ColorType::Rgb,
            png::BitDepth::Eight,
            image.to_rgb8().into_raw(),
        ),
    };

    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, width, height);
        encoder.set_color(color);
        encoder.set_depth(depth);
        if let Some((x, y)) = density {
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: (x / METRES_PER_INCH).round() as u32,
                yppu: (y / METRES_PER_INCH).round() as u32,
                unit: png::Unit::Meter,
            }));
        }
        if let Some(comment) = comment {
            encoder
                .add_text_chunk(PNG_COMMENT_KEYWORD.to_string(), comment.to_string())
                .map_err(png_err)?;
        }
        let mut writer = encoder.write_header().map_err(png_err)?;
        writer.write_image_data(&samples).map_err(png_err)?;
        writer.finish().map_err(png_err)?;
    }
    Ok(buffer)
}

fn encode_jpeg(image: &DynamicImage, quality: u8, density: Option<(f64, f64)>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    if let Some((x, y)) = density {
        encoder.set_pixel_density(PixelDensity {
            density: (clamp_density(x), clamp_density(y)),
            unit: PixelDensityUnit::Inches,
        });
    }
    let result = match image {
        DynamicImage::ImageLuma8(luma) => luma.write_with_encoder(encoder),
        other => other.to_rgb8().write_with_encoder(encoder),
    };
    result.map_err(|err| BulkscanError::InvalidImage(format!("JPEG encoding failed: {err}")))?;
    Ok(buffer)
}

fn clamp_density(dpi: f64) -> u16 {
    dpi.round().clamp(1.0, f64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_png(width: u32, height: u32, ppm: u32, comment: Option<&str>) -> Vec<u8> {
        let samples: Vec<u8> = (0..width * height).map(|i| (i % 256) as u8).collect();
        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, width, height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
            if let Some(comment) = comment {
                encoder
                    .add_text_chunk(PNG_COMMENT_KEYWORD.into(), comment.into())
                    .unwrap();
            }
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&samples).unwrap();
        }
        buffer
    }

    #[test]
    fn probes_png_resolution_and_comment() {
        let data = gray_png(40, 20, 11811, Some(r#"{"side":"front"}"#));
        let info = NativeBackend::new().probe(&data).unwrap();
        assert_eq!((info.width, info.height), (40, 20));
        assert_eq!(info.format, RasterFormat::Png);
        assert_eq!(info.pixel_format, PixelFormat::Grayscale);
        assert_eq!(info.unit, ResolutionUnit::PixelsPerInch);
        assert!((info.resolution_x - 300.0).abs() < 0.01);
        assert_eq!(info.comment.as_deref(), Some(r#"{"side":"front"}"#));
    }

    #[test]
    fn png_without_phys_has_no_resolution() {
        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, 2, 2);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0u8; 12]).unwrap();
        }
        let info = NativeBackend::new().probe(&buffer).unwrap();
        assert_eq!(info.unit, ResolutionUnit::Undefined);
        assert!(matches!(info.dpi(), Err(BulkscanError::InvalidImage(_))));
    }

    #[test]
    fn bilevel_png_round_trips_through_probe() {
        let backend = NativeBackend::new();
        let source = gray_png(30, 10, 11811, Some("note"));
        let request = TranscodeRequest {
            format: RasterFormat::Png,
            pixel_format: PixelFormat::BlackWhite,
            size: None,
            resolution_dpi: None,
        };
        let bilevel = backend.transcode(&source, &request).unwrap();
        let info = backend.probe(&bilevel).unwrap();
        assert_eq!(info.pixel_format, PixelFormat::BlackWhite);
        assert_eq!((info.width, info.height), (30, 10));
        assert_eq!(info.comment.as_deref(), Some("note"));
    }

    #[test]
    fn jpeg_carries_requested_density() {
        let backend = NativeBackend::new();
        let source = gray_png(64, 32, 11811, None);
        let request = TranscodeRequest {
            format: RasterFormat::Jpeg,
            pixel_format: PixelFormat::Grayscale,
            size: Some((32, 16)),
            resolution_dpi: Some(150.0),
        };
        let jpeg = backend.transcode(&source, &request).unwrap();
        let info = backend.probe(&jpeg).unwrap();
        assert_eq!(info.format, RasterFormat::Jpeg);
        assert_eq!((info.width, info.height), (32, 16));
        assert_eq!(info.pixel_format, PixelFormat::Grayscale);
        assert_eq!(info.dpi().unwrap(), (150.0, 150.0));
    }

    #[test]
    fn raw_output_has_sample_length() {
        let backend = NativeBackend::new();
        let source = gray_png(7, 5, 3937, None);
        let gray = backend
            .transcode(
                &source,
                &TranscodeRequest {
                    format: RasterFormat::Gray,
                    pixel_format: PixelFormat::BlackWhite,
                    size: None,
                    resolution_dpi: None,
                },
            )
            .unwrap();
        assert_eq!(gray.len(), 35);
        assert!(gray.iter().all(|&v| v == 0 || v == 255));

        let rgb = backend
            .transcode(
                &source,
                &TranscodeRequest {
                    format: RasterFormat::Rgb,
                    pixel_format: PixelFormat::Rgb,
                    size: Some((14, 10)),
                    resolution_dpi: Some(200.0),
                },
            )
            .unwrap();
        assert_eq!(rgb.len(), 14 * 10 * 3);
    }

    #[test]
    fn garbage_is_invalid() {
        let result = NativeBackend::new().probe(b"definitely not an image");
        assert!(matches!(result, Err(BulkscanError::InvalidImage(_))));
    }
}
