// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PdfImage — an immutable encoded image plus the geometry needed to place it
// on a PDF page.

use std::path::Path;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{ImageInfo, PixelFormat, RasterFormat, is_valid_resolution};
use tracing::{debug, instrument};

use super::backend::{RasterBackend, TranscodeRequest, read_image_file};

const MM_PER_INCH: f64 = 25.4;

/// Encoded image bytes with their format, pixel format, size and resolution.
///
/// Values are never mutated; every conversion yields a new `PdfImage`.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfImage {
    data: Vec<u8>,
    format: RasterFormat,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    resolution_x_dpi: f64,
    resolution_y_dpi: f64,
    comment: Option<String>,
}

impl PdfImage {
    // -- Construction ---------------------------------------------------------

    /// Wrap encoded bytes whose properties were already probed.
    pub fn from_info(data: Vec<u8>, info: &ImageInfo) -> Result<Self> {
        let (resolution_x_dpi, resolution_y_dpi) = info.dpi()?;
        Ok(Self {
            data,
            format: info.format.clone(),
            pixel_format: info.pixel_format,
            width: info.width,
            height: info.height,
            resolution_x_dpi,
            resolution_y_dpi,
            comment: info.comment.clone(),
        })
    }

    /// Probe encoded bytes and wrap them.
    #[instrument(skip_all, fields(data_len = data.len()))]
    pub fn from_bytes(backend: &dyn RasterBackend, data: Vec<u8>) -> Result<Self> {
        let info = backend.probe(&data)?;
        Self::from_info(data, &info)
    }

    /// Read and probe an image file.
    pub fn from_file(backend: &dyn RasterBackend, path: impl AsRef<Path>) -> Result<Self> {
        let data = read_image_file(path.as_ref())?;
        Self::from_bytes(backend, data)
    }

    /// Wrap an uncompressed sample buffer (`Gray` or `Rgb`).
    ///
    /// The buffer length must match `width * height * components` and the
    /// resolution must be finite and positive.
    pub fn raw(
        data: Vec<u8>,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        resolution_dpi: f64,
    ) -> Result<Self> {
        let format = raw_format_for(pixel_format);
        if !is_valid_resolution(resolution_dpi) {
            return Err(BulkscanError::InvalidImage(format!(
                "raw {format} buffer at {resolution_dpi} dpi"
            )));
        }
        let expected = width as usize * height as usize * pixel_format.components();
        if data.len() != expected {
            return Err(BulkscanError::InvalidImage(format!(
                "raw {format} buffer holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            format,
            pixel_format,
            width,
            height,
            resolution_x_dpi: resolution_dpi,
            resolution_y_dpi: resolution_dpi,
            comment: None,
        })
    }

    // -- Accessors ------------------------------------------------------------

    /// Encoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Container format of `data`.
    pub fn format(&self) -> &RasterFormat {
        &self.format
    }

    /// Sample layout of the decoded pixels.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Horizontal resolution in dots per inch.
    pub fn resolution_x_dpi(&self) -> f64 {
        self.resolution_x_dpi
    }

    /// Vertical resolution in dots per inch.
    pub fn resolution_y_dpi(&self) -> f64 {
        self.resolution_y_dpi
    }

    /// Embedded text comment, if the format carries one.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Physical size in millimetres at the image's native resolution.
    pub fn extents_mm(&self) -> (f64, f64) {
        (
            f64::from(self.width) / self.resolution_x_dpi * MM_PER_INCH,
            f64::from(self.height) / self.resolution_y_dpi * MM_PER_INCH,
        )
    }

    // -- Conversion -----------------------------------------------------------

    /// Produce a new image in a different format, pixel format or resolution.
    ///
    /// Unset parameters keep the current value. A resolution change rescales
    /// each axis by `target / native`, rounded to the nearest pixel, and the
    /// result carries `target` on both axes. A request that changes nothing
    /// returns a clone without calling the backend.
    #[instrument(skip(self, backend), fields(from = %self.format, from_pixels = %self.pixel_format))]
    pub fn convert_to(
        &self,
        backend: &dyn RasterBackend,
        target_format: Option<RasterFormat>,
        target_pixel_format: Option<PixelFormat>,
        target_resolution_dpi: Option<f64>,
    ) -> Result<Self> {
        let format = target_format.unwrap_or_else(|| self.format.clone());
        let pixel_format = target_pixel_format.unwrap_or(self.pixel_format);
        check_combination(&format, pixel_format)?;

        let (width, height, resolution_x_dpi, resolution_y_dpi) = match target_resolution_dpi {
            Some(dpi) if !is_valid_resolution(dpi) => {
                return Err(BulkscanError::InvalidImage(format!(
                    "target resolution {dpi} dpi"
                )));
            }
            Some(dpi) => (
                scale_axis(self.width, dpi / self.resolution_x_dpi),
                scale_axis(self.height, dpi / self.resolution_y_dpi),
                dpi,
                dpi,
            ),
            None => (
                self.width,
                self.height,
                self.resolution_x_dpi,
                self.resolution_y_dpi,
            ),
        };

        let resized = (width, height) != (self.width, self.height);
        let resolution_changed = (resolution_x_dpi - self.resolution_x_dpi).abs() > f64::EPSILON
            || (resolution_y_dpi - self.resolution_y_dpi).abs() > f64::EPSILON;
        if format == self.format
            && pixel_format == self.pixel_format
            && !resized
            && !resolution_changed
        {
            debug!("conversion is a no-op");
            return Ok(self.clone());
        }

        let request = TranscodeRequest {
            format: format.clone(),
            pixel_format,
            size: target_resolution_dpi.map(|_| (width, height)),
            resolution_dpi: target_resolution_dpi,
        };
        let data = backend.transcode(&self.data, &request)?;

        debug!(
            to = %format,
            to_pixels = %pixel_format,
            width,
            height,
            bytes = data.len(),
            "image converted"
        );

        Ok(Self {
            data,
            format,
            pixel_format,
            width,
            height,
            resolution_x_dpi,
            resolution_y_dpi,
            comment: self.comment.clone(),
        })
    }
}

impl std::fmt::Display for PdfImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PdfImage<{} bytes, {} {}, {} x {}>",
            self.data.len(),
            self.format,
            self.pixel_format,
            self.width,
            self.height
        )
    }
}

/// Raw buffer format able to carry `pixel_format`.
pub fn raw_format_for(pixel_format: PixelFormat) -> RasterFormat {
    match pixel_format {
        PixelFormat::BlackWhite | PixelFormat::Grayscale => RasterFormat::Gray,
        PixelFormat::Rgb => RasterFormat::Rgb,
    }
}

/// Reject format/pixel-format pairs that cannot be represented.
fn check_combination(format: &RasterFormat, pixel_format: PixelFormat) -> Result<()> {
    match (format, pixel_format) {
        (RasterFormat::Jpeg, PixelFormat::BlackWhite) => Err(BulkscanError::Unsupported(
            "JPEG cannot carry black-and-white data".into(),
        )),
        (RasterFormat::Gray, PixelFormat::Rgb) => Err(BulkscanError::Unsupported(
            "raw GRAY buffer cannot carry RGB data".into(),
        )),
        (RasterFormat::Rgb, PixelFormat::BlackWhite | PixelFormat::Grayscale) => Err(
            BulkscanError::Unsupported("raw RGB buffer requires RGB pixel format".into()),
        ),
        _ => Ok(()),
    }
}

fn scale_axis(pixels: u32, ratio: f64) -> u32 {
    ((f64::from(pixels) * ratio).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn scan(backend: &FakeBackend, pixel_format: PixelFormat) -> PdfImage {
        let data = FakeBackend::encode(2480, 3508, 300.0, 300.0, "PNG", pixel_format);
        PdfImage::from_bytes(backend, data).unwrap()
    }

    #[test]
    fn extents_follow_resolution() {
        let backend = FakeBackend::new();
        let image = scan(&backend, PixelFormat::Grayscale);
        let (w, h) = image.extents_mm();
        assert!((w - 209.973).abs() < 0.01);
        assert!((h - 297.011).abs() < 0.01);
        assert_eq!(image.format().name(), "PNG");
    }

    #[test]
    fn bilevel_jpeg_is_unsupported() {
        let backend = FakeBackend::new();
        let image = scan(&backend, PixelFormat::Grayscale);
        let result = image.convert_to(
            &backend,
            Some(RasterFormat::Jpeg),
            Some(PixelFormat::BlackWhite),
            None,
        );
        assert!(matches!(result, Err(BulkscanError::Unsupported(_))));
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn resolution_change_rescales_each_axis() {
        let backend = FakeBackend::new();
        let data = FakeBackend::encode(1000, 1500, 300.0, 200.0, "PNG", PixelFormat::Rgb);
        let image = PdfImage::from_bytes(&backend, data).unwrap();

        let converted = image.convert_to(&backend, None, None, Some(150.0)).unwrap();
        assert_eq!((converted.width(), converted.height()), (500, 1125));
        assert_eq!(converted.resolution_x_dpi(), 150.0);
        assert_eq!(converted.resolution_y_dpi(), 150.0);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].size, Some((500, 1125)));
        assert_eq!(requests[0].resolution_dpi, Some(150.0));
        assert_eq!(requests[0].format, RasterFormat::Png);
        assert_eq!(requests[0].pixel_format, PixelFormat::Rgb);
    }

    #[test]
    fn rounding_goes_to_nearest_pixel() {
        let backend = FakeBackend::new();
        let data = FakeBackend::encode(1001, 999, 300.0, 300.0, "PNG", PixelFormat::Rgb);
        let image = PdfImage::from_bytes(&backend, data).unwrap();
        let converted = image.convert_to(&backend, None, None, Some(100.0)).unwrap();
        assert_eq!((converted.width(), converted.height()), (334, 333));
    }

    #[test]
    fn unchanged_parameters_skip_the_backend() {
        let backend = FakeBackend::new();
        let image = scan(&backend, PixelFormat::Rgb);
        let same = image
            .convert_to(&backend, Some(RasterFormat::Png), None, Some(300.0))
            .unwrap();
        assert_eq!(same, image);
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn format_only_conversion_keeps_geometry() {
        let backend = FakeBackend::new();
        let image = scan(&backend, PixelFormat::Rgb);
        let jpeg = image
            .convert_to(&backend, Some(RasterFormat::Jpeg), None, None)
            .unwrap();
        assert_eq!(jpeg.format(), &RasterFormat::Jpeg);
        assert_eq!((jpeg.width(), jpeg.height()), (2480, 3508));
        assert_eq!(backend.requests()[0].size, None);
    }

    #[test]
    fn raw_rgb_requires_rgb_pixels() {
        let backend = FakeBackend::new();
        let image = scan(&backend, PixelFormat::Grayscale);
        let result = image.convert_to(
            &backend,
            Some(RasterFormat::Rgb),
            Some(PixelFormat::Grayscale),
            None,
        );
        assert!(matches!(result, Err(BulkscanError::Unsupported(_))));
    }

    #[test]
    fn raw_constructor_checks_length() {
        assert!(PdfImage::raw(vec![0; 12], PixelFormat::Rgb, 2, 2, 100.0).is_ok());
        assert!(PdfImage::raw(vec![0; 5], PixelFormat::Grayscale, 2, 2, 100.0).is_err());
    }

    #[test]
    fn raw_constructor_rejects_unusable_resolution() {
        for dpi in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = PdfImage::raw(vec![0; 4], PixelFormat::Grayscale, 2, 2, dpi);
            assert!(
                matches!(result, Err(BulkscanError::InvalidImage(_))),
                "{dpi} dpi accepted"
            );
        }
    }
}
