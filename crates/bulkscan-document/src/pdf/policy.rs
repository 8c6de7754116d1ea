// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Normalization policy — how stored page images are reduced before being
// embedded in a PDF.

use bulkscan_core::config::QualityPreset;
use bulkscan_core::error::Result;
use bulkscan_core::{PixelFormat, RasterFormat};
use tracing::instrument;

use crate::image::backend::RasterBackend;
use crate::image::pdf_image::{PdfImage, raw_format_for};

/// Ceiling on pixel format and resolution, plus whether JPEG may be used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationPolicy {
    pub max_pixel_format: PixelFormat,
    pub allow_lossy: bool,
    pub max_resolution_dpi: f64,
}

impl NormalizationPolicy {
    /// Colour JPEG at up to 300 dpi.
    pub fn high_color() -> Self {
        Self {
            max_pixel_format: PixelFormat::Rgb,
            allow_lossy: true,
            max_resolution_dpi: 300.0,
        }
    }

    /// Colour JPEG at up to 150 dpi.
    pub fn mid_color() -> Self {
        Self {
            max_pixel_format: PixelFormat::Rgb,
            allow_lossy: true,
            max_resolution_dpi: 150.0,
        }
    }

    /// Grayscale JPEG at up to 150 dpi.
    pub fn mid_gray() -> Self {
        Self {
            max_pixel_format: PixelFormat::Grayscale,
            allow_lossy: true,
            max_resolution_dpi: 150.0,
        }
    }

    /// Bilevel at 100 dpi. JPEG is allowed but never chosen for bilevel data.
    pub fn low_bw() -> Self {
        Self {
            max_pixel_format: PixelFormat::BlackWhite,
            allow_lossy: true,
            max_resolution_dpi: 100.0,
        }
    }

    /// Policy for a configured quality preset.
    pub fn from_preset(preset: QualityPreset) -> Self {
        match preset {
            QualityPreset::HighColor => Self::high_color(),
            QualityPreset::MidColor => Self::mid_color(),
            QualityPreset::MidGray => Self::mid_gray(),
            QualityPreset::LowBw => Self::low_bw(),
        }
    }

    /// Convert `image` into something the compositor can embed.
    ///
    /// The pixel format is only ever lowered to the ceiling. When either axis
    /// exceeds the maximum resolution the image is resampled to the maximum or
    /// to its lower native axis, whichever is smaller, so no axis is enlarged.
    #[instrument(skip(self, backend, image), fields(image = %image))]
    pub fn reformat(&self, backend: &dyn RasterBackend, image: &PdfImage) -> Result<PdfImage> {
        let pixel_format = image.pixel_format().min(self.max_pixel_format);
        let format = if self.allow_lossy && pixel_format >= PixelFormat::Grayscale {
            RasterFormat::Jpeg
        } else {
            raw_format_for(pixel_format)
        };

        // One target resolution, never above either native axis.
        let (rx, ry) = (image.resolution_x_dpi(), image.resolution_y_dpi());
        let resolution =
            (rx.max(ry) > self.max_resolution_dpi).then(|| self.max_resolution_dpi.min(rx.min(ry)));

        image.convert_to(backend, Some(format), Some(pixel_format), resolution)
    }
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self::from_preset(QualityPreset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn image(backend: &FakeBackend, pixel_format: PixelFormat, dpi: f64) -> PdfImage {
        let data = FakeBackend::encode(1000, 1400, dpi, dpi, "PNG", pixel_format);
        PdfImage::from_bytes(backend, data).unwrap()
    }

    #[test]
    fn color_is_downgraded_to_gray_jpeg() {
        let backend = FakeBackend::new();
        let out = NormalizationPolicy::mid_gray()
            .reformat(&backend, &image(&backend, PixelFormat::Rgb, 300.0))
            .unwrap();
        assert_eq!(out.format(), &RasterFormat::Jpeg);
        assert_eq!(out.pixel_format(), PixelFormat::Grayscale);
        assert_eq!(out.resolution_x_dpi(), 150.0);
        assert_eq!((out.width(), out.height()), (500, 700));
    }

    #[test]
    fn pixel_format_is_never_upgraded() {
        let backend = FakeBackend::new();
        let out = NormalizationPolicy::high_color()
            .reformat(&backend, &image(&backend, PixelFormat::Grayscale, 300.0))
            .unwrap();
        assert_eq!(out.pixel_format(), PixelFormat::Grayscale);
        assert_eq!(out.format(), &RasterFormat::Jpeg);
    }

    #[test]
    fn bilevel_is_always_raw() {
        let backend = FakeBackend::new();
        let out = NormalizationPolicy::low_bw()
            .reformat(&backend, &image(&backend, PixelFormat::Rgb, 300.0))
            .unwrap();
        assert_eq!(out.format(), &RasterFormat::Gray);
        assert_eq!(out.pixel_format(), PixelFormat::BlackWhite);
        assert_eq!(out.data().len(), 333 * 467);
    }

    #[test]
    fn lossless_policy_uses_raw_rgb() {
        let backend = FakeBackend::new();
        let policy = NormalizationPolicy {
            allow_lossy: false,
            ..NormalizationPolicy::high_color()
        };
        let out = policy
            .reformat(&backend, &image(&backend, PixelFormat::Rgb, 200.0))
            .unwrap();
        assert_eq!(out.format(), &RasterFormat::Rgb);
        assert_eq!(out.data().len(), 1000 * 1400 * 3);
    }

    #[test]
    fn low_resolution_is_not_upscaled() {
        let backend = FakeBackend::new();
        NormalizationPolicy::mid_color()
            .reformat(&backend, &image(&backend, PixelFormat::Rgb, 100.0))
            .unwrap();
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].resolution_dpi, None);
        assert_eq!(requests[0].size, None);
    }

    #[test]
    fn anisotropic_resolution_never_upscales_an_axis() {
        let backend = FakeBackend::new();
        let data = FakeBackend::encode(1000, 1000, 300.0, 150.0, "PNG", PixelFormat::Rgb);
        let source = PdfImage::from_bytes(&backend, data).unwrap();
        let policy = NormalizationPolicy {
            max_resolution_dpi: 200.0,
            ..NormalizationPolicy::high_color()
        };
        let out = policy.reformat(&backend, &source).unwrap();
        assert_eq!((out.width(), out.height()), (500, 1000));
        assert_eq!(out.resolution_x_dpi(), 150.0);
        assert_eq!(out.resolution_y_dpi(), 150.0);
        assert_eq!(backend.requests()[0].size, Some((500, 1000)));
    }

    #[test]
    fn presets_map_from_config() {
        assert_eq!(
            NormalizationPolicy::from_preset(QualityPreset::LowBw),
            NormalizationPolicy::low_bw()
        );
        assert_eq!(
            NormalizationPolicy::default(),
            NormalizationPolicy::mid_gray()
        );
    }
}
