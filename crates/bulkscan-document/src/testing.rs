// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory raster backend for tests. Compiled for this crate's own tests and
// for dependents that enable the `testing` feature.

use std::sync::Mutex;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{ImageInfo, PixelFormat, RasterFormat, ResolutionUnit};

use crate::image::backend::{RasterBackend, TranscodeRequest};

const MAGIC: &str = "FAKE";

/// A backend over a tiny textual image encoding.
///
/// An encoded image is one header line
/// `FAKE <width> <height> <dpi-x> <dpi-y> <FORMAT> <bw|gray|rgb>` followed by
/// an optional comment. Transcoding to `GRAY` or `RGB` yields a real sample
/// buffer of the right length; anything else yields a new header. Every
/// transcode request is recorded.
#[derive(Debug, Default)]
pub struct FakeBackend {
    requests: Mutex<Vec<TranscodeRequest>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode an image without a comment.
    pub fn encode(
        width: u32,
        height: u32,
        dpi_x: f64,
        dpi_y: f64,
        format: &str,
        pixel_format: PixelFormat,
    ) -> Vec<u8> {
        Self::encode_with_comment(width, height, dpi_x, dpi_y, format, pixel_format, None)
    }

    /// Encode an image carrying `comment`.
    pub fn encode_with_comment(
        width: u32,
        height: u32,
        dpi_x: f64,
        dpi_y: f64,
        format: &str,
        pixel_format: PixelFormat,
        comment: Option<&str>,
    ) -> Vec<u8> {
        let mut text = format!("{MAGIC} {width} {height} {dpi_x} {dpi_y} {format} {pixel_format}\n");
        if let Some(comment) = comment {
            text.push_str(comment);
        }
        text.into_bytes()
    }

    /// Transcode requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl RasterBackend for FakeBackend {
    fn probe(&self, data: &[u8]) -> Result<ImageInfo> {
        let text = std::str::from_utf8(data)
            .map_err(|_| BulkscanError::InvalidImage("not a fake image".into()))?;
        let (header, comment) = text.split_once('\n').unwrap_or((text, ""));
        let fields: Vec<&str> = header.split_whitespace().collect();
        let [magic, width, height, dpi_x, dpi_y, format, pixel_format] = fields.as_slice() else {
            return Err(BulkscanError::InvalidImage("malformed fake header".into()));
        };
        if *magic != MAGIC {
            return Err(BulkscanError::InvalidImage("not a fake image".into()));
        }
        let number = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|e| BulkscanError::InvalidImage(format!("fake header field '{field}': {e}")))
        };
        let pixel_format = match *pixel_format {
            "bw" => PixelFormat::BlackWhite,
            "gray" => PixelFormat::Grayscale,
            "rgb" => PixelFormat::Rgb,
            other => {
                return Err(BulkscanError::InvalidImage(format!(
                    "fake pixel format '{other}'"
                )));
            }
        };
        Ok(ImageInfo {
            width: number(*width)? as u32,
            height: number(*height)? as u32,
            resolution_x: number(*dpi_x)?,
            resolution_y: number(*dpi_y)?,
            unit: ResolutionUnit::PixelsPerInch,
            format: RasterFormat::from_name(format),
            pixel_format,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        })
    }

    fn transcode(&self, data: &[u8], request: &TranscodeRequest) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let source = self.probe(data)?;
        let (width, height) = request.size.unwrap_or((source.width, source.height));

        if request.format.is_raw() {
            let len = width as usize * height as usize * request.pixel_format.components();
            return Ok(vec![0xFF; len]);
        }

        let (dpi_x, dpi_y) = match request.resolution_dpi {
            Some(dpi) => (dpi, dpi),
            None => (source.resolution_x, source.resolution_y),
        };
        Ok(Self::encode_with_comment(
            width,
            height,
            dpi_x,
            dpi_y,
            request.format.name(),
            request.pixel_format,
            source.comment.as_deref(),
        ))
    }
}
