// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Bulkscan documents and images.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BulkscanError, Result};

/// Key/value metadata attached to a document or to a single side.
pub type Properties = BTreeMap<String, String>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of one scanned side (one face of a sheet).
    SideId
);
uuid_id!(
    /// Identifier shared by the front and back side of one physical sheet.
    SheetId
);
uuid_id!(
    /// Identity of a whole document, stored as the `doc_uuid` property.
    DocumentId
);

/// Identifier of a derived image, unique and monotonic within one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DerivativeId(pub i64);

impl fmt::Display for DerivativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which face of a sheet a side was scanned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetSide {
    #[default]
    Front,
    Back,
}

impl SheetSide {
    /// Value stored in the container's `sheet_side` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl FromStr for SheetSide {
    type Err = BulkscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            other => Err(BulkscanError::InvalidImage(format!("unknown sheet side '{other}'"))),
        }
    }
}

/// Kind of processed image attached to a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeType {
    Thumbnail,
    Enhanced,
    Ocr,
}

impl DerivativeType {
    /// Value stored in the container's `derivative_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumb",
            Self::Enhanced => "enhanced",
            Self::Ocr => "ocr",
        }
    }
}

impl FromStr for DerivativeType {
    type Err = BulkscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "thumb" | "thumbnail" => Ok(Self::Thumbnail),
            "enhanced" => Ok(Self::Enhanced),
            "ocr" => Ok(Self::Ocr),
            other => Err(BulkscanError::Database(format!("unknown derivative type '{other}'"))),
        }
    }
}

/// Pixel classification, ordered from least to most information.
///
/// The ordering is used both to describe an image and as a conversion
/// ceiling: `BlackWhite < Grayscale < Rgb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PixelFormat {
    BlackWhite,
    Grayscale,
    Rgb,
}

impl PixelFormat {
    /// Number of colour components per pixel.
    pub fn components(&self) -> usize {
        match self {
            Self::BlackWhite | Self::Grayscale => 1,
            Self::Rgb => 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BlackWhite => "bw",
            Self::Grayscale => "gray",
            Self::Rgb => "rgb",
        };
        f.write_str(name)
    }
}

/// Encoding of an image byte buffer.
///
/// `Gray` and `Rgb` are uncompressed buffers with one byte per sample. A
/// bilevel image in `Gray` form holds one byte per pixel (0 or 255).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterFormat {
    Png,
    Jpeg,
    Tiff,
    Pnm,
    Gray,
    Rgb,
    /// Anything else the probe reports, kept under its upper-case name.
    Other(String),
}

impl RasterFormat {
    /// Parse a format name as reported by an image probe (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "PNG" => Self::Png,
            "JPEG" | "JPG" => Self::Jpeg,
            "TIFF" | "TIF" => Self::Tiff,
            "PNM" | "PBM" | "PGM" | "PPM" => Self::Pnm,
            "GRAY" => Self::Gray,
            "RGB" => Self::Rgb,
            _ => Self::Other(upper),
        }
    }

    /// Normalised upper-case name.
    pub fn name(&self) -> &str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Tiff => "TIFF",
            Self::Pnm => "PNM",
            Self::Gray => "GRAY",
            Self::Rgb => "RGB",
            Self::Other(name) => name,
        }
    }

    /// File extension used when exporting images of this format.
    pub fn extension(&self) -> String {
        match self {
            Self::Png => "png".into(),
            Self::Jpeg => "jpg".into(),
            Self::Tiff => "tif".into(),
            Self::Pnm => "pnm".into(),
            Self::Gray => "gray".into(),
            Self::Rgb => "rgb".into(),
            Self::Other(name) => name.to_ascii_lowercase(),
        }
    }

    /// Whether the buffer is an uncompressed sample array.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Gray | Self::Rgb)
    }
}

impl fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit in which an image reports its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionUnit {
    PixelsPerInch,
    PixelsPerCentimeter,
    Undefined,
}

impl ResolutionUnit {
    /// Parse the unit names used by ImageMagick (`%U`).
    pub fn from_name(name: &str) -> Self {
        match name {
            "PixelsPerInch" => Self::PixelsPerInch,
            "PixelsPerCentimeter" => Self::PixelsPerCentimeter,
            _ => Self::Undefined,
        }
    }
}

/// Result of probing raw image bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub unit: ResolutionUnit,
    pub format: RasterFormat,
    pub pixel_format: PixelFormat,
    /// Embedded free-text comment, if any.
    pub comment: Option<String>,
}

impl ImageInfo {
    /// Horizontal and vertical resolution in dots per inch.
    ///
    /// Pixels-per-centimetre values are multiplied by 2.54. An image without
    /// a resolution unit or with a non-positive or non-finite resolution is
    /// rejected.
    pub fn dpi(&self) -> Result<(f64, f64)> {
        let factor = match self.unit {
            ResolutionUnit::PixelsPerInch => 1.0,
            ResolutionUnit::PixelsPerCentimeter => 2.54,
            ResolutionUnit::Undefined => {
                return Err(BulkscanError::InvalidImage(
                    "image carries no resolution unit".into(),
                ));
            }
        };
        if !is_valid_resolution(self.resolution_x) || !is_valid_resolution(self.resolution_y) {
            return Err(BulkscanError::InvalidImage(format!(
                "invalid resolution {} x {}",
                self.resolution_x, self.resolution_y
            )));
        }
        Ok((self.resolution_x * factor, self.resolution_y * factor))
    }
}

/// Whether `dpi` is usable as a resolution: finite and strictly positive.
pub fn is_valid_resolution(dpi: f64) -> bool {
    dpi.is_finite() && dpi > 0.0
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn uniform(mm: f64) -> Self {
        Self {
            top: mm,
            right: mm,
            bottom: mm,
            left: mm,
        }
    }
}

/// Physical layout of an output page.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    pub paper: PaperSize,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn new(paper: PaperSize, margins: Margins) -> Self {
        Self { paper, margins }
    }

    /// Full canvas size in millimetres.
    pub fn page_size_mm(&self) -> (f64, f64) {
        let (w, h) = self.paper.dimensions_mm();
        (f64::from(w), f64::from(h))
    }

    /// Page size minus margins, in millimetres.
    pub fn printable_area_mm(&self) -> (f64, f64) {
        let (w, h) = self.page_size_mm();
        (
            w - self.margins.left - self.margins.right,
            h - self.margins.top - self.margins.bottom,
        )
    }

    /// Reject geometries whose printable area is empty on either axis.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.printable_area_mm();
        if w > 0.0 && h > 0.0 {
            Ok(())
        } else {
            Err(BulkscanError::GeometryInvalid(format!(
                "printable area {w:.1} x {h:.1} mm"
            )))
        }
    }
}
