// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF compositor — places one normalized image per page on a fixed physical
// canvas and serialises the result with `lopdf`.

use std::io::Write;
use std::path::Path;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{PageGeometry, PixelFormat, RasterFormat};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument};

use crate::image::bitpack::pack_bilevel;
use crate::image::pdf_image::PdfImage;

const POINTS_PER_MM: f64 = 72.0 / 25.4;
const IMAGE_NAME: &str = "Im0";

/// Where and how large an image was drawn, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    /// Uniform scale applied to the image's physical extents (at most 1).
    pub scale: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    /// Distance from the left edge of the canvas.
    pub offset_x_mm: f64,
    /// Distance from the bottom edge of the canvas.
    pub offset_y_mm: f64,
}

/// Fit `extents_mm` into the printable area and center it on the canvas.
///
/// Images are shrunk to fit but never enlarged. Centering uses the full page,
/// not the printable area, so unequal margins do not shift the image.
pub fn compute_placement(geometry: &PageGeometry, extents_mm: (f64, f64)) -> PagePlacement {
    let (page_w, page_h) = geometry.page_size_mm();
    let (printable_w, printable_h) = geometry.printable_area_mm();
    let (image_w, image_h) = extents_mm;

    let scale = (printable_w / image_w).min(printable_h / image_h).min(1.0);
    let width_mm = image_w * scale;
    let height_mm = image_h * scale;

    PagePlacement {
        scale,
        width_mm,
        height_mm,
        offset_x_mm: (page_w - width_mm) / 2.0,
        offset_y_mm: (page_h - height_mm) / 2.0,
    }
}

/// Builds a PDF with one image per page.
///
/// ```ignore
/// let mut compositor = PdfCompositor::new(PageGeometry::default())?;
/// compositor.add_page(&normalized)?;
/// compositor.close("out.pdf")?;
/// ```
pub struct PdfCompositor {
    geometry: PageGeometry,
    title: Option<String>,
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<Object>,
}

impl PdfCompositor {
    /// Start an empty document. Fails when the margins leave no printable area.
    pub fn new(geometry: PageGeometry) -> Result<Self> {
        geometry.validate()?;
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Ok(Self {
            geometry,
            title: None,
            document,
            pages_id,
            page_ids: Vec::new(),
        })
    }

    /// Set the `/Title` entry of the document information dictionary.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Canvas every page is placed on.
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Number of pages added so far.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page showing `image`.
    ///
    /// The image must already be normalized: JPEG, raw GRAY (grayscale or
    /// bilevel) or raw RGB. Images without a positive finite physical size
    /// are rejected before anything is added.
    #[instrument(skip(self, image), fields(page = self.page_ids.len() + 1, format = %image.format()))]
    pub fn add_page(&mut self, image: &PdfImage) -> Result<PagePlacement> {
        let (extent_w, extent_h) = image.extents_mm();
        if !(extent_w.is_finite() && extent_h.is_finite() && extent_w > 0.0 && extent_h > 0.0) {
            return Err(BulkscanError::InvalidImage(format!(
                "{image} has no usable physical size ({extent_w} x {extent_h} mm)"
            )));
        }
        let xobject = image_xobject(image)?;
        let image_id = self.document.add_object(xobject);

        let placement = compute_placement(&self.geometry, (extent_w, extent_h));
        let (page_w, page_h) = self.geometry.page_size_mm();

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        points(placement.width_mm),
                        0.into(),
                        0.into(),
                        points(placement.height_mm),
                        points(placement.offset_x_mm),
                        points(placement.offset_y_mm),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| BulkscanError::PdfError(format!("content stream: {e}")))?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), points(page_w), points(page_h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        });
        self.page_ids.push(page_id.into());

        debug!(
            scale = placement.scale,
            width_mm = placement.width_mm,
            height_mm = placement.height_mm,
            "page placed"
        );
        Ok(placement)
    }

    /// Serialise the document.
    #[instrument(skip(self), fields(pages = self.page_ids.len()))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let count = self.page_ids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => std::mem::take(&mut self.page_ids),
                "Count" => count,
            }),
        );

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let mut info = dictionary! {
            "Producer" => Object::string_literal("bulkscan"),
        };
        if let Some(title) = &self.title {
            info.set("Title", Object::string_literal(title.as_str()));
        }
        let info_id = self.document.add_object(info);
        self.document.trailer.set("Info", info_id);

        let mut buffer = Vec::new();
        self.document
            .save_to(&mut buffer)
            .map_err(|e| BulkscanError::PdfError(format!("failed to serialise PDF: {e}")))?;
        info!(pages = count, bytes = buffer.len(), "PDF assembled");
        Ok(buffer)
    }

    /// Serialise the document and write it to `path` atomically.
    ///
    /// The bytes go to a temporary file in the destination directory which is
    /// then renamed over `path`.
    pub fn close(self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.finish()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| BulkscanError::Io(e.error))?;
        info!(path = %path.display(), "PDF written");
        Ok(())
    }
}

fn points(mm: f64) -> Object {
    Object::Real((mm * POINTS_PER_MM) as f32)
}

fn color_space(pixel_format: PixelFormat) -> &'static str {
    match pixel_format {
        PixelFormat::BlackWhite | PixelFormat::Grayscale => "DeviceGray",
        PixelFormat::Rgb => "DeviceRGB",
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Build the image XObject stream for a normalized image.
fn image_xobject(image: &PdfImage) -> Result<Stream> {
    let (width, height) = (image.width(), image.height());
    let pixel_format = image.pixel_format();

    let (filter, bits, data): (&str, i64, Vec<u8>) = match (image.format(), pixel_format) {
        (RasterFormat::Jpeg, PixelFormat::Grayscale | PixelFormat::Rgb) => {
            ("DCTDecode", 8, image.data().to_vec())
        }
        (RasterFormat::Gray, PixelFormat::BlackWhite) => {
            let packed = pack_bilevel(image.data(), width, height)?;
            ("FlateDecode", 1, deflate(&packed)?)
        }
        (RasterFormat::Gray, PixelFormat::Grayscale) | (RasterFormat::Rgb, PixelFormat::Rgb) => {
            let expected = width as usize * height as usize * pixel_format.components();
            if image.data().len() != expected {
                return Err(BulkscanError::InvalidImage(format!(
                    "raw {} buffer holds {} bytes, expected {expected}",
                    image.format(),
                    image.data().len()
                )));
            }
            ("FlateDecode", 8, deflate(image.data())?)
        }
        (format, pixel_format) => {
            return Err(BulkscanError::Unsupported(format!(
                "cannot embed {format} {pixel_format} image; normalize it first"
            )));
        }
    };

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => color_space(pixel_format),
        "BitsPerComponent" => bits,
        "Filter" => filter,
    };
    Ok(Stream::new(dict, data).with_compression(false))
}
