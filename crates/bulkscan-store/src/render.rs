// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document renderer — feeds a container's pages through the normalization
// policy into a PDF compositor.

use std::sync::Arc;

use bulkscan_core::error::Result;
use bulkscan_document::{NormalizationPolicy, PdfCompositor, PdfImage, RasterBackend};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::container::DocumentContainer;

/// Renders document containers into PDFs.
pub struct DocumentRenderer {
    backend: Arc<dyn RasterBackend>,
    policy: NormalizationPolicy,
    prefer_enhanced: bool,
}

impl DocumentRenderer {
    pub fn new(backend: Arc<dyn RasterBackend>, policy: NormalizationPolicy) -> Self {
        Self {
            backend,
            policy,
            prefer_enhanced: false,
        }
    }

    /// Use a side's newest enhanced derivative instead of its original when
    /// one exists.
    pub fn prefer_enhanced(mut self, prefer: bool) -> Self {
        self.prefer_enhanced = prefer;
        self
    }

    /// Append every page of `container` to `compositor`, in page order.
    /// Returns the number of pages added.
    #[instrument(skip_all, fields(container = %container, prefer_enhanced = self.prefer_enhanced))]
    pub fn render(
        &self,
        container: &DocumentContainer,
        compositor: &mut PdfCompositor,
    ) -> Result<usize> {
        // The connection is single-threaded; read everything up front.
        let mut sources = Vec::new();
        for side in container.page_order()? {
            let enhanced = if self.prefer_enhanced {
                container.side_images_info(side)?.enhanced.last().map(|d| d.id)
            } else {
                None
            };
            let data = match enhanced {
                Some(id) => {
                    debug!(side = %side, derivative = %id, "using enhanced image");
                    container.derived_image(id)?
                }
                None => container.page_image(side)?,
            };
            sources.push(data);
        }

        let backend = self.backend.as_ref();
        let policy = self.policy;
        let normalized = sources
            .into_par_iter()
            .map(|data| {
                let image = PdfImage::from_bytes(backend, data)?;
                policy.reformat(backend, &image)
            })
            .collect::<Result<Vec<_>>>()?;

        for image in &normalized {
            compositor.add_page(image)?;
        }
        info!(pages = normalized.len(), "document rendered");
        Ok(normalized.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkscan_core::{DerivativeType, PageGeometry, PixelFormat, RasterFormat, SheetSide};
    use bulkscan_document::testing::FakeBackend;

    fn make_container(backend: Arc<FakeBackend>, pages: usize) -> DocumentContainer {
        let mut doc = DocumentContainer::open_in_memory(backend).unwrap();
        for _ in 0..pages {
            let scan = FakeBackend::encode(2480, 3508, 300.0, 300.0, "PNG", PixelFormat::Rgb);
            doc.add_original(&scan, None, None, SheetSide::Front).unwrap();
        }
        doc
    }

    #[test]
    fn renders_every_page_in_order() {
        let backend = Arc::new(FakeBackend::new());
        let doc = make_container(Arc::clone(&backend), 3);
        let renderer = DocumentRenderer::new(backend.clone(), NormalizationPolicy::mid_gray());

        let mut compositor = PdfCompositor::new(PageGeometry::default()).unwrap();
        assert_eq!(renderer.render(&doc, &mut compositor).unwrap(), 3);
        assert_eq!(compositor.page_count(), 3);

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert_eq!(request.format, RasterFormat::Jpeg);
            assert_eq!(request.pixel_format, PixelFormat::Grayscale);
            assert_eq!(request.size, Some((1240, 1754)));
        }

        let pdf = compositor.finish().unwrap();
        let parsed = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn enhanced_derivative_replaces_original() {
        let backend = Arc::new(FakeBackend::new());
        let mut doc = make_container(Arc::clone(&backend), 1);
        let side = doc.page_order().unwrap()[0];
        let older = FakeBackend::encode(1000, 1000, 100.0, 100.0, "PNG", PixelFormat::Rgb);
        let newer = FakeBackend::encode(600, 800, 100.0, 100.0, "PNG", PixelFormat::Grayscale);
        doc.add_derivative(side, &older, DerivativeType::Enhanced).unwrap();
        doc.add_derivative(side, &newer, DerivativeType::Enhanced).unwrap();

        let renderer = DocumentRenderer::new(backend.clone(), NormalizationPolicy::mid_gray())
            .prefer_enhanced(true);
        let mut compositor = PdfCompositor::new(PageGeometry::default()).unwrap();
        renderer.render(&doc, &mut compositor).unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].size, None);
        assert_eq!(requests[0].pixel_format, PixelFormat::Grayscale);
    }

    /// Grayscale PNG at 300 dpi with a horizontal gradient.
    fn gray_png_300dpi(width: u32, height: u32) -> Vec<u8> {
        let samples: Vec<u8> = (0..width * height).map(|i| (i % width) as u8).collect();
        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, width, height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: 11811,
                yppu: 11811,
                unit: png::Unit::Meter,
            }));
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&samples).unwrap();
        }
        buffer
    }

    #[test]
    fn committed_pngs_render_through_the_native_backend() {
        use crate::commit::{CommitPage, CommitRequest, DocumentCommitter};
        use bulkscan_document::NativeBackend;

        let dir = tempfile::tempdir().unwrap();
        let pages: Vec<CommitPage> = (1..=3)
            .map(|n| {
                let path = dir.path().join(format!("scan_{n:03}.png"));
                std::fs::write(&path, gray_png_300dpi(600, 900)).unwrap();
                CommitPage::new(path)
            })
            .collect();

        let backend: Arc<dyn RasterBackend> = Arc::new(NativeBackend::new());
        let mud = DocumentCommitter::new(Arc::clone(&backend), dir.path().join("docs"))
            .commit(&pages, &CommitRequest::default().tag("native"))
            .unwrap();

        let doc = DocumentContainer::open_read_only(&mud, Arc::clone(&backend)).unwrap();
        let names: Vec<String> = doc
            .all_page_properties()
            .unwrap()
            .into_iter()
            .map(|(_, props)| props["orig_filename"].clone())
            .collect();
        assert_eq!(names, vec!["scan_001.png", "scan_002.png", "scan_003.png"]);

        let renderer = DocumentRenderer::new(backend, NormalizationPolicy::mid_gray());
        let mut compositor = PdfCompositor::new(PageGeometry::default()).unwrap();
        assert_eq!(renderer.render(&doc, &mut compositor).unwrap(), 3);

        let pdf = lopdf::Document::load_mem(&compositor.finish().unwrap()).unwrap();
        let pages = pdf.get_pages();
        assert_eq!(pages.len(), 3);
        for page_id in pages.values() {
            let page = pdf.get_dictionary(*page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            let stream = pdf.get_object(image_id).unwrap().as_stream().unwrap();
            assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
            assert_eq!(
                stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(),
                b"DeviceGray"
            );
            assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 300);
            assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 450);
            assert!(stream.content.starts_with(&[0xFF, 0xD8]));
        }
    }

    #[test]
    fn empty_container_renders_nothing() {
        let backend = Arc::new(FakeBackend::new());
        let doc = make_container(Arc::clone(&backend), 0);
        let mut compositor = PdfCompositor::new(PageGeometry::default()).unwrap();
        let renderer = DocumentRenderer::new(backend, NormalizationPolicy::low_bw());
        assert_eq!(renderer.render(&doc, &mut compositor).unwrap(), 0);
        assert_eq!(compositor.page_count(), 0);
    }
}
