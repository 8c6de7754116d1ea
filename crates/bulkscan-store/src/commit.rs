// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document commit — turn a set of scanned page files into a new document
// container in the document directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{AppConfig, DocumentId, SheetId, SheetSide, SideId};
use bulkscan_document::RasterBackend;
use bulkscan_document::image::backend::read_image_file;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::container::DocumentContainer;
use crate::library::CONTAINER_EXTENSION;

/// Name used when no filename attribute is present.
const DEFAULT_BASENAME: &str = "document";

/// Highest numeric suffix tried when a filename is taken.
const MAX_NAME_SUFFIX: u32 = 999;

/// Attributes that contribute to the container's filename, in order.
const FILENAME_ATTRIBUTES: [&str; 3] = ["docdate", "peer", "docname"];

/// Per-page metadata written by the scanner as JSON into the image comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanMetadata {
    pub batch_uuid: Option<String>,
    pub created_utc: Option<String>,
    pub side: Option<SheetSide>,
    pub side_uuid: Option<SideId>,
    /// Identifies the physical sheet both faces were scanned from.
    pub page_uuid: Option<SheetId>,
    pub scanned_page_no: Option<u32>,
}

impl ScanMetadata {
    /// Parse metadata from an image comment, `None` when it is not valid JSON.
    pub fn from_comment(comment: &str) -> Option<Self> {
        serde_json::from_str(comment.trim()).ok()
    }
}

/// One source page file.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPage {
    pub path: PathBuf,
    /// Overrides the metadata embedded in the image comment.
    pub metadata: Option<ScanMetadata>,
}

impl CommitPage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ScanMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Document-level attributes and tags for a commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitRequest {
    pub attributes: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

impl CommitRequest {
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Writes new document containers from scanned pages.
pub struct DocumentCommitter {
    backend: Arc<dyn RasterBackend>,
    doc_dir: PathBuf,
    processed_dir: Option<PathBuf>,
}

impl DocumentCommitter {
    pub fn new(backend: Arc<dyn RasterBackend>, doc_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            doc_dir: doc_dir.into(),
            processed_dir: None,
        }
    }

    pub fn from_config(config: &AppConfig, backend: Arc<dyn RasterBackend>) -> Self {
        Self {
            backend,
            doc_dir: config.doc_dir.clone(),
            processed_dir: config.processed_dir.clone(),
        }
    }

    /// Move committed source files into `dir` afterwards.
    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = Some(dir.into());
        self
    }

    /// Create a container holding `pages` in the given order and return its
    /// path. On failure no container file is left behind.
    #[instrument(skip_all, fields(pages = pages.len(), doc_dir = %self.doc_dir.display()))]
    pub fn commit(&self, pages: &[CommitPage], request: &CommitRequest) -> Result<PathBuf> {
        if pages.is_empty() {
            return Err(BulkscanError::InvalidImage("no pages to commit".into()));
        }
        std::fs::create_dir_all(&self.doc_dir)?;

        let base = document_basename(&request.attributes);
        let candidate = self.doc_dir.join(format!("{base}.{CONTAINER_EXTENSION}"));
        let target = first_free_path(&candidate)
            .ok_or_else(|| BulkscanError::ExportTargetExists(candidate.clone()))?;

        if let Err(err) = self.write_container(&target, pages, request) {
            if let Err(remove_err) = std::fs::remove_file(&target) {
                warn!(path = %target.display(), error = %remove_err, "cannot remove failed container");
            }
            return Err(err);
        }
        info!(path = %target.display(), "document committed");

        if let Some(processed_dir) = &self.processed_dir {
            move_sources(pages, processed_dir)?;
        }
        Ok(target)
    }

    fn write_container(
        &self,
        target: &Path,
        pages: &[CommitPage],
        request: &CommitRequest,
    ) -> Result<()> {
        let mut doc = DocumentContainer::open(target, Arc::clone(&self.backend))?;

        for page in pages {
            let data = read_image_file(&page.path)?;
            let meta = match &page.metadata {
                Some(meta) => meta.clone(),
                None => self.embedded_metadata(&data, &page.path),
            };

            let side = doc.add_original(
                &data,
                meta.side_uuid,
                meta.page_uuid,
                meta.side.unwrap_or_default(),
            )?;
            if let Some(name) = page.path.file_name() {
                doc.set_side_property(side, "orig_filename", &name.to_string_lossy())?;
            }
            if let Some(batch) = &meta.batch_uuid {
                doc.set_side_property(side, "batch_uuid", batch)?;
            }
            if let Some(created) = &meta.created_utc {
                doc.set_side_property(side, "created_utc", created)?;
            }
            if let Some(pageno) = meta.scanned_page_no {
                doc.set_side_property(side, "scanned_page_no", &pageno.to_string())?;
            }
        }

        let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        doc.set_document_property("created_utc", &created)?;
        doc.set_document_property("doc_uuid", &DocumentId::new().to_string())?;
        for (key, value) in request.attributes.iter().filter(|(_, v)| !v.is_empty()) {
            doc.set_document_property(key, value)?;
        }
        for tag in &request.tags {
            doc.add_tag(tag)?;
        }
        doc.close()
    }

    fn embedded_metadata(&self, data: &[u8], path: &Path) -> ScanMetadata {
        let comment = match self.backend.probe(data) {
            Ok(info) => info.comment,
            Err(_) => None,
        };
        match comment.as_deref().map(ScanMetadata::from_comment) {
            Some(Some(meta)) => meta,
            Some(None) => {
                warn!(path = %path.display(), "image comment is not scan metadata");
                ScanMetadata::default()
            }
            None => ScanMetadata::default(),
        }
    }
}

/// Filename stem built from the `docdate`, `peer` and `docname` attributes.
pub fn document_basename(attributes: &BTreeMap<String, String>) -> String {
    let parts: Vec<String> = FILENAME_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            let value = attributes.get(*key)?;
            let value: &str = if *key == "docdate" {
                value.rsplit(':').next().unwrap_or(value)
            } else {
                value
            };
            let cleaned = sanitize(value.trim());
            (!cleaned.is_empty()).then_some(cleaned)
        })
        .collect();

    if parts.is_empty() {
        DEFAULT_BASENAME.to_string()
    } else {
        parts.join("-")
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// `candidate` if free, else the first free `<stem>_NNN.<ext>` sibling.
fn first_free_path(candidate: &Path) -> Option<PathBuf> {
    if !candidate.exists() {
        return Some(candidate.to_path_buf());
    }
    let stem = candidate.file_stem()?.to_string_lossy().into_owned();
    let extension = candidate
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (1..=MAX_NAME_SUFFIX)
        .map(|i| candidate.with_file_name(format!("{stem}_{i:03}{extension}")))
        .find(|path| !path.exists())
}

fn move_sources(pages: &[CommitPage], processed_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(processed_dir)?;
    for page in pages {
        let Some(name) = page.path.file_name() else {
            continue;
        };
        let Some(target) = first_free_path(&processed_dir.join(name)) else {
            warn!(path = %page.path.display(), "no free name in processed directory");
            continue;
        };
        if std::fs::rename(&page.path, &target).is_err() {
            // Cross-device moves need a copy.
            std::fs::copy(&page.path, &target)?;
            std::fs::remove_file(&page.path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkscan_core::PixelFormat;
    use bulkscan_document::testing::FakeBackend;

    fn backend() -> Arc<dyn RasterBackend> {
        Arc::new(FakeBackend::new())
    }

    fn make_scans(dir: &Path, count: usize) -> Vec<CommitPage> {
        (1..=count)
            .map(|i| {
                let path = dir.join(format!("scan_{i:03}.png"));
                let data =
                    FakeBackend::encode(2480, 3508, 300.0, 300.0, "PNG", PixelFormat::Grayscale);
                std::fs::write(&path, data).unwrap();
                CommitPage::new(path)
            })
            .collect()
    }

    fn mud_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "mud"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn three_pages_with_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let pages = make_scans(dir.path(), 3);
        let request = CommitRequest::default()
            .attribute("docdate", "2019-05-01")
            .attribute("peer", "Acme")
            .tag("invoice");

        let committer = DocumentCommitter::new(backend(), dir.path().join("docs"));
        let path = committer.commit(&pages, &request).unwrap();
        assert_eq!(path, dir.path().join("docs/2019-05-01-Acme.mud"));

        let doc = DocumentContainer::open(&path, backend()).unwrap();
        assert_eq!(doc.page_count().unwrap(), 3);
        assert_eq!(doc.document_property("peer").unwrap().as_deref(), Some("Acme"));
        assert_eq!(doc.tags().unwrap(), vec!["invoice"]);
        let uuid = doc.document_property("doc_uuid").unwrap().unwrap();
        assert!(uuid.parse::<DocumentId>().is_ok());
        let created = doc.document_property("created_utc").unwrap().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(&created, "%Y-%m-%dT%H:%M:%SZ").is_ok());

        let names: Vec<String> = doc
            .all_page_properties()
            .unwrap()
            .into_iter()
            .map(|(_, props)| props["orig_filename"].clone())
            .collect();
        assert_eq!(names, vec!["scan_001.png", "scan_002.png", "scan_003.png"]);
    }

    #[test]
    fn embedded_comment_supplies_side_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let side = SideId::new();
        let sheet = SheetId::new();
        let comment = format!(
            r#"{{"batch_uuid": "b-1", "created_utc": "2019-05-01T10:00:00Z", "side": "back",
                "side_uuid": "{side}", "page_uuid": "{sheet}", "scanned_page_no": 7}}"#
        );
        let path = dir.path().join("scan.png");
        std::fs::write(
            &path,
            FakeBackend::encode_with_comment(
                100,
                100,
                300.0,
                300.0,
                "PNG",
                PixelFormat::Rgb,
                Some(&comment),
            ),
        )
        .unwrap();

        let committer = DocumentCommitter::new(backend(), dir.path());
        let doc_path = committer
            .commit(&[CommitPage::new(&path)], &CommitRequest::default())
            .unwrap();

        let doc = DocumentContainer::open(&doc_path, backend()).unwrap();
        assert_eq!(doc.page_order().unwrap(), vec![side]);
        let info = doc.side_images_info(side).unwrap();
        assert_eq!(info.original.sheet_id, sheet);
        assert_eq!(info.original.face, SheetSide::Back);
        let props = doc.page_properties(side).unwrap();
        assert_eq!(props["batch_uuid"], "b-1");
        assert_eq!(props["created_utc"], "2019-05-01T10:00:00Z");
        assert_eq!(props["scanned_page_no"], "7");
    }

    #[test]
    fn unparsable_comment_is_empty_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(
            &path,
            FakeBackend::encode_with_comment(
                100,
                100,
                300.0,
                300.0,
                "PNG",
                PixelFormat::Rgb,
                Some("scanned by hand"),
            ),
        )
        .unwrap();

        let doc_path = DocumentCommitter::new(backend(), dir.path())
            .commit(&[CommitPage::new(&path)], &CommitRequest::default())
            .unwrap();
        assert_eq!(doc_path, dir.path().join("document.mud"));

        let doc = DocumentContainer::open(&doc_path, backend()).unwrap();
        let (side, props) = doc.all_page_properties().unwrap().remove(0);
        assert_eq!(props.len(), 1);
        assert_eq!(doc.side_images_info(side).unwrap().original.face, SheetSide::Front);
    }

    #[test]
    fn explicit_metadata_overrides_comment() {
        let dir = tempfile::tempdir().unwrap();
        let side = SideId::new();
        let page = make_scans(dir.path(), 1).remove(0).with_metadata(ScanMetadata {
            side_uuid: Some(side),
            scanned_page_no: Some(2),
            ..ScanMetadata::default()
        });

        let doc_path = DocumentCommitter::new(backend(), dir.path().join("docs"))
            .commit(&[page], &CommitRequest::default())
            .unwrap();
        let doc = DocumentContainer::open(&doc_path, backend()).unwrap();
        assert_eq!(doc.page_properties(side).unwrap()["scanned_page_no"], "2");
    }

    #[test]
    fn taken_names_get_a_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        let request = CommitRequest::default().attribute("docname", "Tax return");
        let committer = DocumentCommitter::new(backend(), &docs);

        let pages = make_scans(dir.path(), 1);
        assert_eq!(
            committer.commit(&pages, &request).unwrap(),
            docs.join("Tax_return.mud")
        );
        assert_eq!(
            committer.commit(&pages, &request).unwrap(),
            docs.join("Tax_return_001.mud")
        );
    }

    #[test]
    fn failed_commit_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        let mut pages = make_scans(dir.path(), 1);
        pages.push(CommitPage::new(dir.path().join("vanished.png")));

        let result = DocumentCommitter::new(backend(), &docs).commit(&pages, &CommitRequest::default());
        assert!(matches!(result, Err(BulkscanError::NotFound(_))));
        assert!(mud_files(&docs).is_empty());
        assert!(pages[0].path.exists());
    }

    #[test]
    fn sources_move_to_processed_directory() {
        let dir = tempfile::tempdir().unwrap();
        let incoming = dir.path().join("incoming");
        let processed = dir.path().join("processed");
        std::fs::create_dir_all(&incoming).unwrap();
        std::fs::create_dir_all(&processed).unwrap();
        std::fs::write(processed.join("scan_001.png"), b"older").unwrap();

        let pages = make_scans(&incoming, 2);
        DocumentCommitter::new(backend(), dir.path().join("docs"))
            .with_processed_dir(&processed)
            .commit(&pages, &CommitRequest::default())
            .unwrap();

        assert!(pages.iter().all(|page| !page.path.exists()));
        assert!(processed.join("scan_001_001.png").is_file());
        assert!(processed.join("scan_002.png").is_file());
        assert_eq!(std::fs::read(processed.join("scan_001.png")).unwrap(), b"older");
    }

    #[test]
    fn basename_sanitizes_attributes() {
        let mut attributes = BTreeMap::new();
        assert_eq!(document_basename(&attributes), "document");

        attributes.insert("docdate".to_string(), "day:2020-02-29".to_string());
        attributes.insert("docname".to_string(), "Q1 report".to_string());
        attributes.insert("peer".to_string(), "Acme Corp/EU".to_string());
        assert_eq!(
            document_basename(&attributes),
            "2020-02-29-Acme_Corp_EU-Q1_report"
        );

        attributes.insert("peer".to_string(), String::new());
        assert_eq!(document_basename(&attributes), "2020-02-29-Q1_report");
    }

    #[test]
    fn empty_commit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = DocumentCommitter::new(backend(), dir.path()).commit(&[], &CommitRequest::default());
        assert!(matches!(result, Err(BulkscanError::InvalidImage(_))));
    }
}
