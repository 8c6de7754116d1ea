// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document index — a catalog of document containers keyed by their document
// UUID.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bulkscan_core::error::{BulkscanError, Result};
use bulkscan_core::{DocumentId, Properties, SideId};
use bulkscan_document::RasterBackend;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::container::DocumentContainer;

/// File extension of document containers.
pub const CONTAINER_EXTENSION: &str = "mud";

/// What `add_directory` does when one container cannot be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Log the failure and continue with the next file.
    #[default]
    Ignore,
    /// Stop and return the failure.
    Raise,
}

/// Per-page summary stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub side_id: SideId,
    pub properties: Properties,
}

/// Everything the index knows about one container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub path: PathBuf,
    /// Modification time of the container file.
    pub modified: Option<DateTime<Utc>>,
    pub properties: Properties,
    /// Sorted.
    pub tags: Vec<String>,
    /// In page order.
    pub pages: Vec<PageSummary>,
}

/// In-memory catalog of document containers.
pub struct DocumentIndex {
    backend: Arc<dyn RasterBackend>,
    entries: BTreeMap<DocumentId, DocumentEntry>,
}

impl DocumentIndex {
    pub fn new(backend: Arc<dyn RasterBackend>) -> Self {
        Self {
            backend,
            entries: BTreeMap::new(),
        }
    }

    /// Index one container file.
    ///
    /// The file is opened read-only and never modified. Fails when it does not
    /// exist or holds no container, when the container has no valid
    /// `doc_uuid`, or when the uuid is already indexed. In the last case the
    /// existing entry is kept.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn add_document(&mut self, path: impl AsRef<Path>) -> Result<DocumentId> {
        let path = path.as_ref();
        let container = DocumentContainer::open_read_only(path, Arc::clone(&self.backend))?;
        let id: DocumentId = container
            .document_property("doc_uuid")?
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| BulkscanError::DocumentWithoutIdentity {
                path: path.to_path_buf(),
            })?;

        if self.entries.contains_key(&id) {
            return Err(BulkscanError::DuplicateDocument {
                uuid: id.to_string(),
                path: path.to_path_buf(),
            });
        }

        let pages = container
            .all_page_properties()?
            .into_iter()
            .map(|(side_id, properties)| PageSummary {
                side_id,
                properties,
            })
            .collect::<Vec<_>>();
        let entry = DocumentEntry {
            path: path.to_path_buf(),
            modified: std::fs::metadata(path)?
                .modified()
                .ok()
                .map(DateTime::<Utc>::from),
            properties: container.document_properties()?,
            tags: container.tags()?,
            pages,
        };
        container.close()?;

        debug!(doc = %id, pages = entry.pages.len(), "document indexed");
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Index every `*.mud` file directly inside `dir`, in filename order.
    ///
    /// Returns the number of documents added.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display(), on_error = ?on_error))]
    pub fn add_directory(&mut self, dir: impl AsRef<Path>, on_error: OnError) -> Result<usize> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_container = path
                .extension()
                .is_some_and(|ext| ext == CONTAINER_EXTENSION);
            if is_container && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut added = 0;
        for path in files {
            match self.add_document(&path) {
                Ok(_) => added += 1,
                Err(err) if on_error == OnError::Ignore => {
                    warn!(path = %path.display(), error = %err, "skipping document");
                }
                Err(err) => return Err(err),
            }
        }

        info!(added, total = self.entries.len(), "directory indexed");
        Ok(added)
    }

    /// Entry of one indexed document.
    pub fn get(&self, id: &DocumentId) -> Option<&DocumentEntry> {
        self.entries.get(id)
    }

    /// Entries in document id order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &DocumentEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkscan_core::{PixelFormat, SheetSide};
    use bulkscan_document::testing::FakeBackend;

    fn backend() -> Arc<dyn RasterBackend> {
        Arc::new(FakeBackend::new())
    }

    /// Write a closed container with one page, optionally carrying `doc_uuid`.
    fn make_container(path: &Path, doc_uuid: Option<&str>, tags: &[&str]) {
        let mut doc = DocumentContainer::open(path, backend()).unwrap();
        let page = FakeBackend::encode(100, 100, 300.0, 300.0, "PNG", PixelFormat::Rgb);
        let side = doc.add_original(&page, None, None, SheetSide::Front).unwrap();
        doc.set_side_property(side, "scanned_page_no", "1").unwrap();
        if let Some(uuid) = doc_uuid {
            doc.set_document_property("doc_uuid", uuid).unwrap();
        }
        doc.set_document_property("peer", "Acme").unwrap();
        for tag in tags {
            doc.add_tag(tag).unwrap();
        }
        doc.close().unwrap();
    }

    #[test]
    fn indexes_properties_tags_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mud");
        let uuid = DocumentId::new();
        make_container(&path, Some(&uuid.to_string()), &["tax", "invoice"]);

        let mut index = DocumentIndex::new(backend());
        assert_eq!(index.add_document(&path).unwrap(), uuid);

        let entry = index.get(&uuid).unwrap();
        assert_eq!(entry.path, path);
        assert!(entry.modified.is_some());
        assert_eq!(entry.tags, vec!["invoice", "tax"]);
        assert_eq!(entry.properties["peer"], "Acme");
        assert_eq!(entry.pages.len(), 1);
        assert_eq!(entry.pages[0].properties["scanned_page_no"], "1");
    }

    #[test]
    fn container_without_uuid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mud");
        let malformed = dir.path().join("malformed.mud");
        make_container(&missing, None, &[]);
        make_container(&malformed, Some("not-a-uuid"), &[]);

        let mut index = DocumentIndex::new(backend());
        for path in [missing, malformed] {
            assert!(matches!(
                index.add_document(&path),
                Err(BulkscanError::DocumentWithoutIdentity { .. })
            ));
        }
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_uuid_keeps_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mud");
        let second = dir.path().join("second.mud");
        let uuid = DocumentId::new().to_string();
        make_container(&first, Some(&uuid), &[]);
        make_container(&second, Some(&uuid), &[]);

        let mut index = DocumentIndex::new(backend());
        let id = index.add_document(&first).unwrap();
        match index.add_document(&second) {
            Err(BulkscanError::DuplicateDocument { uuid: dup, path }) => {
                assert_eq!(dup, uuid);
                assert_eq!(path, second);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&id).unwrap().path, first);
    }

    #[test]
    fn missing_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghost.mud");
        let mut index = DocumentIndex::new(backend());
        assert!(matches!(
            index.add_document(&path),
            Err(BulkscanError::NotFound(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn indexing_leaves_foreign_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mud");
        std::fs::write(&empty, b"").unwrap();
        let good = dir.path().join("good.mud");
        make_container(&good, Some(&DocumentId::new().to_string()), &[]);
        let before = std::fs::read(&good).unwrap();

        let mut index = DocumentIndex::new(backend());
        assert_eq!(index.add_directory(dir.path(), OnError::Ignore).unwrap(), 1);
        assert_eq!(std::fs::metadata(&empty).unwrap().len(), 0);
        assert_eq!(std::fs::read(&good).unwrap(), before);
        assert!(matches!(
            index.add_document(&empty),
            Err(BulkscanError::Database(_))
        ));
    }

    #[test]
    fn directory_error_policies() {
        let dir = tempfile::tempdir().unwrap();
        make_container(&dir.path().join("a.mud"), Some(&DocumentId::new().to_string()), &[]);
        make_container(&dir.path().join("b.mud"), None, &[]);
        make_container(&dir.path().join("c.mud"), Some(&DocumentId::new().to_string()), &[]);
        std::fs::write(dir.path().join("notes.txt"), "not a container").unwrap();

        let mut lenient = DocumentIndex::new(backend());
        assert_eq!(lenient.add_directory(dir.path(), OnError::Ignore).unwrap(), 2);
        assert_eq!(lenient.len(), 2);

        let mut strict = DocumentIndex::new(backend());
        assert!(matches!(
            strict.add_directory(dir.path(), OnError::Raise),
            Err(BulkscanError::DocumentWithoutIdentity { .. })
        ));
        assert_eq!(strict.len(), 1);
        let (_, entry) = strict.iter().next().unwrap();
        assert_eq!(entry.path, dir.path().join("a.mud"));
    }
}
