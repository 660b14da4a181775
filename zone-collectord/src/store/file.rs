use std::io::{self, Write};
use std::path::{Path, PathBuf};
use serde::Serialize;
use shared::protocol::{sd_file_name, SD_JSON_INDENT};
use shared::types::Document;
use crate::error::CollectorError;
use crate::store::hash;

/// One service-discovery file on disk.
#[derive(Debug, Clone)]
pub struct SdFile {
    path: PathBuf,
}

impl SdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File for `domain` inside the output directory
    pub fn for_domain(dir: &Path, domain: &str) -> Self {
        Self::new(dir.join(sd_file_name(domain)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous document. Missing, empty or unparseable files
    /// are recovered as an empty document.
    pub fn load(&self) -> Document {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No previous state at {}, starting empty", self.path.display());
                return Document::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}, starting empty: {}", self.path.display(), e);
                return Document::default();
            }
        };

        if contents.trim().is_empty() {
            tracing::warn!("{} is empty, starting empty", self.path.display());
            return Document::default();
        }

        match serde_json::from_str(&contents) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("{} is corrupt, starting empty: {}", self.path.display(), e);
                Document::default()
            }
        }
    }

    /// Write the document via a temporary file and rename.
    /// Returns false when the file already holds identical content.
    pub fn save(&self, doc: &Document) -> Result<bool, CollectorError> {
        let write_err = |source: io::Error| CollectorError::Write {
            path: self.path.clone(),
            source,
        };

        let rendered = render(doc).map_err(write_err)?;
        if hash::file_hash(&self.path).as_deref() == Some(hash::content_hash(&rendered).as_str()) {
            return Ok(false);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&rendered).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        // the scraper usually runs as another user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }

        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(true)
    }
}

/// Canonical bytes of a document: groups sorted, keys sorted,
/// four-space indentation, trailing newline.
pub fn render(doc: &Document) -> io::Result<Vec<u8>> {
    let mut normalized = doc.clone();
    normalized.normalize();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(SD_JSON_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    normalized.serialize(&mut serializer).map_err(io::Error::other)?;
    buf.push(b'\n');
    Ok(buf)
}
