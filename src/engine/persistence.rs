use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use crate::{Document, Error, Result};
use log::debug;
use tempfile::NamedTempFile;

/// Handles disk I/O for embedded collections.
///
/// Every collection lives in `<data_dir>/<database>/<collection>.json` as one pretty-printed
/// JSON array. Files are only ever replaced wholesale using an atomic "write-then-rename"
/// strategy, so a reader sees either the previous or the next complete collection.
///
/// # Migrating older data directories
///
/// Earlier layouts kept every collection directly under the data directory as
/// `data/<collection>.json`. Those files are not read any more; move each one into the
/// directory of the database it belongs to (`data/<database>/<collection>.json`).
#[derive(Debug, Clone)]
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// Creates a handler rooted at `dir`. Nothing is touched on disk until the first write.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { data_dir: dir.as_ref().to_path_buf() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of a collection's file. Names that could escape the data directory are rejected.
    pub fn collection_path(&self, db: &str, collection: &str) -> Result<PathBuf> {
        validate_name("database", db)?;
        validate_name("collection", collection)?;
        Ok(self.data_dir.join(db).join(format!("{}.json", collection)))
    }

    /// Reads the full collection. A collection without a file yet is empty.
    pub fn load_collection(&self, db: &str, collection: &str) -> Result<Vec<Document>> {
        let path = self.collection_path(db, collection)?;

        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let docs: Vec<Document> = serde_json::from_slice(&content).map_err(|e| Error::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!("Loaded {} documents from {:?}", docs.len(), path);
        Ok(docs)
    }

    /// Writes the full collection atomically.
    ///
    /// The data goes to a temporary file in the same directory, is flushed to disk and then
    /// renamed over the destination, so a crash mid-write leaves the previous file intact.
    pub fn save_collection(&self, db: &str, collection: &str, docs: &[Document]) -> Result<()> {
        let file_path = self.collection_path(db, collection)?;
        let dir = file_path
            .parent()
            .ok_or_else(|| Error::Internal(format!("no parent directory for {:?}", file_path)))?;
        fs::create_dir_all(dir)?;

        let bytes = serde_json::to_vec_pretty(docs)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&file_path).map_err(|e| Error::Io(e.error))?;

        debug!("Wrote {} documents to {:?}", docs.len(), file_path);
        Ok(())
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Validation(format!("invalid {} name {:?}", kind, name)));
    }
    if name.contains(|c: char| c == '/' || c == '\\' || c == '\0') {
        return Err(Error::Validation(format!(
            "{} name {:?} may not contain path separators",
            kind, name
        )));
    }
    Ok(())
}
