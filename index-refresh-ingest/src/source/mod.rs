//! Source enumeration and download.
//!
//! Files come from an object storage prefix, an explicit list of local
//! paths, a local folder, or any combination. Only tabular and structured
//! files are kept.

mod s3;

pub use s3::S3ObjectStore;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use index_refresh_shared::{SourceFile, SourceFormat, SourceLocation};
use tracing::{debug, info, instrument, warn};

use crate::errors::IngestError;

/// One object returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// Read access to an object storage service.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, following pagination.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, IngestError>;

    /// Download the full contents of one object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError>;
}

/// Where to look for source files.
#[derive(Debug, Clone, Default)]
pub struct SourceSpec {
    pub bucket: Option<String>,
    pub prefix: String,
    pub local_files: Vec<PathBuf>,
    /// Scanned non-recursively.
    pub local_folder: Option<PathBuf>,
}

impl SourceSpec {
    pub fn is_empty(&self) -> bool {
        self.bucket.is_none() && self.local_files.is_empty() && self.local_folder.is_none()
    }
}

/// Enumerates and loads source files.
pub struct SourceCatalog {
    store: Option<Arc<dyn ObjectStore>>,
}

impl SourceCatalog {
    /// A catalog able to read object storage and local files.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A catalog restricted to local files.
    pub fn local_only() -> Self {
        Self { store: None }
    }

    /// Enumerate every source file described by `spec`.
    ///
    /// Object storage entries come first in listing order, then explicit
    /// local files in the given order, then the folder contents sorted by
    /// name. A file reachable through several inputs is returned once.
    #[instrument(skip(self))]
    pub async fn enumerate(&self, spec: &SourceSpec) -> Result<Vec<SourceFile>, IngestError> {
        let mut files = Vec::new();

        if let Some(bucket) = &spec.bucket {
            let store = self.store()?;
            for entry in store.list(bucket, &spec.prefix).await? {
                match SourceFormat::from_path(&entry.key) {
                    Some(format) => {
                        files.push(SourceFile::object(bucket, entry.key, format, entry.size))
                    }
                    None => debug!(key = %entry.key, "Skipping unsupported object"),
                }
            }
        }

        for path in &spec.local_files {
            match local_file(path).await? {
                Some(file) => files.push(file),
                None => warn!(path = %path.display(), "Skipping unsupported local file"),
            }
        }

        if let Some(folder) = &spec.local_folder {
            files.extend(scan_folder(folder).await?);
        }

        let mut seen = HashSet::new();
        files.retain(|f| seen.insert(f.identity()));

        info!(files = files.len(), "Enumerated source files");
        Ok(files)
    }

    /// Read the full contents of `file`.
    pub async fn load(&self, file: &SourceFile) -> Result<Vec<u8>, IngestError> {
        match &file.location {
            SourceLocation::ObjectStorage { bucket, key } => self.store()?.get(bucket, key).await,
            SourceLocation::Local { path } => tokio::fs::read(path).await.map_err(|e| {
                IngestError::storage(format!("cannot read {}: {}", path.display(), e))
            }),
        }
    }

    fn store(&self) -> Result<&Arc<dyn ObjectStore>, IngestError> {
        self.store
            .as_ref()
            .ok_or_else(|| IngestError::storage("object storage is not configured"))
    }
}

async fn local_file(path: &Path) -> Result<Option<SourceFile>, IngestError> {
    let Some(format) = SourceFormat::from_path(&path.to_string_lossy()) else {
        return Ok(None);
    };
    let absolute = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| IngestError::storage(format!("cannot resolve {}: {}", path.display(), e)))?;
    let metadata = tokio::fs::metadata(&absolute)
        .await
        .map_err(|e| IngestError::storage(format!("cannot stat {}: {}", absolute.display(), e)))?;
    if !metadata.is_file() {
        return Err(IngestError::storage(format!(
            "{} is not a file",
            absolute.display()
        )));
    }
    Ok(Some(SourceFile::local(absolute, format, metadata.len())))
}

async fn scan_folder(folder: &Path) -> Result<Vec<SourceFile>, IngestError> {
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .map_err(|e| IngestError::storage(format!("cannot open {}: {}", folder.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IngestError::storage(format!("cannot scan {}: {}", folder.display(), e)))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        if let Some(file) = local_file(&path).await? {
            files.push(file);
        }
    }
    debug!(folder = %folder.display(), files = files.len(), "Scanned folder");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticStore {
        objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ObjectStore for StaticStore {
        async fn list(&self, _bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, IngestError> {
            let mut entries: Vec<_> = self
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| ObjectEntry {
                    key: k.clone(),
                    size: v.len() as u64,
                })
                .collect();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        }

        async fn get(&self, _bucket: &str, key: &str) -> Result<Vec<u8>, IngestError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| IngestError::storage(format!("no such key {}", key)))
        }
    }

    #[tokio::test]
    async fn test_object_storage_filtered_by_format() {
        let objects = [
            ("exports/a.csv", "id\n1\n"),
            ("exports/b.JSON", "[]"),
            ("exports/readme.txt", "hello"),
            ("other/c.csv", "id\n2\n"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect();
        let catalog = SourceCatalog::new(Arc::new(StaticStore { objects }));

        let spec = SourceSpec {
            bucket: Some("data".to_string()),
            prefix: "exports/".to_string(),
            ..Default::default()
        };
        let files = catalog.enumerate(&spec).await.unwrap();

        let ids: Vec<_> = files.iter().map(|f| f.identity()).collect();
        assert_eq!(ids, vec!["data/exports/a.csv", "data/exports/b.JSON"]);
        assert_eq!(files[1].format, SourceFormat::Structured);
        assert_eq!(catalog.load(&files[0]).await.unwrap(), b"id\n1\n");
    }

    #[tokio::test]
    async fn test_local_folder_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "id\n1\n").unwrap();
        std::fs::write(dir.path().join("a.jsonl"), "{\"id\":1}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let spec = SourceSpec {
            local_files: vec![dir.path().join("b.csv")],
            local_folder: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let files = SourceCatalog::local_only().enumerate(&spec).await.unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|f| match &f.location {
                SourceLocation::Local { path } => {
                    path.file_name().unwrap().to_string_lossy().to_string()
                }
                _ => unreachable!(),
            })
            .collect();
        // explicit file first, folder duplicates dropped
        assert_eq!(names, vec!["b.csv", "a.jsonl"]);
        assert!(files.iter().all(|f| match &f.location {
            SourceLocation::Local { path } => path.is_absolute(),
            _ => false,
        }));
    }

    #[tokio::test]
    async fn test_bucket_without_store_is_an_error() {
        let spec = SourceSpec {
            bucket: Some("data".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            SourceCatalog::local_only().enumerate(&spec).await,
            Err(IngestError::Source(_))
        ));
    }
}
