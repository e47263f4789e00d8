use crate::error::SinkError;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Mutex;

/// Where a saved document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub file_name: String,
    pub location: String,
    pub bytes: usize,
}

/// Receives the finished document.
pub trait DocumentSink: Send + Sync {
    fn save<'a>(
        &'a self,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<SavedDocument, SinkError>>;
}

/// Writes documents into a directory, creating it when needed.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentSink for FileSink {
    fn save<'a>(
        &'a self,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<SavedDocument, SinkError>> {
        async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|source| SinkError::Io {
                    path: self.dir.clone(),
                    source,
                })?;
            let path = self.dir.join(file_name);
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|source| SinkError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "document saved");
            Ok(SavedDocument {
                file_name: file_name.to_string(),
                location: path.display().to_string(),
                bytes: bytes.len(),
            })
        }
        .boxed()
    }
}

/// Keeps saved documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        match self.saved.lock() {
            Ok(mut saved) => std::mem::take(&mut *saved),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DocumentSink for MemorySink {
    fn save<'a>(
        &'a self,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<SavedDocument, SinkError>> {
        let entry = (file_name.to_string(), bytes.to_vec());
        match self.saved.lock() {
            Ok(mut saved) => saved.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        futures::future::ready(Ok(SavedDocument {
            file_name: file_name.to_string(),
            location: format!("memory:{file_name}"),
            bytes: bytes.len(),
        }))
        .boxed()
    }
}
