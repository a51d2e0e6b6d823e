// ABOUTME: Durable key-value persistence of reconciliation state.
// ABOUTME: One JSON document keyed by tenant id, written atomically via a
// ABOUTME: temp-file rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::TenantStore;

type Document = BTreeMap<String, TenantStore>;

/// Whole-document JSON persistence for tenant reconciliation state.
///
/// `load` of a missing file or an unknown tenant yields the empty store
/// (first run). `save` is read-modify-write of the full document, serialized
/// by an internal mutex and flushed with a write-temp-then-rename so a crash
/// never leaves a partial document behind.
pub struct RecordStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl RecordStore {
    /// Create a store backed by the JSON document at `path`.
    ///
    /// The file (and its parent directory) is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load one tenant's state, empty if the tenant has never been saved.
    pub async fn load(&self, tenant: &str) -> Result<TenantStore, StoreError> {
        let _guard = self.io.lock().await;
        let document = self.read_document().await?;
        Ok(document.get(tenant).cloned().unwrap_or_default())
    }

    /// Save one tenant's state, leaving all other tenants untouched.
    pub async fn save(&self, tenant: &str, store: &TenantStore) -> Result<(), StoreError> {
        let _guard = self.io.lock().await;
        let mut document = self.read_document().await?;
        document.insert(tenant.to_string(), store.clone());
        self.write_document(&document).await
    }

    async fn read_document(&self) -> Result<Document, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn write_document(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
