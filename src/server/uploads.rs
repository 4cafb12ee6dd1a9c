use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::info;

use crate::common::types::AttachmentUpload;
use crate::server::error::UploadError;

/// Boundary to the external attachment storage: turn raw bytes into a
/// durable reference the persisted message can carry. A failure here aborts
/// the whole send — no partial message is ever written.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, upload: AttachmentUpload) -> Result<String, UploadError>;
}

/// Disk-backed store used by the server binary. One file per attachment
/// under the upload dir, named by a fresh uuid; caller filenames only
/// contribute the extension.
pub struct DiskAttachments {
    dir: PathBuf,
}

impl DiskAttachments {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AttachmentStore for DiskAttachments {
    async fn store(&self, upload: AttachmentUpload) -> Result<String, UploadError> {
        let bytes = general_purpose::STANDARD.decode(upload.data.as_bytes())?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let ext = std::path::Path::new(&upload.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &bytes).await?;
        info!("[UPLOAD] Stored attachment {} ({} bytes)", name, bytes.len());
        Ok(path.to_string_lossy().into_owned())
    }
}
