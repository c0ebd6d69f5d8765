use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::limits::MAX_RECEIPT_REF_LEN;

/// Storage for uploaded receipt images.
///
/// The front end writes the file and hands the core a reference, never
/// bytes. The core's only obligation is the failure path: a payment that
/// does not commit must not leave its receipt behind.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn exists(&self, receipt: &str) -> bool;

    /// Remove a stored receipt. Removing one that is already gone is Ok —
    /// discard races with itself when a client retries.
    async fn discard(&self, receipt: &str) -> io::Result<()>;
}

/// Receipt files on the local filesystem, flat under one directory.
pub struct FsReceiptStore {
    root: PathBuf,
}

impl FsReceiptStore {
    pub fn new(root: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a receipt reference to its path. References are plain file
    /// names; separators and dot-dot segments are rejected so a reference
    /// can never escape the store directory.
    pub fn path_for(&self, receipt: &str) -> io::Result<PathBuf> {
        if receipt.is_empty() || receipt.len() > MAX_RECEIPT_REF_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receipt reference length out of range",
            ));
        }
        let valid = receipt
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid || receipt.contains("..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receipt reference contains invalid characters",
            ));
        }
        Ok(self.root.join(receipt))
    }
}

#[async_trait]
impl ReceiptStore for FsReceiptStore {
    async fn exists(&self, receipt: &str) -> bool {
        match self.path_for(receipt) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn discard(&self, receipt: &str) -> io::Result<()> {
        let path = self.path_for(receipt)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
