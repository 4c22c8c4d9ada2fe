//! Content-addressed PDF blob store (§4.5).
//!
//! Blobs are stored on disk keyed by their sha256 digest; a JSON sidecar
//! next to each blob records reference count and registered identifiers
//! so the same PDF fetched under two different source identifiers is
//! stored once. Grounded on the acquisition cache's alias-indexing idiom
//! (`cache.rs`) but persisted to disk rather than kept purely in memory,
//! matching the spec's requirement that the PDF cache survive process
//! restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct PdfCacheConfig {
    pub base_dir: PathBuf,
    pub max_total_bytes: u64,
}

impl Default for PdfCacheConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp/agentic-kg/pdf-cache"),
            max_total_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum PdfCacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sidecar metadata corrupt for digest {0}")]
    CorruptSidecar(String),
    #[error("cache would exceed max_total_bytes ({0} + {1} > {2})")]
    WouldExceedCapacity(u64, u64, u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    digest: String,
    size_bytes: u64,
    ref_count: u32,
    identifiers: Vec<String>,
}

/// A content-addressed, identifier-indexed PDF blob store.
///
/// Kept mostly free of I/O under the lock: the `DashMap` tracks an
/// in-memory mirror of each blob's sidecar (size, refcount, identifiers)
/// so refcount bookkeeping never needs to hit disk synchronously; sidecar
/// writes happen after the in-memory state is updated.
pub struct PdfCache {
    config: PdfCacheConfig,
    sidecars: DashMap<String, Sidecar>,
    by_identifier: DashMap<String, String>,
    total_bytes: std::sync::atomic::AtomicU64,
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl PdfCache {
    pub fn new(config: PdfCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sidecars: DashMap::new(),
            by_identifier: DashMap::new(),
            total_bytes: std::sync::atomic::AtomicU64::new(0),
        })
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.config.base_dir.join(format!("{digest}.pdf"))
    }

    fn sidecar_path(&self, digest: &str) -> PathBuf {
        self.config.base_dir.join(format!("{digest}.json"))
    }

    /// Look up a previously stored blob by any identifier it was stored
    /// under (DOI, arXiv ID, source-specific ID, ...).
    pub fn get_by_identifier(&self, identifier: &str) -> Option<String> {
        self.by_identifier.get(identifier).map(|r| r.clone())
    }

    /// Store `bytes` under `identifier`, content-addressed by its sha256
    /// digest. If a blob with the same digest already exists (e.g. the
    /// same PDF reached via a different source), only the identifier
    /// index and refcount are updated — the bytes are not rewritten.
    /// Returns the digest the blob is stored under.
    pub async fn put(&self, identifier: &str, bytes: &[u8]) -> Result<String, PdfCacheError> {
        let digest = digest_hex(bytes);

        if let Some(mut sidecar) = self.sidecars.get_mut(&digest) {
            sidecar.ref_count += 1;
            if !sidecar.identifiers.iter().any(|i| i == identifier) {
                sidecar.identifiers.push(identifier.to_string());
            }
            self.by_identifier.insert(identifier.to_string(), digest.clone());
            self.write_sidecar(&digest, &sidecar).await?;
            return Ok(digest);
        }

        let size = bytes.len() as u64;
        let current_total = self.total_bytes.load(std::sync::atomic::Ordering::SeqCst);
        if current_total + size > self.config.max_total_bytes {
            return Err(PdfCacheError::WouldExceedCapacity(
                current_total,
                size,
                self.config.max_total_bytes,
            ));
        }

        tokio::fs::create_dir_all(&self.config.base_dir).await?;
        let path = self.blob_path(&digest);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        let sidecar = Sidecar {
            digest: digest.clone(),
            size_bytes: size,
            ref_count: 1,
            identifiers: vec![identifier.to_string()],
        };
        self.write_sidecar(&digest, &sidecar).await?;
        self.sidecars.insert(digest.clone(), sidecar);
        self.by_identifier.insert(identifier.to_string(), digest.clone());
        self.total_bytes.fetch_add(size, std::sync::atomic::Ordering::SeqCst);

        Ok(digest)
    }

    async fn write_sidecar(&self, digest: &str, sidecar: &Sidecar) -> Result<(), PdfCacheError> {
        let json = serde_json::to_vec_pretty(sidecar).map_err(|e| {
            PdfCacheError::CorruptSidecar(format!("failed to serialize {digest}: {e}"))
        })?;
        tokio::fs::write(self.sidecar_path(digest), json).await?;
        Ok(())
    }

    /// Read back the blob bytes for `digest`.
    pub async fn read(&self, digest: &str) -> Result<Vec<u8>, PdfCacheError> {
        Ok(tokio::fs::read(self.blob_path(digest)).await?)
    }

    /// Decrement the refcount for `digest`; when it reaches zero, the
    /// blob and sidecar are deleted from disk.
    pub async fn release(&self, digest: &str) -> Result<(), PdfCacheError> {
        let should_delete = {
            match self.sidecars.get_mut(digest) {
                Some(mut sidecar) => {
                    sidecar.ref_count = sidecar.ref_count.saturating_sub(1);
                    sidecar.ref_count == 0
                }
                None => return Ok(()),
            }
        };
        if should_delete {
            if let Some((_, sidecar)) = self.sidecars.remove(digest) {
                for id in &sidecar.identifiers {
                    self.by_identifier.remove(id);
                }
                self.total_bytes
                    .fetch_sub(sidecar.size_bytes, std::sync::atomic::Ordering::SeqCst);
                let _ = tokio::fs::remove_file(self.blob_path(digest)).await;
                let _ = tokio::fs::remove_file(self.sidecar_path(digest)).await;
            }
        }
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PdfCacheConfig {
        PdfCacheConfig {
            base_dir: tempfile::tempdir().unwrap().into_path(),
            max_total_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn put_and_read_round_trips_bytes() {
        let cache = PdfCache::new(test_config());
        let digest = cache.put("doi:10.1/x", b"hello pdf").await.unwrap();
        let bytes = cache.read(&digest).await.unwrap();
        assert_eq!(bytes, b"hello pdf");
        assert_eq!(cache.get_by_identifier("doi:10.1/x"), Some(digest));
    }

    #[tokio::test]
    async fn same_content_under_two_identifiers_dedupes_and_refcounts() {
        let cache = PdfCache::new(test_config());
        let d1 = cache.put("doi:10.1/x", b"same bytes").await.unwrap();
        let d2 = cache.put("arxiv:9999.0001", b"same bytes").await.unwrap();
        assert_eq!(d1, d2);
        assert_eq!(cache.total_bytes(), "same bytes".len() as u64);

        cache.release(&d1).await.unwrap();
        assert!(tokio::fs::metadata(cache.blob_path(&d1)).await.is_ok());
        cache.release(&d2).await.unwrap();
        assert!(tokio::fs::metadata(cache.blob_path(&d1)).await.is_err());
    }

    #[tokio::test]
    async fn put_rejects_when_over_capacity() {
        let cache = PdfCache::new(PdfCacheConfig {
            base_dir: tempfile::tempdir().unwrap().into_path(),
            max_total_bytes: 4,
        });
        let result = cache.put("doi:x", b"way too big").await;
        assert!(matches!(result, Err(PdfCacheError::WouldExceedCapacity(_, _, _))));
    }
}
