use crate::protocol::{InstalledPackage, OperationHandle};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Network transport. Completions resume on whichever task awaited them.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Download `url` into `destination`, returning the written path.
    async fn fetch_bytes(&self, url: &str, destination: &Path) -> Result<PathBuf>;
}

/// The package registry that can list, add and remove packages by identifier.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn list_installed(&self) -> Result<Vec<InstalledPackage>>;

    /// Start adding `identifier` from `target` (a source-control URL).
    fn add(&self, identifier: &str, target: &str) -> Box<dyn OperationHandle>;

    fn remove(&self, identifier: &str) -> Box<dyn OperationHandle>;
}

/// File-based install mechanism for archive assets.
pub trait ArchiveStore: Send + Sync {
    fn exists(&self, reference_id: &str) -> bool;

    /// Local path of an installed asset, if any.
    fn locate(&self, reference_id: &str) -> Option<PathBuf>;

    fn import(&self, reference_id: &str, archive: &Path) -> Result<PathBuf>;

    fn delete(&self, reference_id: &str) -> Result<()>;

    /// Delete files at a backend-reported path relative to the project root.
    fn delete_path(&self, path: &Path) -> Result<()>;
}

/// Asks the user before files are deleted.
pub trait RemovalPrompt: Send + Sync {
    fn confirm(&self, asset_name: &str, path: Option<&Path>) -> bool;
}

/// Confirms every removal; for unattended hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl RemovalPrompt for AlwaysConfirm {
    fn confirm(&self, _asset_name: &str, _path: Option<&Path>) -> bool {
        true
    }
}
