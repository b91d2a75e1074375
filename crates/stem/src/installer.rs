use crate::asset::{AssetInfo, Route};
use crate::releases::{self, ArtifactFilter};
use anyhow::{bail, Result};
use log::{error, info, warn};
use rusty_curator_core::backend::{ArchiveStore, RegistryBackend, RemoteFetcher, RemovalPrompt};
use rusty_curator_core::manifest::Settings;
use rusty_curator_core::protocol::{InstalledPackage, OperationHandle, SharedHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Installed registry packages keyed by identifier.
pub type InstalledPackages = HashMap<String, InstalledPackage>;

pub fn index_installed(packages: Vec<InstalledPackage>) -> InstalledPackages {
    packages
        .into_iter()
        .map(|p| (p.identifier.clone(), p))
        .collect()
}

/// The external collaborators the engine runs against.
#[derive(Clone)]
pub struct Backends {
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub registry: Arc<dyn RegistryBackend>,
    pub store: Arc<dyn ArchiveStore>,
    pub prompt: Arc<dyn RemovalPrompt>,
}

/// Locally derived install state of one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallProbe {
    pub installed: bool,
    pub has_update: bool,
    pub backend_path: Option<String>,
}

/// What a dispatched operation turned into.
pub enum Dispatch {
    /// Still running; poll the handle.
    Pending(Box<dyn OperationHandle>),
    /// Finished synchronously, leaving the asset in this install state.
    Done { installed: bool },
    /// The user declined.
    Cancelled,
}

pub trait Installer: Send + Sync {
    fn install(&self, asset: &AssetInfo) -> Result<Dispatch>;

    fn remove(&self, asset: &AssetInfo) -> Result<Dispatch>;

    fn query_state(&self, asset: &AssetInfo, installed: &InstalledPackages) -> InstallProbe;
}

pub struct RegistryInstaller {
    registry: Arc<dyn RegistryBackend>,
    store: Arc<dyn ArchiveStore>,
    embedded_prefix: String,
}

impl RegistryInstaller {
    fn target(asset: &AssetInfo) -> String {
        let repo = asset.source_repo.trim_end_matches('/');
        if repo.ends_with(".git") {
            repo.to_string()
        } else {
            format!("{}.git", repo)
        }
    }
}

impl Installer for RegistryInstaller {
    fn install(&self, asset: &AssetInfo) -> Result<Dispatch> {
        let target = Self::target(asset);
        info!("[Registry] Adding {} from {}", asset.identifier, target);
        Ok(Dispatch::Pending(self.registry.add(&asset.identifier, &target)))
    }

    fn remove(&self, asset: &AssetInfo) -> Result<Dispatch> {
        info!("[Registry] Removing {}", asset.identifier);
        let handle = self.registry.remove(&asset.identifier);

        match asset.backend_path() {
            // The registry ignores removals of embedded packages and never
            // completes them, so the files go directly.
            Some(path) if path.starts_with(&self.embedded_prefix) => {
                drop(handle);
                warn!(
                    "[Registry] {} is embedded, deleting {} manually",
                    asset.identifier, path
                );
                self.store.delete_path(Path::new(path))?;
                Ok(Dispatch::Done { installed: false })
            }
            _ => Ok(Dispatch::Pending(handle)),
        }
    }

    fn query_state(&self, asset: &AssetInfo, installed: &InstalledPackages) -> InstallProbe {
        match installed.get(&asset.identifier) {
            Some(package) => InstallProbe {
                installed: true,
                has_update: package.has_update(),
                backend_path: Some(package.backend_path.clone()),
            },
            None => InstallProbe::default(),
        }
    }
}

pub struct ArchiveInstaller {
    fetcher: Arc<dyn RemoteFetcher>,
    store: Arc<dyn ArchiveStore>,
    prompt: Arc<dyn RemovalPrompt>,
    settings: Arc<Settings>,
    /// Numbers download attempts so a retry never shares a scratch file with
    /// an abandoned worker.
    attempts: AtomicU64,
}

impl Installer for ArchiveInstaller {
    fn install(&self, asset: &AssetInfo) -> Result<Dispatch> {
        let filter = ArtifactFilter::new(
            &self.settings.archive_extension,
            asset.archive_name_pattern.as_deref(),
        )?;

        let handle = SharedHandle::new();
        let worker = handle.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let scratch = self
            .settings
            .scratch_dir
            .join(self.attempts.fetch_add(1, Ordering::SeqCst).to_string());
        let api_base = self.settings.release_api_base.clone();
        let asset = asset.clone();

        async_std::task::spawn(async move {
            let job = ReleaseJob {
                fetcher: &*fetcher,
                store: &*store,
                api_base: &api_base,
                scratch: &scratch,
                filter: &filter,
                handle: &worker,
            };
            match job.run(&asset).await {
                Ok(path) => {
                    info!("[Archive] Installed {} into {:?}", asset.display_name, path);
                    worker.succeed();
                }
                Err(e) => {
                    error!("[Archive] Installing {} failed: {:#}", asset.display_name, e);
                    worker.fail(format!("{:#}", e));
                }
            }
        });

        Ok(Dispatch::Pending(Box::new(handle)))
    }

    fn remove(&self, asset: &AssetInfo) -> Result<Dispatch> {
        let reference = asset.store_key();
        let path = self.store.locate(reference);
        if !self.prompt.confirm(&asset.display_name, path.as_deref()) {
            info!("[Archive] Removal of {} declined", asset.display_name);
            return Ok(Dispatch::Cancelled);
        }

        info!("[Archive] Deleting {} ({:?})", asset.display_name, path);
        self.store.delete(reference)?;
        Ok(Dispatch::Done { installed: false })
    }

    fn query_state(&self, asset: &AssetInfo, _installed: &InstalledPackages) -> InstallProbe {
        InstallProbe {
            installed: self.store.exists(asset.store_key()),
            ..InstallProbe::default()
        }
    }
}

/// One archive install running on a worker task. Every step first checks
/// whether the orchestrator abandoned the operation.
struct ReleaseJob<'a> {
    fetcher: &'a dyn RemoteFetcher,
    store: &'a dyn ArchiveStore,
    api_base: &'a str,
    scratch: &'a Path,
    filter: &'a ArtifactFilter,
    handle: &'a SharedHandle,
}

impl ReleaseJob<'_> {
    fn ensure_wanted(&self, asset: &AssetInfo) -> Result<()> {
        if self.handle.is_abandoned() {
            bail!("install of {} was abandoned", asset.display_name);
        }
        Ok(())
    }

    async fn run(&self, asset: &AssetInfo) -> Result<PathBuf> {
        let artifact = releases::resolve_latest_artifact(
            self.fetcher,
            self.api_base,
            &asset.source_repo,
            self.filter,
        )
        .await?;

        self.ensure_wanted(asset)?;
        info!("[Archive] Downloading & installing {}", artifact.download_url);
        let target = self.scratch.join(artifact.file_name());
        let downloaded = self
            .fetcher
            .fetch_bytes(&artifact.download_url, &target)
            .await?;

        self.ensure_wanted(asset)?;
        let imported = self.store.import(asset.store_key(), &downloaded)?;

        if self.handle.is_abandoned() {
            warn!(
                "[Archive] {} was abandoned during import, removing it again",
                asset.display_name
            );
            self.store.delete(asset.store_key())?;
            bail!("install of {} was abandoned", asset.display_name);
        }
        Ok(imported)
    }
}

/// A registry package shipped as an archive: installed by unpacking,
/// tracked and removed through the registry once it reports the package.
pub struct UnpackedPackageInstaller {
    registry: Arc<RegistryInstaller>,
    archive: Arc<ArchiveInstaller>,
}

impl Installer for UnpackedPackageInstaller {
    fn install(&self, asset: &AssetInfo) -> Result<Dispatch> {
        self.archive.install(asset)
    }

    fn remove(&self, asset: &AssetInfo) -> Result<Dispatch> {
        if asset.backend_path().is_some() {
            self.registry.remove(asset)
        } else {
            self.archive.remove(asset)
        }
    }

    fn query_state(&self, asset: &AssetInfo, installed: &InstalledPackages) -> InstallProbe {
        let probe = self.registry.query_state(asset, installed);
        if probe.installed {
            probe
        } else {
            self.archive.query_state(asset, installed)
        }
    }
}

/// One installer per route, shared by the synchronizer and the orchestrator.
pub struct Installers {
    registry: Arc<RegistryInstaller>,
    archive: Arc<ArchiveInstaller>,
    unpacked: UnpackedPackageInstaller,
}

impl Installers {
    pub fn new(backends: &Backends, settings: Arc<Settings>) -> Self {
        let registry = Arc::new(RegistryInstaller {
            registry: Arc::clone(&backends.registry),
            store: Arc::clone(&backends.store),
            embedded_prefix: settings.embedded_path_prefix.clone(),
        });
        let archive = Arc::new(ArchiveInstaller {
            fetcher: Arc::clone(&backends.fetcher),
            store: Arc::clone(&backends.store),
            prompt: Arc::clone(&backends.prompt),
            settings,
            attempts: AtomicU64::new(0),
        });
        let unpacked = UnpackedPackageInstaller {
            registry: Arc::clone(&registry),
            archive: Arc::clone(&archive),
        };
        Self {
            registry,
            archive,
            unpacked,
        }
    }

    pub fn select(&self, asset: &AssetInfo) -> &dyn Installer {
        match asset.route() {
            Route::Registry => &*self.registry,
            Route::Archive => &*self.archive,
            Route::UnpackedPackage => &self.unpacked,
        }
    }
}
