use anyhow::{anyhow, Result};
use async_std::future;
use futures::StreamExt;
use hermitcrab::{config, DirectoryStore, ProjectRegistry, SurfFetcher};
use log::debug;
use rusty_curator_core::backend::RemovalPrompt;
use rusty_curator_core::manifest::Settings;
use rusty_curator_core::protocol::{AssetKey, CuratorEvent, EventReceiver, OperationKind};
use rusty_curator_core::CuratorError;
use rusty_curator_stem::{assemble, AssetInfo, Backends, Catalog, InstallOrchestrator};
use std::sync::Arc;
use std::time::Duration;

pub use rusty_curator_core as core;
pub use rusty_curator_stem as stem;

/// One catalog, its backends and its operation queue behind a single handle.
pub struct Curator {
    catalog: Arc<Catalog>,
    orchestrator: Arc<InstallOrchestrator>,
    self_ticking: bool,
}

impl Curator {
    pub fn new(backends: Backends, settings: Settings) -> Self {
        let self_ticking = settings.tick_interval().is_some();
        let (catalog, orchestrator) = assemble(backends, settings);
        Self {
            catalog,
            orchestrator,
            self_ticking,
        }
    }

    /// Builds the HTTP, project-registry and directory-store backends for
    /// `settings.project_dir`.
    pub fn from_settings(settings: Settings, prompt: Arc<dyn RemovalPrompt>) -> Result<Self> {
        let backends = Backends {
            fetcher: Arc::new(SurfFetcher::new()),
            registry: Arc::new(ProjectRegistry::new(&settings.project_dir)),
            store: Arc::new(DirectoryStore::new(&settings.project_dir)?),
            prompt,
        };
        Ok(Self::new(backends, settings))
    }

    /// Same as [`Curator::from_settings`] with settings from the config dir.
    pub fn open(prompt: Arc<dyn RemovalPrompt>) -> Result<Self> {
        Self::from_settings(config::load_settings()?, prompt)
    }

    pub fn settings(&self) -> &Settings {
        self.catalog.context().settings()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn orchestrator(&self) -> &Arc<InstallOrchestrator> {
        &self.orchestrator
    }

    pub fn reload(&self) {
        self.catalog.force_reload();
    }

    pub async fn load_now(&self) {
        self.catalog.load_now().await;
    }

    pub fn is_loading(&self) -> bool {
        self.catalog.is_loading()
    }

    pub fn curated_assets(&self) -> Vec<AssetInfo> {
        self.catalog.curated_assets()
    }

    pub fn other_assets(&self) -> Vec<AssetInfo> {
        self.catalog.other_assets()
    }

    /// Finds an asset by display name (case-insensitive) or identifier.
    pub fn find(&self, name: &str) -> Option<AssetInfo> {
        self.curated_assets()
            .into_iter()
            .chain(self.other_assets())
            .find(|a| {
                a.display_name.eq_ignore_ascii_case(name)
                    || (!a.identifier.is_empty() && a.identifier == name)
                    || (!a.reference_id.is_empty() && a.reference_id == name)
            })
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.catalog.context().subscribe()
    }

    pub fn install(&self, asset: &AssetInfo) -> Result<()> {
        self.orchestrator.install(asset)
    }

    pub fn remove(&self, asset: &AssetInfo) -> Result<()> {
        self.orchestrator.remove(asset)
    }

    /// Advances pending operations once. Only needed when automatic ticking
    /// is disabled.
    pub fn poll(&self) -> usize {
        self.orchestrator.poll_pending_operations()
    }

    /// Installs `name` and waits for the operation to settle, returning the
    /// final event.
    pub async fn install_and_wait(&self, name: &str) -> Result<CuratorEvent> {
        self.run_and_wait(name, OperationKind::Install).await
    }

    /// Removes `name` and waits for the operation to settle, returning the
    /// final event.
    pub async fn remove_and_wait(&self, name: &str) -> Result<CuratorEvent> {
        self.run_and_wait(name, OperationKind::Uninstall).await
    }

    async fn run_and_wait(&self, name: &str, kind: OperationKind) -> Result<CuratorEvent> {
        let asset = self
            .find(name)
            .ok_or_else(|| CuratorError::UnknownAsset(name.to_string()))?;
        let key = asset.key();
        let mut events = self.subscribe();
        match kind {
            OperationKind::Install => self.install(&asset)?,
            OperationKind::Uninstall => self.remove(&asset)?,
        }

        loop {
            if !self.self_ticking {
                self.poll();
            }
            match future::timeout(Duration::from_millis(50), events.next()).await {
                Ok(Some(event)) if settles(&event, &key) => return Ok(event),
                Ok(Some(event)) => debug!("Skipping {:?}", event),
                Ok(None) => return Err(anyhow!("event channel closed")),
                Err(_) => {}
            }
        }
    }
}

fn settles(event: &CuratorEvent, wanted: &AssetKey) -> bool {
    match event {
        CuratorEvent::OperationFinished { key, .. }
        | CuratorEvent::OperationFailed { key, .. }
        | CuratorEvent::OperationCancelled { key, .. } => key == wanted,
        _ => false,
    }
}
