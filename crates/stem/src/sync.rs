use crate::asset::AssetInfo;
use crate::context::CatalogSnapshot;
use crate::installer::{index_installed, Backends, InstalledPackages, Installers};
use anyhow::{Context, Result};
use log::{debug, info};
use rusty_curator_core::backend::{RegistryBackend, RemoteFetcher};
use rusty_curator_core::manifest::{CatalogDocument, CategorySet, RawAsset, Settings};
use rusty_curator_core::CuratorError;
use std::sync::Arc;

pub fn parse_catalog(text: &str) -> Result<CatalogDocument, CuratorError> {
    serde_json::from_str(text).map_err(|e| CuratorError::Catalog(e.to_string()))
}

/// Merges the remote catalog with locally observed install state.
pub struct CatalogSynchronizer {
    fetcher: Arc<dyn RemoteFetcher>,
    registry: Arc<dyn RegistryBackend>,
    installers: Arc<Installers>,
    settings: Arc<Settings>,
}

impl CatalogSynchronizer {
    pub fn new(backends: &Backends, installers: Arc<Installers>, settings: Arc<Settings>) -> Self {
        Self {
            fetcher: Arc::clone(&backends.fetcher),
            registry: Arc::clone(&backends.registry),
            installers,
            settings,
        }
    }

    /// One synchronization pass. The registry listing and the catalog
    /// download run concurrently; merging starts once both are in.
    pub async fn synchronize(&self) -> Result<CatalogSnapshot> {
        let url = &self.settings.catalog_url;
        let (installed, catalog) = futures::join!(
            self.registry.list_installed(),
            self.fetcher.fetch_text(url)
        );

        let installed = index_installed(installed.context("listing installed packages")?);
        let document =
            parse_catalog(&catalog.with_context(|| format!("fetching catalog from {}", url))?)?;
        debug!(
            "Catalog has {} curated and {} other entries, registry reports {} packages",
            document.curated.len(),
            document.other.len(),
            installed.len()
        );

        let supported = self.settings.category_set();
        let snapshot = CatalogSnapshot {
            curated: self.resolve_group(&document.curated, &installed, &supported),
            other: self.resolve_group(&document.other, &installed, &supported),
        };
        info!(
            "Catalog synchronized: {} curated, {} other",
            snapshot.curated.len(),
            snapshot.other.len()
        );
        Ok(snapshot)
    }

    fn resolve_group(
        &self,
        raw: &[RawAsset],
        installed: &InstalledPackages,
        supported: &CategorySet,
    ) -> Vec<AssetInfo> {
        let mut assets: Vec<AssetInfo> = raw
            .iter()
            .filter_map(AssetInfo::from_raw)
            .filter(|asset| supported.supports(asset.category))
            .map(|mut asset| {
                let probe = self.installers.select(&asset).query_state(&asset, installed);
                asset.apply_probe(probe.installed, probe.has_update, probe.backend_path);
                asset
            })
            .collect();

        assets.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        assets
    }
}
