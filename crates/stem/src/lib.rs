//! # Stem: The Engine
//!
//! Reconciles the remote catalog with locally installed assets and drives
//! install/remove operations against the registry and archive backends.
//!
//! - [`Catalog`] gates synchronization passes (not started / loading / loaded).
//! - [`CatalogSynchronizer`] merges catalog entries with backend install state.
//! - [`InstallOrchestrator`] dispatches operations and polls them to completion.
//!
//! All state lives in a [`CatalogContext`]; build one per catalog.

pub mod asset;
pub mod catalog;
pub mod context;
pub mod installer;
pub mod orchestrator;
pub mod releases;
pub mod sync;

pub use asset::{AssetInfo, AssetKey, AssetState, Route};
pub use catalog::Catalog;
pub use context::{CatalogContext, CatalogSnapshot, CatalogState};
pub use installer::{Backends, Installer, Installers};
pub use orchestrator::InstallOrchestrator;
pub use sync::CatalogSynchronizer;

use rusty_curator_core::manifest::Settings;
use std::sync::Arc;

/// Wires a context, catalog and orchestrator over one set of backends.
pub fn assemble(backends: Backends, settings: Settings) -> (Arc<Catalog>, Arc<InstallOrchestrator>) {
    let ctx = Arc::new(CatalogContext::new(settings));
    let settings = Arc::clone(ctx.settings());
    let installers = Arc::new(Installers::new(&backends, Arc::clone(&settings)));

    let synchronizer = Arc::new(CatalogSynchronizer::new(
        &backends,
        Arc::clone(&installers),
        settings,
    ));
    let catalog = Arc::new(Catalog::new(Arc::clone(&ctx), synchronizer));
    let orchestrator = Arc::new(InstallOrchestrator::new(ctx, installers, backends.store));
    (catalog, orchestrator)
}
