use crate::asset::AssetInfo;
use crate::context::{CatalogContext, LoadStart};
use crate::sync::CatalogSynchronizer;
use async_std::task;
use log::{error, info};
use std::sync::Arc;

/// Catalog lifecycle (not started / loading / loaded) on top of the
/// synchronizer. Reads never block; the first read starts the initial pass.
pub struct Catalog {
    ctx: Arc<CatalogContext>,
    synchronizer: Arc<CatalogSynchronizer>,
}

impl Catalog {
    pub fn new(ctx: Arc<CatalogContext>, synchronizer: Arc<CatalogSynchronizer>) -> Self {
        Self { ctx, synchronizer }
    }

    pub fn context(&self) -> &Arc<CatalogContext> {
        &self.ctx
    }

    pub fn trigger_load_if_not_started(self: &Arc<Self>) {
        if self.ctx.start_if_not_started() {
            self.spawn_passes();
        }
    }

    /// Restarts synchronization. While a pass is in flight the reload is
    /// queued and runs right after it publishes.
    pub fn force_reload(self: &Arc<Self>) {
        if self.ctx.request_reload() {
            self.spawn_passes();
        } else {
            info!("Reload queued behind the running synchronization");
        }
    }

    pub fn is_loading(&self) -> bool {
        self.ctx.is_loading()
    }

    pub fn curated_assets(self: &Arc<Self>) -> Vec<AssetInfo> {
        self.trigger_load_if_not_started();
        self.ctx.curated_assets()
    }

    pub fn other_assets(self: &Arc<Self>) -> Vec<AssetInfo> {
        self.trigger_load_if_not_started();
        self.ctx.other_assets()
    }

    /// Runs a pass and waits until the catalog is published. When a pass is
    /// already running, waits for it instead of starting another.
    pub async fn load_now(&self) {
        match self.ctx.begin_load() {
            LoadStart::Run => self.run_passes().await,
            LoadStart::Wait(published) => {
                let _ = published.await;
            }
        }
    }

    fn spawn_passes(self: &Arc<Self>) {
        let this = Arc::clone(self);
        task::spawn(async move { this.run_passes().await });
    }

    async fn run_passes(&self) {
        loop {
            let result = self.synchronizer.synchronize().await.map_err(|e| {
                error!("Catalog synchronization failed: {:#}", e);
                format!("{:#}", e)
            });
            if !self.ctx.finish_pass(result) {
                break;
            }
        }
    }
}
