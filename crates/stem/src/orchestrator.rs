use crate::asset::{AssetInfo, AssetKey};
use crate::context::CatalogContext;
use crate::installer::{Dispatch, Installers};
use anyhow::Result;
use async_std::task;
use log::{debug, error, info, warn};
use rusty_curator_core::backend::ArchiveStore;
use rusty_curator_core::protocol::{CuratorEvent, OperationHandle, OperationKind, OperationStatus};
use rusty_curator_core::CuratorError;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One in-flight asynchronous install or removal.
pub struct PendingOperation {
    pub kind: OperationKind,
    pub asset: AssetKey,
    pub asset_name: String,
    handle: Box<dyn OperationHandle>,
    /// Registry location at dispatch time, used by the manual-delete fallback.
    backend_path: Option<String>,
    started: Instant,
}

enum Outcome {
    Success,
    Failure(String),
}

impl PendingOperation {
    fn outcome(&self, timeout: Duration) -> Option<Outcome> {
        if self.handle.is_complete() {
            return Some(match self.handle.status() {
                OperationStatus::Success => Outcome::Success,
                _ => Outcome::Failure(
                    self.handle
                        .error()
                        .unwrap_or_else(|| "unknown backend error".to_string()),
                ),
            });
        }
        if self.started.elapsed() < timeout {
            return None;
        }
        // Late work must not land after the asset has been reset.
        self.handle.abandon();
        Some(Outcome::Failure(
            CuratorError::TimedOut(self.asset_name.clone()).to_string(),
        ))
    }
}

/// Dispatches installs and removals to the right installer and polls the
/// pending ones to completion.
pub struct InstallOrchestrator {
    ctx: Arc<CatalogContext>,
    installers: Arc<Installers>,
    store: Arc<dyn ArchiveStore>,
    pending: Mutex<Vec<PendingOperation>>,
    ticking: AtomicBool,
    timeout: Duration,
    tick_interval: Option<Duration>,
}

impl InstallOrchestrator {
    pub fn new(
        ctx: Arc<CatalogContext>,
        installers: Arc<Installers>,
        store: Arc<dyn ArchiveStore>,
    ) -> Self {
        let settings = Arc::clone(ctx.settings());
        Self {
            ctx,
            installers,
            store,
            pending: Mutex::new(Vec::new()),
            ticking: AtomicBool::new(false),
            timeout: settings.operation_timeout(),
            tick_interval: settings.tick_interval(),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingOperation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn is_pending(&self, asset: &AssetInfo) -> bool {
        let key = asset.key();
        self.pending().iter().any(|op| op.asset == key)
    }

    /// Starts installing (or updating) `asset`. Rejected while the asset is busy.
    pub fn install(self: &Arc<Self>, asset: &AssetInfo) -> Result<()> {
        self.dispatch(asset, OperationKind::Install)
    }

    /// Starts removing `asset`. Rejected while the asset is busy.
    pub fn remove(self: &Arc<Self>, asset: &AssetInfo) -> Result<()> {
        self.dispatch(asset, OperationKind::Uninstall)
    }

    fn dispatch(self: &Arc<Self>, asset: &AssetInfo, kind: OperationKind) -> Result<()> {
        let key = asset.key();
        let (asset, prior) = self.ctx.begin_operation(&key, kind).map_err(|e| {
            warn!("Ignoring {:?} request: {}", kind, e);
            e
        })?;
        self.ctx.emit(CuratorEvent::OperationStarted {
            key: key.clone(),
            asset: asset.display_name.clone(),
            kind,
        });

        let installer = self.installers.select(&asset);
        let dispatched = match kind {
            OperationKind::Install => installer.install(&asset),
            OperationKind::Uninstall => installer.remove(&asset),
        };

        match dispatched {
            Ok(Dispatch::Pending(handle)) => {
                self.pending().push(PendingOperation {
                    kind,
                    asset: key,
                    asset_name: asset.display_name.clone(),
                    handle,
                    backend_path: asset.backend_path().map(str::to_string),
                    started: Instant::now(),
                });
                self.ensure_ticking();
            }
            Ok(Dispatch::Done { installed }) => {
                self.ctx.settle(&key, installed);
                self.ctx.emit(CuratorEvent::OperationFinished {
                    key,
                    asset: asset.display_name,
                    kind,
                    installed,
                });
            }
            Ok(Dispatch::Cancelled) => {
                self.ctx.restore(&key, prior);
                self.ctx.emit(CuratorEvent::OperationCancelled {
                    key,
                    asset: asset.display_name,
                });
            }
            Err(e) => {
                error!("[Package] {:?} of '{}' failed: {:#}", kind, asset.display_name, e);
                self.ctx.restore(&key, prior);
                self.ctx.emit(CuratorEvent::OperationFailed {
                    key,
                    asset: asset.display_name,
                    kind,
                    error: format!("{:#}", e),
                });
                return Err(e);
            }
        }
        Ok(())
    }

    /// One tick: settles every pending operation whose handle completed or
    /// timed out. Returns how many are still pending.
    pub fn poll_pending_operations(&self) -> usize {
        let finished: Vec<(PendingOperation, Outcome)> = {
            let mut pending = self.pending();
            let mut finished = Vec::new();
            let mut i = 0;
            while i < pending.len() {
                match pending[i].outcome(self.timeout) {
                    Some(outcome) => finished.push((pending.remove(i), outcome)),
                    None => i += 1,
                }
            }
            finished
        };

        for (op, outcome) in finished {
            match outcome {
                Outcome::Success => self.succeed(op),
                Outcome::Failure(error) => self.fail(op, error),
            }
        }
        self.pending_count()
    }

    fn succeed(&self, op: PendingOperation) {
        let installed = op.kind == OperationKind::Install;
        match op.kind {
            OperationKind::Install => info!("[Package] Installed '{}'", op.asset_name),
            OperationKind::Uninstall => info!("[Package] Uninstalled '{}'", op.asset_name),
        }
        self.ctx.settle(&op.asset, installed);
        self.ctx.emit(CuratorEvent::OperationFinished {
            key: op.asset,
            asset: op.asset_name,
            kind: op.kind,
            installed,
        });
    }

    fn fail(&self, op: PendingOperation, error: String) {
        if op.kind == OperationKind::Uninstall {
            if let Some(path) = op.backend_path.as_deref() {
                warn!(
                    "[Package] Removing '{}' failed ({}), deleting it manually from {}",
                    op.asset_name, error, path
                );
                match self.store.delete_path(Path::new(path)) {
                    Ok(()) => {
                        self.ctx.settle(&op.asset, false);
                        self.ctx.emit(CuratorEvent::OperationFinished {
                            key: op.asset,
                            asset: op.asset_name,
                            kind: op.kind,
                            installed: false,
                        });
                    }
                    Err(e) => {
                        error!("[Package] Manual delete of {} failed: {:#}", path, e);
                        self.ctx.settle(&op.asset, true);
                        self.ctx.emit(CuratorEvent::OperationFailed {
                            key: op.asset,
                            asset: op.asset_name,
                            kind: op.kind,
                            error: format!("{:#}", e),
                        });
                    }
                }
                return;
            }
        }

        error!("[Package] {:?} of '{}' failed: {}", op.kind, op.asset_name, error);
        // Without confirmation the prior state is assumed to persist.
        self.ctx.settle(&op.asset, op.kind == OperationKind::Uninstall);
        self.ctx.emit(CuratorEvent::OperationFailed {
            key: op.asset,
            asset: op.asset_name,
            kind: op.kind,
            error,
        });
    }

    /// Runs a polling task while operations are pending; it stops once the
    /// list drains and is restarted by the next dispatch.
    fn ensure_ticking(self: &Arc<Self>) {
        let Some(interval) = self.tick_interval else {
            return;
        };
        if self.ticking.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        task::spawn(async move {
            loop {
                task::sleep(interval).await;
                if this.poll_pending_operations() > 0 {
                    continue;
                }
                this.ticking.store(false, Ordering::SeqCst);
                // A dispatch may have slipped in after the last poll.
                if this.pending_count() == 0 || this.ticking.swap(true, Ordering::SeqCst) {
                    break;
                }
            }
            debug!("Pending operations drained, ticker stopped");
        });
    }
}
