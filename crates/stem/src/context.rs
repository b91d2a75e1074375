use crate::asset::{AssetInfo, AssetKey, AssetState};
use futures::channel::{mpsc, oneshot};
use rusty_curator_core::manifest::Settings;
use rusty_curator_core::protocol::{CuratorEvent, EventReceiver, EventSender, OperationKind};
use rusty_curator_core::CuratorError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    NotStarted,
    Loading,
    Loaded,
}

/// How a caller that wants a published catalog proceeds.
pub(crate) enum LoadStart {
    /// No pass was running; the caller runs one.
    Run,
    /// A pass is running; resolves once it (and any queued rerun) publishes.
    Wait(oneshot::Receiver<()>),
}

/// The two published groups of one synchronization pass.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub curated: Vec<AssetInfo>,
    pub other: Vec<AssetInfo>,
}

struct Inner {
    state: CatalogState,
    reload_queued: bool,
    /// Bumped on every orchestrator write to an asset.
    generation: u64,
    /// Generation at the moment the running pass was started.
    pass_started: u64,
    curated: Vec<AssetInfo>,
    other: Vec<AssetInfo>,
    subscribers: Vec<EventSender>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Inner {
    fn enter_loading(&mut self) {
        self.state = CatalogState::Loading;
        self.pass_started = self.generation;
    }

    fn assets_mut(&mut self) -> impl Iterator<Item = &mut AssetInfo> {
        self.curated.iter_mut().chain(self.other.iter_mut())
    }

    fn find(&self, key: &AssetKey) -> Option<&AssetInfo> {
        self.curated
            .iter()
            .chain(self.other.iter())
            .find(|a| &a.key() == key)
    }
}

/// Owns the catalog lifecycle, the published asset lists and the event
/// subscribers. One context per catalog; nothing here is global.
pub struct CatalogContext {
    settings: Arc<Settings>,
    inner: Mutex<Inner>,
}

impl CatalogContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            inner: Mutex::new(Inner {
                state: CatalogState::NotStarted,
                reload_queued: false,
                generation: 0,
                pass_started: 0,
                curated: Vec::new(),
                other: Vec::new(),
                subscribers: Vec::new(),
                waiters: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn state(&self) -> CatalogState {
        self.lock().state
    }

    pub fn is_loading(&self) -> bool {
        self.state() == CatalogState::Loading
    }

    pub fn curated_assets(&self) -> Vec<AssetInfo> {
        self.lock().curated.clone()
    }

    pub fn other_assets(&self) -> Vec<AssetInfo> {
        self.lock().other.clone()
    }

    pub fn asset(&self, key: &AssetKey) -> Option<AssetInfo> {
        self.lock().find(key).cloned()
    }

    /// NotStarted -> Loading. Returns whether the caller must start a pass.
    pub(crate) fn start_if_not_started(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CatalogState::NotStarted {
            return false;
        }
        inner.enter_loading();
        true
    }

    /// Enters Loading unless a pass is already running, in which case the
    /// reload is queued behind it. Returns whether the caller must start a pass.
    pub(crate) fn request_reload(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == CatalogState::Loading {
            inner.reload_queued = true;
            return false;
        }
        inner.enter_loading();
        true
    }

    /// Like [`Self::request_reload`], but joins a running pass instead of
    /// queueing another one.
    pub(crate) fn begin_load(&self) -> LoadStart {
        let mut inner = self.lock();
        if inner.state == CatalogState::Loading {
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            return LoadStart::Wait(rx);
        }
        inner.enter_loading();
        LoadStart::Run
    }

    /// Publishes a finished pass (or keeps the previous lists when it
    /// failed). Assets settled after the pass started keep their settled
    /// state over what the pass read. Returns whether a queued reload requires
    /// another pass.
    pub(crate) fn finish_pass(&self, result: Result<CatalogSnapshot, String>) -> bool {
        let (event, rerun) = {
            let mut inner = self.lock();
            let pass_started = inner.pass_started;
            let event = match result {
                Ok(mut snapshot) => {
                    for asset in snapshot.curated.iter_mut().chain(snapshot.other.iter_mut()) {
                        if let Some(previous) = inner.find(&asset.key()) {
                            asset.carry_live_state(previous, pass_started);
                        }
                    }
                    inner.curated = snapshot.curated;
                    inner.other = snapshot.other;
                    CuratorEvent::CatalogLoaded {
                        curated: inner.curated.len(),
                        other: inner.other.len(),
                    }
                }
                Err(error) => CuratorEvent::CatalogFailed(error),
            };

            let rerun = std::mem::take(&mut inner.reload_queued);
            if rerun {
                inner.pass_started = inner.generation;
            } else {
                inner.state = CatalogState::Loaded;
                for waiter in inner.waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            (event, rerun)
        };
        self.emit(event);
        rerun
    }

    /// Marks the asset busy for `kind`. Rejects assets that are unknown or
    /// already have an operation in flight.
    pub(crate) fn begin_operation(
        &self,
        key: &AssetKey,
        kind: OperationKind,
    ) -> Result<(AssetInfo, AssetState), CuratorError> {
        let mut inner = self.lock();
        let current = inner
            .find(key)
            .ok_or_else(|| CuratorError::UnknownAsset(key.to_string()))?;
        if current.is_busy() {
            return Err(CuratorError::Busy(current.display_name.clone()));
        }

        let mut prior = None;
        let mut snapshot = None;
        for asset in inner.assets_mut().filter(|a| &a.key() == key) {
            let state = asset.begin(kind)?;
            prior.get_or_insert(state);
            snapshot.get_or_insert_with(|| asset.clone());
        }
        match (snapshot, prior) {
            (Some(asset), Some(prior)) => Ok((asset, prior)),
            _ => Err(CuratorError::UnknownAsset(key.to_string())),
        }
    }

    pub(crate) fn settle(&self, key: &AssetKey, installed: bool) {
        self.update(key, |asset, generation| asset.settle(installed, generation));
    }

    pub(crate) fn restore(&self, key: &AssetKey, state: AssetState) {
        self.update(key, |asset, generation| asset.restore(state, generation));
    }

    /// Applies `f` to every published copy of the asset (it may be listed in
    /// both groups) under a fresh generation.
    fn update(&self, key: &AssetKey, mut f: impl FnMut(&mut AssetInfo, u64)) {
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;
        for asset in inner.assets_mut().filter(|a| &a.key() == key) {
            f(asset, generation);
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: CuratorEvent) {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}
