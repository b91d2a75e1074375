use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Install,
    Uninstall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    InProgress,
    Success,
    Failure,
}

/// A pollable view of one asynchronous backend operation.
pub trait OperationHandle: Send + Sync {
    fn is_complete(&self) -> bool;

    /// `InProgress` until the operation completes.
    fn status(&self) -> OperationStatus;

    /// Backend error message, only meaningful once the status is `Failure`.
    fn error(&self) -> Option<String>;

    /// Called when the observer gives up on the operation. Backends that own
    /// the work should stop it and leave nothing behind.
    fn abandon(&self) {}
}

#[derive(Debug)]
struct HandleState {
    status: OperationStatus,
    error: Option<String>,
    abandoned: bool,
}

/// A cloneable handle: the clone kept by the worker completes it, the clone
/// handed to the orchestrator observes it.
#[derive(Debug, Clone)]
pub struct SharedHandle {
    state: Arc<Mutex<HandleState>>,
}

impl Default for SharedHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                status: OperationStatus::InProgress,
                error: None,
                abandoned: false,
            })),
        }
    }

    pub fn succeeded() -> Self {
        let handle = Self::new();
        handle.succeed();
        handle
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let handle = Self::new();
        handle.fail(error);
        handle
    }

    pub fn succeed(&self) {
        self.finish(OperationStatus::Success, None);
    }

    pub fn fail(&self, error: impl Into<String>) {
        self.finish(OperationStatus::Failure, Some(error.into()));
    }

    /// Whether the observer gave up; workers check this before each step.
    pub fn is_abandoned(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abandoned
    }

    fn finish(&self, status: OperationStatus, error: Option<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // First completion wins.
        if state.status == OperationStatus::InProgress {
            state.status = status;
            state.error = error;
        }
    }
}

impl OperationHandle for SharedHandle {
    fn is_complete(&self) -> bool {
        self.status() != OperationStatus::InProgress
    }

    fn status(&self) -> OperationStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn error(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    fn abandon(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.abandoned = true;
        if state.status == OperationStatus::InProgress {
            state.status = OperationStatus::Failure;
            state.error = Some("abandoned".to_string());
        }
    }
}

/// A package as reported by the registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub identifier: String,
    pub installed_version: String,
    pub latest_version: String,
    /// How many versions the registry knows about; zero for packages pulled
    /// straight from source control.
    pub known_versions: usize,
    /// Where the package lives, relative to the project root.
    pub backend_path: String,
}

impl InstalledPackage {
    pub fn has_update(&self) -> bool {
        self.known_versions > 0 && self.latest_version != self.installed_version
    }
}

/// Stable key correlating an asset across synchronization passes and events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation events carry the asset's display name for presentation and its
/// key for correlation; display names are not unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CuratorEvent {
    /// A synchronization pass published its result
    CatalogLoaded { curated: usize, other: usize },
    /// A synchronization pass failed; the previous lists stay published
    CatalogFailed(String),
    OperationStarted {
        key: AssetKey,
        asset: String,
        kind: OperationKind,
    },
    /// The operation finished and the asset settled in the given install state
    OperationFinished {
        key: AssetKey,
        asset: String,
        kind: OperationKind,
        installed: bool,
    },
    OperationFailed {
        key: AssetKey,
        asset: String,
        kind: OperationKind,
        error: String,
    },
    /// The user declined an archive removal
    OperationCancelled { key: AssetKey, asset: String },
}

pub type EventReceiver = futures_channel::mpsc::UnboundedReceiver<CuratorEvent>;
pub type EventSender = futures_channel::mpsc::UnboundedSender<CuratorEvent>;
