use log::warn;
use rusty_curator_core::manifest::{Category, InstallKind, RawAsset};
pub use rusty_curator_core::protocol::AssetKey;
use rusty_curator_core::protocol::OperationKind;
use rusty_curator_core::CuratorError;

/// Per-asset lifecycle. `Installing` and `Removing` are the busy states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    NotInstalled,
    Installing,
    Installed,
    Removing,
}

/// Which installer handles an asset. Chosen once from the install kind and
/// the archive flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Registry,
    Archive,
    /// A registry package that is delivered as an archive and unpacked
    /// instead of registered.
    UnpackedPackage,
}

/// One catalog entry with locally derived install state.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub identifier: String,
    /// Persistent local reference of archive assets.
    pub reference_id: String,
    pub kind: InstallKind,
    pub install_from_archive: bool,
    pub category: Category,
    pub source_repo: String,
    pub archive_name_pattern: Option<String>,
    pub display_name: String,
    pub author: String,
    pub description: String,
    state: AssetState,
    has_update: bool,
    backend_path: Option<String>,
    /// Context generation of the last orchestrator write; zero when the state
    /// only ever came from a synchronization probe.
    settled_gen: u64,
}

impl AssetInfo {
    /// Normalizes a raw catalog entry. Entries with an unknown kind token or
    /// category code are skipped.
    pub fn from_raw(raw: &RawAsset) -> Option<Self> {
        let Some(kind) = InstallKind::from_token(&raw.kind) else {
            warn!("Skipping '{}': unknown kind '{}'", raw.display_name, raw.kind);
            return None;
        };
        let Some(category) = Category::from_code(&raw.category) else {
            warn!(
                "Skipping '{}': unknown category '{}'",
                raw.display_name, raw.category
            );
            return None;
        };

        let pattern = raw.archive_name_pattern.trim();
        Some(Self {
            identifier: raw.identifier.trim().to_string(),
            reference_id: raw.reference_id.trim().to_string(),
            kind,
            install_from_archive: raw.install_from_archive,
            category,
            source_repo: raw.source_repo.trim().to_string(),
            archive_name_pattern: (!pattern.is_empty()).then(|| pattern.to_string()),
            display_name: raw.display_name.clone(),
            author: raw.author.clone(),
            description: raw.description.clone(),
            state: AssetState::NotInstalled,
            has_update: false,
            backend_path: None,
            settled_gen: 0,
        })
    }

    pub fn key(&self) -> AssetKey {
        match self.kind {
            InstallKind::RegistryPackage if !self.identifier.is_empty() => {
                AssetKey::new(format!("pkg:{}", self.identifier))
            }
            InstallKind::Archive if !self.reference_id.is_empty() => {
                AssetKey::new(format!("ref:{}", self.reference_id))
            }
            _ => AssetKey::new(format!("name:{}", self.display_name)),
        }
    }

    pub fn route(&self) -> Route {
        match self.kind {
            InstallKind::Archive => Route::Archive,
            InstallKind::RegistryPackage if self.install_from_archive => Route::UnpackedPackage,
            InstallKind::RegistryPackage => Route::Registry,
        }
    }

    /// Key under which the archive store tracks this asset.
    pub fn store_key(&self) -> &str {
        if self.reference_id.is_empty() {
            &self.identifier
        } else {
            &self.reference_id
        }
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, AssetState::Installing | AssetState::Removing)
    }

    pub fn is_being_installed(&self) -> bool {
        self.state == AssetState::Installing
    }

    /// A removal in flight still counts as installed until it is confirmed.
    pub fn is_installed(&self) -> bool {
        matches!(self.state, AssetState::Installed | AssetState::Removing)
    }

    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Where the registry keeps this package, relative to the project root.
    pub fn backend_path(&self) -> Option<&str> {
        self.backend_path.as_deref()
    }

    pub(crate) fn apply_probe(&mut self, installed: bool, has_update: bool, backend_path: Option<String>) {
        self.state = if installed {
            AssetState::Installed
        } else {
            AssetState::NotInstalled
        };
        self.has_update = installed && has_update;
        self.backend_path = backend_path;
    }

    /// Enters the busy state for `kind`, returning the state to restore if
    /// the operation is abandoned.
    pub(crate) fn begin(&mut self, kind: OperationKind) -> Result<AssetState, CuratorError> {
        if self.is_busy() {
            return Err(CuratorError::Busy(self.display_name.clone()));
        }
        let prior = self.state;
        self.state = match kind {
            OperationKind::Install => AssetState::Installing,
            OperationKind::Uninstall => AssetState::Removing,
        };
        Ok(prior)
    }

    pub(crate) fn settle(&mut self, installed: bool, generation: u64) {
        self.settled_gen = generation;
        if installed {
            // A finished install is the latest version; a failed removal keeps what it had.
            if self.state != AssetState::Removing {
                self.has_update = false;
            }
            self.state = AssetState::Installed;
        } else {
            self.state = AssetState::NotInstalled;
            self.has_update = false;
            self.backend_path = None;
        }
    }

    pub(crate) fn restore(&mut self, state: AssetState, generation: u64) {
        self.settled_gen = generation;
        self.state = state;
    }

    /// Reconciles a freshly synchronized entry with the published one. An
    /// in-flight operation stays visible, and anything the orchestrator
    /// settled after `pass_started` wins over the pass's older reading.
    pub(crate) fn carry_live_state(&mut self, previous: &AssetInfo, pass_started: u64) {
        if previous.settled_gen > pass_started {
            self.state = previous.state;
            self.has_update = previous.has_update;
            self.backend_path = previous.backend_path.clone();
        } else if previous.is_busy() {
            self.state = previous.state;
        }
        self.settled_gen = previous.settled_gen;
    }
}
