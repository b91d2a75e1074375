#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_std::task;
use async_trait::async_trait;
use rusty_curator_core::backend::{ArchiveStore, RegistryBackend, RemoteFetcher, RemovalPrompt};
use rusty_curator_core::manifest::Settings;
use rusty_curator_core::protocol::{InstalledPackage, OperationHandle, SharedHandle};
use rusty_curator_stem::{assemble, AssetInfo, Backends, Catalog, InstallOrchestrator};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CATALOG_URL: &str = "https://catalog.test/listing.json";
pub const API_BASE: &str = "https://api.test";

#[derive(Default)]
pub struct MockFetcher {
    pub texts: Mutex<HashMap<String, String>>,
    pub text_calls: Mutex<Vec<String>>,
    pub byte_calls: Mutex<Vec<String>>,
    pub catalog_delay: Mutex<Option<Duration>>,
    pub download_delay: Mutex<Option<Duration>>,
}

impl MockFetcher {
    pub fn serve(&self, url: &str, body: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn catalog_fetches(&self) -> usize {
        self.text_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == CATALOG_URL)
            .count()
    }

    pub fn touched_releases(&self) -> bool {
        self.text_calls
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.contains("/releases/"))
            || !self.byte_calls.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.text_calls.lock().unwrap().push(url.to_string());
        let delay = *self.catalog_delay.lock().unwrap();
        if let (CATALOG_URL, Some(delay)) = (url, delay) {
            task::sleep(delay).await;
        }
        self.texts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", url))
    }

    async fn fetch_bytes(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        self.byte_calls.lock().unwrap().push(url.to_string());
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            task::sleep(delay).await;
        }
        Ok(destination.to_path_buf())
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub installed: Mutex<Vec<InstalledPackage>>,
    pub added: Mutex<Vec<(String, String)>>,
    pub removed: Mutex<Vec<String>>,
    pub handles: Mutex<Vec<SharedHandle>>,
}

impl MockRegistry {
    pub fn report(&self, identifier: &str, installed: &str, latest: &str, backend_path: &str) {
        self.installed.lock().unwrap().push(InstalledPackage {
            identifier: identifier.to_string(),
            installed_version: installed.to_string(),
            latest_version: latest.to_string(),
            known_versions: 2,
            backend_path: backend_path.to_string(),
        });
    }

    /// The handle returned by the most recent add/remove.
    pub fn last_handle(&self) -> SharedHandle {
        self.handles
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no registry operation dispatched")
    }

    fn issue(&self) -> Box<dyn OperationHandle> {
        let handle = SharedHandle::new();
        self.handles.lock().unwrap().push(handle.clone());
        Box::new(handle)
    }
}

#[async_trait]
impl RegistryBackend for MockRegistry {
    async fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        Ok(self.installed.lock().unwrap().clone())
    }

    fn add(&self, identifier: &str, target: &str) -> Box<dyn OperationHandle> {
        self.added
            .lock()
            .unwrap()
            .push((identifier.to_string(), target.to_string()));
        self.issue()
    }

    fn remove(&self, identifier: &str) -> Box<dyn OperationHandle> {
        self.removed.lock().unwrap().push(identifier.to_string());
        self.issue()
    }
}

#[derive(Default)]
pub struct MockStore {
    pub present: Mutex<HashSet<String>>,
    pub imported: Mutex<Vec<(String, PathBuf)>>,
    pub deleted_paths: Mutex<Vec<PathBuf>>,
    pub fail_delete_path: AtomicBool,
}

impl MockStore {
    pub fn put(&self, reference_id: &str) {
        self.present
            .lock()
            .unwrap()
            .insert(reference_id.to_string());
    }

    pub fn delete_path_calls(&self) -> usize {
        self.deleted_paths.lock().unwrap().len()
    }
}

impl ArchiveStore for MockStore {
    fn exists(&self, reference_id: &str) -> bool {
        self.present.lock().unwrap().contains(reference_id)
    }

    fn locate(&self, reference_id: &str) -> Option<PathBuf> {
        self.exists(reference_id)
            .then(|| PathBuf::from("Assets/Imported").join(reference_id))
    }

    fn import(&self, reference_id: &str, archive: &Path) -> Result<PathBuf> {
        self.imported
            .lock()
            .unwrap()
            .push((reference_id.to_string(), archive.to_path_buf()));
        self.put(reference_id);
        Ok(PathBuf::from("Assets/Imported").join(reference_id))
    }

    fn delete(&self, reference_id: &str) -> Result<()> {
        if self.present.lock().unwrap().remove(reference_id) {
            Ok(())
        } else {
            Err(anyhow!("{} not stored", reference_id))
        }
    }

    fn delete_path(&self, path: &Path) -> Result<()> {
        self.deleted_paths.lock().unwrap().push(path.to_path_buf());
        if self.fail_delete_path.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        Ok(())
    }
}

pub struct MockPrompt {
    pub answer: AtomicBool,
    pub asked: AtomicUsize,
}

impl Default for MockPrompt {
    fn default() -> Self {
        Self {
            answer: AtomicBool::new(true),
            asked: AtomicUsize::new(0),
        }
    }
}

impl RemovalPrompt for MockPrompt {
    fn confirm(&self, _asset_name: &str, _path: Option<&Path>) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub catalog: Arc<Catalog>,
    pub orchestrator: Arc<InstallOrchestrator>,
    pub fetcher: Arc<MockFetcher>,
    pub registry: Arc<MockRegistry>,
    pub store: Arc<MockStore>,
    pub prompt: Arc<MockPrompt>,
}

pub fn test_settings() -> Settings {
    Settings {
        catalog_url: CATALOG_URL.to_string(),
        release_api_base: API_BASE.to_string(),
        tick_interval_ms: None,
        scratch_dir: PathBuf::from("/scratch"),
        ..Settings::default()
    }
}

impl Harness {
    pub fn new(catalog_json: &str) -> Self {
        Self::with_settings(catalog_json, test_settings())
    }

    pub fn with_settings(catalog_json: &str, settings: Settings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(CATALOG_URL, catalog_json);
        let registry = Arc::new(MockRegistry::default());
        let store = Arc::new(MockStore::default());
        let prompt = Arc::new(MockPrompt::default());

        let backends = Backends {
            fetcher: fetcher.clone(),
            registry: registry.clone(),
            store: store.clone(),
            prompt: prompt.clone(),
        };
        let (catalog, orchestrator) = assemble(backends, settings);
        Self {
            catalog,
            orchestrator,
            fetcher,
            registry,
            store,
            prompt,
        }
    }

    pub async fn loaded(catalog_json: &str) -> Self {
        let harness = Self::new(catalog_json);
        harness.catalog.load_now().await;
        harness
    }

    /// Looks an asset up by display name in either group.
    pub fn asset(&self, name: &str) -> AssetInfo {
        self.catalog
            .curated_assets()
            .into_iter()
            .chain(self.catalog.other_assets())
            .find(|a| a.display_name == name)
            .unwrap_or_else(|| panic!("asset {} not in catalog", name))
    }

    /// Ticks until nothing is pending.
    pub async fn drain(&self) {
        for _ in 0..400 {
            if self.orchestrator.poll_pending_operations() == 0 {
                return;
            }
            task::sleep(Duration::from_millis(5)).await;
        }
        panic!("pending operations never drained");
    }
}

pub fn release_json(names: &[&str]) -> String {
    let assets: Vec<serde_json::Value> = names
        .iter()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "browser_download_url": format!("https://github.com/acme/tool/releases/download/v1/{}", name),
            })
        })
        .collect();
    serde_json::json!({ "tag_name": "v1", "assets": assets }).to_string()
}
