use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use rusty_curator_core::backend::ArchiveStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const INDEX_FILE: &str = "Library/curator-store.toml";
const IMPORT_DIR: &str = "Assets/Imported";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    #[serde(default)]
    assets: Vec<StoreEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreEntry {
    reference_id: String,
    /// Relative to the project root.
    path: PathBuf,
}

/// Archive store rooted at a project directory. Imported archives land in
/// `Assets/Imported/<reference_id>/` and are tracked in a TOML index so that
/// a reference id resolves to a stable local path.
pub struct DirectoryStore {
    project_dir: PathBuf,
    index: Mutex<StoreIndex>,
}

impl DirectoryStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let index_path = project_dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let content = fs::read_to_string(&index_path)
                .with_context(|| format!("reading {:?}", index_path))?;
            toml::from_str(&content).with_context(|| format!("parsing {:?}", index_path))?
        } else {
            StoreIndex::default()
        };

        Ok(Self {
            project_dir,
            index: Mutex::new(index),
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn save(&self, index: &StoreIndex) -> Result<()> {
        let index_path = self.project_dir.join(INDEX_FILE);
        if let Some(parent) = index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&index_path, toml::to_string(index)?)
            .with_context(|| format!("writing {:?}", index_path))?;
        Ok(())
    }

    fn entry(&self, reference_id: &str) -> Option<StoreEntry> {
        if reference_id.is_empty() {
            return None;
        }
        let index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index
            .assets
            .iter()
            .find(|e| e.reference_id == reference_id)
            .cloned()
    }

    /// Resolves a relative backend path inside the project, refusing anything
    /// that could point outside it.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.as_os_str().is_empty() {
            bail!("refusing to touch {:?} outside the project", path);
        }
        Ok(self.project_dir.join(path))
    }
}

impl ArchiveStore for DirectoryStore {
    fn exists(&self, reference_id: &str) -> bool {
        self.locate(reference_id).is_some()
    }

    fn locate(&self, reference_id: &str) -> Option<PathBuf> {
        let entry = self.entry(reference_id)?;
        let path = self.project_dir.join(&entry.path);
        path.exists().then_some(path)
    }

    fn import(&self, reference_id: &str, archive: &Path) -> Result<PathBuf> {
        if reference_id.is_empty() {
            bail!("cannot import {:?} without a reference id", archive);
        }
        let file_name = archive
            .file_name()
            .ok_or_else(|| anyhow!("archive path {:?} has no file name", archive))?;

        let relative = Path::new(IMPORT_DIR).join(reference_id);
        let target_dir = self.resolve(&relative)?;
        fs::create_dir_all(&target_dir)?;
        fs::copy(archive, target_dir.join(file_name))
            .with_context(|| format!("importing {:?}", archive))?;

        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.assets.retain(|e| e.reference_id != reference_id);
        index.assets.push(StoreEntry {
            reference_id: reference_id.to_string(),
            path: relative,
        });
        self.save(&index)?;

        info!("Imported {:?} as {}", archive, reference_id);
        Ok(target_dir)
    }

    fn delete(&self, reference_id: &str) -> Result<()> {
        let entry = self
            .entry(reference_id)
            .ok_or_else(|| anyhow!("no stored asset with reference id {}", reference_id))?;
        self.delete_path(&entry.path)?;

        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.assets.retain(|e| e.reference_id != reference_id);
        self.save(&index)
    }

    fn delete_path(&self, path: &Path) -> Result<()> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else if target.exists() {
            fs::remove_file(&target)?;
        } else {
            warn!("Nothing to delete at {:?}", target);
        }
        Ok(())
    }
}
