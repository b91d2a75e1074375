use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use rusty_curator_core::backend::RegistryBackend;
use rusty_curator_core::protocol::{InstalledPackage, OperationHandle, SharedHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const MANIFEST: &str = "Packages/manifest.json";
const PACKAGES_DIR: &str = "Packages";
const CACHE_DIR: &str = "Library/PackageCache";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: String,
    #[serde(default)]
    version: String,
}

/// Registry backend over a project's `Packages/manifest.json`. Packages
/// checked into `Packages/<dir>` are reported as embedded.
pub struct ProjectRegistry {
    project_dir: PathBuf,
    // Serializes read-modify-write cycles on the manifest.
    write_lock: Mutex<()>,
}

impl ProjectRegistry {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.project_dir.join(MANIFEST)
    }

    fn load_manifest(&self) -> Result<ProjectManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(ProjectManifest::default());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {:?}", path))
    }

    fn save_manifest(&self, manifest: &ProjectManifest) -> Result<()> {
        let path = self.manifest_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(manifest)?)
            .with_context(|| format!("writing {:?}", path))?;
        Ok(())
    }

    fn embedded_packages(&self) -> Vec<InstalledPackage> {
        let dir = self.project_dir.join(PACKAGES_DIR);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut packages = Vec::new();
        for entry in entries.flatten() {
            let package_json = entry.path().join("package.json");
            if !package_json.is_file() {
                continue;
            }
            match read_package_json(&package_json) {
                Ok(pkg) => packages.push(InstalledPackage {
                    identifier: pkg.name,
                    installed_version: pkg.version.clone(),
                    latest_version: pkg.version,
                    known_versions: 0,
                    backend_path: format!(
                        "{}/{}",
                        PACKAGES_DIR,
                        entry.file_name().to_string_lossy()
                    ),
                }),
                Err(e) => warn!("Skipping embedded package {:?}: {}", package_json, e),
            }
        }
        packages
    }

    fn is_embedded(&self, identifier: &str) -> bool {
        self.embedded_packages()
            .iter()
            .any(|p| p.identifier == identifier)
    }

    fn add_dependency(&self, identifier: &str, target: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut manifest = self.load_manifest()?;
        manifest
            .dependencies
            .insert(identifier.to_string(), target.to_string());
        self.save_manifest(&manifest)
    }

    /// Returns whether the manifest listed the package.
    fn remove_dependency(&self, identifier: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut manifest = self.load_manifest()?;
        if manifest.dependencies.remove(identifier).is_none() {
            return Ok(false);
        }
        self.save_manifest(&manifest)?;
        Ok(true)
    }
}

fn read_package_json(path: &Path) -> Result<PackageJson> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn is_source_control(spec: &str) -> bool {
    spec.ends_with(".git") || spec.starts_with("git") || spec.contains("://")
}

#[async_trait]
impl RegistryBackend for ProjectRegistry {
    async fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let manifest = self.load_manifest()?;
        let mut packages = self.embedded_packages();

        for (identifier, spec) in manifest.dependencies {
            if packages.iter().any(|p| p.identifier == identifier) {
                continue;
            }
            let (version, known_versions) = if is_source_control(&spec) {
                (String::new(), 0)
            } else {
                (spec.clone(), 1)
            };
            packages.push(InstalledPackage {
                backend_path: format!("{}/{}", CACHE_DIR, identifier),
                identifier,
                installed_version: version.clone(),
                latest_version: version,
                known_versions,
            });
        }
        Ok(packages)
    }

    fn add(&self, identifier: &str, target: &str) -> Box<dyn OperationHandle> {
        info!("Adding {} from {}", identifier, target);
        match self.add_dependency(identifier, target) {
            Ok(()) => Box::new(SharedHandle::succeeded()),
            Err(e) => Box::new(SharedHandle::failed(format!("{:#}", e))),
        }
    }

    fn remove(&self, identifier: &str) -> Box<dyn OperationHandle> {
        info!("Removing {}", identifier);
        match self.remove_dependency(identifier) {
            Ok(true) => Box::new(SharedHandle::succeeded()),
            // The registry cannot remove embedded packages and silently ignores them.
            Ok(false) if self.is_embedded(identifier) => Box::new(SharedHandle::new()),
            Ok(false) => Box::new(SharedHandle::failed(format!(
                "package {} is not installed",
                identifier
            ))),
            Err(e) => Box::new(SharedHandle::failed(format!("{:#}", e))),
        }
    }
}
