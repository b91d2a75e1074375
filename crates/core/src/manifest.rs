use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/Thryrallo/VRChat-Asset-Installer/master/listing.json";

/// Runtime configuration shared by the synchronizer and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub catalog_url: String,
    /// Base URL of the release hosting API (`{base}/repos/{owner}/{name}/releases/latest`).
    pub release_api_base: String,
    pub archive_extension: String,
    pub supported_categories: Vec<Category>,
    /// Registry packages whose backend path starts with this prefix are embedded
    /// in the project and cannot be removed through the registry.
    pub embedded_path_prefix: String,
    pub operation_timeout_secs: u64,
    /// `None` disables the automatic ticker; the host then calls
    /// `poll_pending_operations` itself.
    pub tick_interval_ms: Option<u64>,
    pub project_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            release_api_base: "https://api.github.com".to_string(),
            archive_extension: ".unitypackage".to_string(),
            supported_categories: vec![Category::A, Category::B],
            embedded_path_prefix: "Packages/".to_string(),
            operation_timeout_secs: 600,
            tick_interval_ms: Some(100),
            project_dir: PathBuf::from("."),
            scratch_dir: std::env::temp_dir().join("rusty-curator"),
        }
    }
}

impl Settings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }

    pub fn category_set(&self) -> CategorySet {
        CategorySet::from_iter(self.supported_categories.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
    Both,
}

impl Category {
    /// Parses the one-letter catalog code. A missing code means the asset
    /// works everywhere.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Category::A),
            "b" => Some(Category::B),
            "" | "*" => Some(Category::Both),
            _ => None,
        }
    }
}

/// The categories the host currently supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySet {
    a: bool,
    b: bool,
}

impl CategorySet {
    pub fn supports(&self, category: Category) -> bool {
        match category {
            Category::A => self.a,
            Category::B => self.b,
            Category::Both => self.a || self.b,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.a && !self.b
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        let mut set = CategorySet::default();
        for category in iter {
            match category {
                Category::A => set.a = true,
                Category::B => set.b = true,
                Category::Both => {
                    set.a = true;
                    set.b = true;
                }
            }
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallKind {
    RegistryPackage,
    Archive,
}

impl InstallKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "upm" | "vpm" | "registry" => Some(InstallKind::RegistryPackage),
            "unitypackage" | "archive" => Some(InstallKind::Archive),
            _ => None,
        }
    }
}

/// The remote catalog document as published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub curated: Vec<RawAsset>,
    #[serde(default)]
    pub other: Vec<RawAsset>,
}

/// One catalog entry before normalization. Only declarative fields are read;
/// install state is always derived locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAsset {
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    #[serde(rename = "packageId")]
    pub identifier: String,
    #[serde(rename = "guid")]
    pub reference_id: String,
    #[serde(rename = "git")]
    pub source_repo: String,
    #[serde(rename = "unitypackageRegex")]
    pub archive_name_pattern: String,
    #[serde(rename = "upmInstallFromUnitypackage")]
    pub install_from_archive: bool,
    #[serde(rename = "name")]
    pub display_name: String,
    pub author: String,
    pub description: String,
}
