use anyhow::{Context, Result};
use rusty_curator_core::manifest::Settings;
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.toml";

/// Resolves the configuration directory: `CURATOR_HOME`, otherwise the
/// platform config dir.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CURATOR_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::config_dir()
        .context("Could not find config directory")?
        .join("rusty-curator"))
}

/// Loads `settings.toml` from the config directory (defaults when absent)
/// and applies environment overrides.
pub fn load_settings() -> Result<Settings> {
    let mut settings = load_settings_from(&config_dir()?)?;

    if let Ok(project) = std::env::var("CURATOR_PROJECT") {
        settings.project_dir = PathBuf::from(project);
    }
    if let Ok(cache) = std::env::var("CURATOR_CACHE") {
        settings.scratch_dir = PathBuf::from(cache);
    }
    Ok(settings)
}

pub fn load_settings_from(dir: &Path) -> Result<Settings> {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("parsing {:?}", path))
}

pub fn save_settings_to(dir: &Path, settings: &Settings) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(SETTINGS_FILE), toml::to_string(settings)?)?;
    Ok(())
}
