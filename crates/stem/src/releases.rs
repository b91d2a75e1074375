//! Resolution of downloadable archives from a repository's latest release.
//!
//! A release may publish several qualifying artifacts. Only the first one,
//! in published order, is used; further matches are logged with a warning.

use anyhow::{Context, Result};
use log::{debug, warn};
use regex::Regex;
use rusty_curator_core::backend::RemoteFetcher;
use rusty_curator_core::CuratorError;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseArtifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseArtifact {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "browser_download_url")]
    pub download_url: String,
}

impl ReleaseArtifact {
    /// The published name, or the last URL segment when the name is missing.
    pub fn file_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.download_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.download_url)
    }
}

/// Decides which artifacts qualify for download.
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    extension: String,
    pattern: Option<Regex>,
}

impl ArtifactFilter {
    pub fn new(extension: &str, pattern: Option<&str>) -> Result<Self, CuratorError> {
        let pattern = pattern
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                Regex::new(p).map_err(|e| CuratorError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            extension: extension.to_string(),
            pattern,
        })
    }

    /// Extension must match; the pattern only has to occur somewhere in the name.
    pub fn matches(&self, artifact: &ReleaseArtifact) -> bool {
        if artifact.download_url.trim().is_empty() {
            return false;
        }
        let name = artifact.file_name();
        name.ends_with(&self.extension)
            && self.pattern.as_ref().map_or(true, |p| p.is_match(name))
    }
}

/// `owner/name` from the last two path segments of a repository URL.
pub fn repo_slug(source_repo: &str) -> Result<String, CuratorError> {
    let trimmed = source_repo.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut segments = trimmed.rsplit('/').filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some(name), Some(owner)) if !owner.ends_with(':') => Ok(format!("{}/{}", owner, name)),
        _ => Err(CuratorError::InvalidRepoUrl(source_repo.to_string())),
    }
}

pub fn latest_release_url(api_base: &str, slug: &str) -> String {
    format!(
        "{}/repos/{}/releases/latest",
        api_base.trim_end_matches('/'),
        slug
    )
}

/// The first qualifying artifact in published order.
pub fn select_artifact<'a>(
    release: &'a Release,
    filter: &ArtifactFilter,
) -> Option<&'a ReleaseArtifact> {
    let mut matching = release.assets.iter().filter(|a| filter.matches(a));
    let first = matching.next()?;

    let ignored: Vec<&str> = matching.map(|a| a.file_name()).collect();
    if !ignored.is_empty() {
        warn!(
            "Release {} has {} more matching artifacts, using {} and ignoring {:?}",
            release.tag_name,
            ignored.len(),
            first.file_name(),
            ignored
        );
    }
    Some(first)
}

/// Queries the latest release of `source_repo` and picks its archive.
pub async fn resolve_latest_artifact(
    fetcher: &dyn RemoteFetcher,
    api_base: &str,
    source_repo: &str,
    filter: &ArtifactFilter,
) -> Result<ReleaseArtifact> {
    let slug = repo_slug(source_repo)?;
    let url = latest_release_url(api_base, &slug);
    debug!("Resolving latest release of {} via {}", slug, url);

    let body = fetcher
        .fetch_text(&url)
        .await
        .with_context(|| format!("fetching latest release of {}", slug))?;
    let release: Release = serde_json::from_str(&body)
        .with_context(|| format!("parsing latest release of {}", slug))?;

    select_artifact(&release, filter).cloned().ok_or_else(|| {
        CuratorError::NoMatchingArtifact {
            repo: slug,
            extension: filter.extension.clone(),
        }
        .into()
    })
}
