use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use rusty_curator_core::backend::RemoteFetcher;
use std::path::{Path, PathBuf};

const USER_AGENT: &str = concat!("rusty-curator/", env!("CARGO_PKG_VERSION"));

/// `RemoteFetcher` over surf, following a bounded number of redirects
/// (release downloads redirect to a CDN).
pub struct SurfFetcher {
    client: surf::Client,
}

impl Default for SurfFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfFetcher {
    pub fn new() -> Self {
        Self::with_max_redirects(5)
    }

    pub fn with_max_redirects(max_attempts: u8) -> Self {
        Self {
            client: surf::Client::new().with(RedirectMiddleware::new(max_attempts)),
        }
    }

    async fn get(&self, url: &str) -> Result<surf::Response> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} failed with status: {}", url, status));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteFetcher for SurfFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);
        let mut response = self.get(url).await?;
        response
            .body_string()
            .await
            .map_err(|e| anyhow!("Reading body of {} failed: {}", url, e))
    }

    async fn fetch_bytes(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        let mut response = self.get(url).await?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Downloading {} to {:?}", url, destination);

        let mut file = async_std::fs::File::create(destination)
            .await
            .map_err(|e| anyhow!("Failed to create {:?}: {}", destination, e))?;

        futures::io::copy(&mut response, &mut file)
            .await
            .map_err(|e| anyhow!("Streaming {} failed: {}", url, e))?;

        Ok(destination.to_path_buf())
    }
}

struct RedirectMiddleware {
    max_attempts: u8,
}

impl RedirectMiddleware {
    fn new(max_attempts: u8) -> Self {
        Self { max_attempts }
    }
}

#[surf::utils::async_trait]
impl surf::middleware::Middleware for RedirectMiddleware {
    async fn handle(
        &self,
        req: surf::Request,
        client: surf::Client,
        next: surf::middleware::Next<'_>,
    ) -> surf::Result<surf::Response> {
        let mut attempts = 0;
        let mut current_req = req;

        loop {
            if attempts > self.max_attempts {
                return Err(surf::Error::from_str(
                    surf::StatusCode::LoopDetected,
                    "Too many redirects",
                ));
            }

            let response = next.run(current_req.clone(), client.clone()).await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }
            let Some(location) = response.header("Location") else {
                return Ok(response);
            };

            let location = location.last().as_str().to_string();
            let new_url = match surf::Url::parse(&location) {
                Ok(url) => url,
                Err(_) => current_req.url().join(&location).map_err(|_| {
                    surf::Error::from_str(
                        surf::StatusCode::BadGateway,
                        "Invalid redirect location",
                    )
                })?,
            };

            let mut next_req = surf::Request::new(current_req.method(), new_url);
            next_req.insert_header("User-Agent", USER_AGENT);
            current_req = next_req;
            attempts += 1;
        }
    }
}
