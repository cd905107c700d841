use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("model file {0} not found and no download URL configured")]
    Missing(String),
    #[error("invalid download token")]
    InvalidToken,
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to write model file: {0}")]
    Io(#[from] std::io::Error),
}

async fn download_file(url: &str, path: &Path, token: Option<&str>) -> Result<(), DownloadError> {
    info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();

    if let Some(token) = token {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| DownloadError::InvalidToken)?;
        auth_value.set_sensitive(true);
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(
        ACCEPT,
        HeaderValue::from_static("application/octet-stream"),
    );

    let client = reqwest::Client::new();
    let bytes = client
        .get(url)
        .headers(header_map)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    info!("Saved {} ({} bytes)", path.display(), bytes.len());

    Ok(())
}

/// Makes sure the leaf model is on disk, fetching it from `url` if needed.
pub async fn ensure_model_file(
    model_path: &Path,
    url: Option<&str>,
    token: Option<&str>,
) -> Result<(), DownloadError> {
    info!("Checking model...");
    if model_path.exists() {
        return Ok(());
    }

    match url {
        Some(url) => download_file(url, model_path, token).await,
        None => Err(DownloadError::Missing(model_path.display().to_string())),
    }
}
