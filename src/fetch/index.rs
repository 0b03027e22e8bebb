use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filename the index document is saved under inside the work dir.
const INDEX_FILENAME: &str = "index-with-download-links.xml";

/// Download the registry index document listing the available archives and
/// save it into `work_dir`. Returns the path of the saved file.
///
/// The body is persisted as-is; a malformed document surfaces later when the
/// archive resolver parses it.
pub async fn download_index(
    client: &Client,
    url: &str,
    work_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("index query {}", url))?;
    let bytes = resp.bytes().await.context("reading index body")?;

    let dest_path = work_dir.as_ref().join(INDEX_FILENAME);
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("saving index to {}", dest_path.display()))?;

    Ok(dest_path)
}
