use anyhow::{anyhow, Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::{primitives::ByteStream, Client};
use std::path::Path;
use tracing::info;

/// S3 client using ambient credential resolution (env, profile, IMDS).
pub async fn make_s3_client() -> Client {
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    Client::new(&config)
}

/// The object key a local file is uploaded under: its base name.
pub fn object_key_for(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name to use as object key", path.display()))
}

/// Upload the file's contents to `bucket` under a key equal to its base name.
/// Existing objects are overwritten silently. Returns the key.
pub async fn upload_file(client: &Client, bucket: &str, path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let key = object_key_for(path)?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(data))
        .send()
        .await
        .with_context(|| format!("uploading {} to s3://{}/{}", path.display(), bucket, key))?;

    info!(bucket, key = %key, "upload complete");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_the_base_name() {
        let key = object_key_for("tmp/DLTINS_20210117_01of01.csv").unwrap();
        assert_eq!(key, "DLTINS_20210117_01of01.csv");
    }

    #[test]
    fn directory_like_path_has_no_key() {
        assert!(object_key_for("/").is_err());
    }
}
