use anyhow::{Context, Result};
use clap::Parser;
use firdscraper::{
    config::Config,
    extract, fetch,
    tabular::{self, ColumnOrder},
    upload,
};
use std::{fs, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::parse();

    // Console plus log-file sinks, configured once at startup.
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.log_file)
        .with_context(|| format!("opening log file {}", cfg.log_file.display()))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    info!("startup");

    fs::create_dir_all(&cfg.work_dir)
        .with_context(|| format!("creating work dir {}", cfg.work_dir.display()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .context("building HTTP client")?;

    let query_url = cfg.query_url();
    info!(url = %query_url, "fetching index");
    let index_path = fetch::index::download_index(&client, &query_url, &cfg.work_dir).await?;
    info!(index = %index_path.display(), "index downloaded");

    let link = fetch::archive::resolve_download_link(&index_path, &cfg.file_type)?;
    info!(link = %link, file_type = %cfg.file_type, "download link selected");

    let zip_path = fetch::archive::download_archive(&client, &link, &cfg.work_dir).await?;
    let xml_path = fetch::archive::extract_archive(&zip_path)?;
    info!(payload = %xml_path.display(), "archive extracted");

    let records = extract::parse_instruments(&xml_path)?;
    info!(records = records.len(), "instrument records extracted");

    let order = if cfg.legacy_columns {
        ColumnOrder::Legacy
    } else {
        ColumnOrder::Fixed
    };
    let csv_path = tabular::write_csv(&records, &xml_path, order)?;

    let s3 = upload::make_s3_client().await;
    let key = upload::upload_file(&s3, &cfg.bucket, &csv_path).await?;
    info!(bucket = %cfg.bucket, key = %key, "finished processing");

    Ok(())
}
