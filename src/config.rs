use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

const FIRDS_SELECT_URL: &str =
    "https://registers.esma.europa.eu/solr/esma_registers_firds_files/select";

/// Command-line configuration for one pipeline run.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "FIRDS reference-data ETL: index -> zip -> xml -> csv -> s3", long_about = None)]
pub struct Config {
    /// Full index query URL; overrides the date-range filter when given
    #[arg(long)]
    pub query_url: Option<String>,

    /// Start of the publication-date window (inclusive)
    #[arg(long, default_value = "2021-01-17")]
    pub from: NaiveDate,

    /// End of the publication-date window (inclusive)
    #[arg(long, default_value = "2021-01-19")]
    pub to: NaiveDate,

    /// File-type code to select from the index (e.g. DLTINS, FULINS)
    #[arg(long, default_value = "DLTINS")]
    pub file_type: String,

    /// Destination S3 bucket for the output CSV
    #[arg(long, default_value = "steeleyeassignmentbucket")]
    pub bucket: String,

    /// Working directory for intermediate files; created if absent
    #[arg(long, default_value = "tmp")]
    pub work_dir: PathBuf,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Reproduce the historical CSV column layout (values in extraction
    /// order under the swapped header) instead of the corrected mapping
    #[arg(long)]
    pub legacy_columns: bool,

    /// Log file receiving a copy of all console output
    #[arg(long, default_value = "firdscraper.log")]
    pub log_file: PathBuf,
}

impl Config {
    /// The index query URL: either the explicit override or the FIRDS Solr
    /// select URL with a publication-date range filter built from `from`/`to`.
    pub fn query_url(&self) -> String {
        if let Some(url) = &self.query_url {
            return url.clone();
        }
        format!(
            "{}?q=*&fq=publication_date:%5B{}T00:00:00Z+TO+{}T23:59:59Z%5D&wt=xml&indent=true&start=0&rows=100",
            FIRDS_SELECT_URL,
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d"),
        )
    }
}
