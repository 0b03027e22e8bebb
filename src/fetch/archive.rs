use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

/// One `<doc>` entry from the index: its download link and file-type code.
#[derive(Debug, PartialEq, Eq)]
struct IndexEntry {
    download_link: String,
    file_type: String,
}

/// Parse the index document and return the download link of the first entry
/// (in document order) whose file-type code equals `file_type` exactly.
///
/// Fields are paired per `<doc>` parent, so their order inside a doc does not
/// matter. Docs missing either field are skipped.
pub fn resolve_download_link(index_path: impl AsRef<Path>, file_type: &str) -> Result<String> {
    let index_path = index_path.as_ref();
    let entries = collect_entries(index_path)
        .with_context(|| format!("parsing index {}", index_path.display()))?;

    if entries.is_empty() {
        bail!("index {} lists no download entries", index_path.display());
    }

    entries
        .into_iter()
        .find(|e| e.file_type == file_type)
        .map(|e| e.download_link)
        .ok_or_else(|| {
            anyhow!(
                "index {} has no entry of file type {}",
                index_path.display(),
                file_type
            )
        })
}

/// Which named field a just-opened element carries, if any.
enum Pending {
    Link,
    FileType,
}

fn named_field(e: &BytesStart) -> Option<Pending> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"name" {
            return match attr.unescape_value().ok()?.as_ref() {
                "download_link" => Some(Pending::Link),
                "file_type" => Some(Pending::FileType),
                _ => None,
            };
        }
    }
    None
}

fn collect_entries(index_path: &Path) -> Result<Vec<IndexEntry>> {
    let file = File::open(index_path)
        .with_context(|| format!("opening {}", index_path.display()))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut in_doc = false;
    let mut link: Option<String> = None;
    let mut ftype: Option<String> = None;
    let mut pending: Option<Pending> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"doc" {
                    in_doc = true;
                    link = None;
                    ftype = None;
                } else if in_doc {
                    pending = named_field(&e);
                }
            }
            Event::Text(e) => {
                if let Some(field) = pending.take() {
                    let text = e.unescape()?.to_string();
                    match field {
                        Pending::Link => link = Some(text),
                        Pending::FileType => ftype = Some(text),
                    }
                }
            }
            Event::End(e) => {
                pending = None;
                if e.local_name().as_ref() == b"doc" {
                    in_doc = false;
                    if let (Some(download_link), Some(file_type)) = (link.take(), ftype.take()) {
                        entries.push(IndexEntry {
                            download_link,
                            file_type,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(count = entries.len(), "collected index entries");
    Ok(entries)
}

/// Download the archive at `url_str` and save it under `work_dir` using the
/// last path segment of the URL as the filename. Returns the saved path.
pub async fn download_archive(
    client: &Client,
    url_str: &str,
    work_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("parsing download link {}", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = work_dir.as_ref().join(filename);

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("downloading archive {}", url))?;
    let bytes = resp.bytes().await.context("reading archive body")?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("saving archive to {}", dest_path.display()))?;

    info!(archive = %dest_path.display(), bytes = bytes.len(), "archive downloaded");
    Ok(dest_path)
}

/// Extract every entry of the archive into the archive's directory and return
/// the path of the contained XML payload, expected to share the archive's stem.
pub fn extract_archive(zip_path: impl AsRef<Path>) -> Result<PathBuf> {
    let zip_path = zip_path.as_ref();
    let dest_dir = zip_path.parent().unwrap_or_else(|| Path::new("."));

    let file =
        File::open(zip_path).with_context(|| format!("opening {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("reading {} as a zip archive", zip_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        // Entries are flattened into the work dir; the payload zips hold a
        // single top-level file.
        let name = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
            .ok_or_else(|| anyhow!("archive entry {} has an unusable name", i))?;
        let out_path = dest_dir.join(name);
        let mut out = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {}", out_path.display()))?;
        debug!(entry = %out_path.display(), "extracted");
    }

    let payload = zip_path.with_extension("xml");
    if !payload.is_file() {
        bail!(
            "archive {} did not contain expected payload {}",
            zip_path.display(),
            payload.display()
        );
    }
    Ok(payload)
}
