//! Dataset download
//!
//! Fetches the published files over HTTP(S), streaming the body to disk,
//! retrying transfer failures with a linear backoff. `.gz` files are
//! decompressed next to the download. The result must start with a UTF-8
//! line before anything downstream touches it.

use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{IngestError, Result};

/// Files published alongside the portability export.
pub const KNOWN_FILES: [&str; 4] = [
    "operadoras_rn1.sql",
    "operadoras_stfc.sql",
    "faixa_operadora.sql",
    "export_full_mysql.csv.gz",
];

/// Bytes inspected when checking that a file starts with a UTF-8 line.
const UTF8_HEAD_BYTES: u64 = 64 * 1024;

pub struct Downloader {
    client: Client,
    config: FetchConfig,
}

impl Downloader {
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("numport/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Download `filename` into the download directory and return the path of
    /// the usable file (decompressed if it was gzipped).
    pub async fn fetch(&self, filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.download_dir).await?;
        let target = self.config.download_dir.join(filename);
        let url = self.config.url_for(filename);

        info!(%url, target = %target.display(), "Downloading");
        let bytes = self.download_with_retry(&url, &target).await?;
        info!(file = filename, bytes, "Download complete");

        let usable = if filename.ends_with(".gz") {
            let output = target.with_extension("");
            gunzip(&target, &output).await?;
            output
        } else {
            target
        };

        validate_utf8_first_line(&usable).await?;
        Ok(usable)
    }

    async fn download_with_retry(&self, url: &str, target: &Path) -> Result<u64> {
        let mut attempt = 1u32;
        loop {
            match self.download_to(url, target).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.config.max_retries => {
                    let backoff = self.config.retry_delay_secs * u64::from(attempt);
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        backoff_secs = backoff,
                        error = %e,
                        "Download attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream one response body into `<target>.part`, then rename.
    async fn download_to(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let partial = partial_path(target);
        let mut writer = BufWriter::new(File::create(&partial).await?);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        drop(writer);

        fs::rename(&partial, target).await?;
        debug!(bytes = written, "Response body written");
        Ok(written)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Decompress a gzip file without holding it in memory.
pub async fn gunzip(input: &Path, output: &Path) -> Result<u64> {
    let input = input.to_path_buf();
    let output = output.to_path_buf();

    let bytes = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
        let mut decoder = GzDecoder::new(std::io::BufReader::new(std::fs::File::open(&input)?));
        let mut out = std::io::BufWriter::new(std::fs::File::create(&output)?);
        let bytes = std::io::copy(&mut decoder, &mut out)?;
        std::io::Write::flush(&mut out)?;
        Ok(bytes)
    })
    .await
    .map_err(|e| IngestError::Decompression(e.to_string()))?
    .map_err(|e| IngestError::Decompression(e.to_string()))?;

    info!(bytes, "Decompressed");
    Ok(bytes)
}

/// The first line (or the first 64 KiB when lines are longer) must be UTF-8.
pub async fn validate_utf8_first_line(path: &Path) -> Result<()> {
    let mut head = Vec::new();
    File::open(path)
        .await?
        .take(UTF8_HEAD_BYTES)
        .read_to_end(&mut head)
        .await?;

    let first_line = match head.iter().position(|&b| b == b'\n') {
        Some(end) => &head[..end],
        None => trim_partial_char(&head),
    };

    std::str::from_utf8(first_line).map_err(|e| {
        IngestError::Encoding(format!("{} is not UTF-8: {}", path.display(), e))
    })?;
    Ok(())
}

/// Drop a multi-byte sequence cut off by the read limit.
fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        _ => bytes,
    }
}
