//! Chunk splitter
//!
//! Streams the source export into `chunk_NNNN.csv` files of at most
//! `chunk_size` lines each. The input is read line by line as raw bytes, so
//! files far larger than memory are fine and encoding problems are left for
//! the loaders to count. Line endings are normalised to `\n`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{IngestError, Result};

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Number of chunks needed for `total_lines`, rounding up.
pub fn chunk_count(total_lines: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_lines.div_ceil(chunk_size)
}

pub fn chunk_file_name(index: u64) -> String {
    format!("chunk_{:04}.csv", index)
}

/// Inverse of [`chunk_file_name`].
pub fn parse_chunk_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("chunk_")?
        .strip_suffix(".csv")?
        .parse()
        .ok()
}

/// Line and chunk totals for one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub total_lines: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(total_lines: u64, chunk_size: u64) -> Self {
        Self {
            total_lines,
            total_chunks: chunk_count(total_lines, chunk_size),
            chunk_size,
        }
    }

    /// Expected line count of a 1-based chunk; the last one may be short.
    pub fn lines_in_chunk(&self, index: u64) -> u64 {
        if index == 0 || index > self.total_chunks {
            return 0;
        }
        let before = (index - 1) * self.chunk_size;
        (self.total_lines - before).min(self.chunk_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChunkFile {
    pub index: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    chunk_dir: PathBuf,
    chunk_size: u64,
}

impl ChunkSplitter {
    pub fn new(chunk_dir: impl Into<PathBuf>, chunk_size: u64) -> Self {
        Self {
            chunk_dir: chunk_dir.into(),
            chunk_size,
        }
    }

    pub fn chunk_dir(&self) -> &Path {
        &self.chunk_dir
    }

    pub fn chunk_path(&self, index: u64) -> PathBuf {
        self.chunk_dir.join(chunk_file_name(index))
    }

    /// Count lines without holding the file in memory. A final line without a
    /// trailing newline still counts.
    pub async fn count_lines(&self, source: &Path) -> Result<u64> {
        let mut file = open_source(source).await?;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut lines = 0u64;
        let mut last_byte = None;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
            last_byte = Some(buf[n - 1]);
        }

        if matches!(last_byte, Some(b) if b != b'\n') {
            lines += 1;
        }

        Ok(lines)
    }

    pub async fn plan(&self, source: &Path) -> Result<ChunkPlan> {
        let total_lines = self.count_lines(source).await?;
        Ok(ChunkPlan::new(total_lines, self.chunk_size))
    }

    /// Plan and write chunks `first_chunk..` of `source`.
    pub async fn split(
        &self,
        source: &Path,
        first_chunk: u64,
        cancel: &CancellationToken,
    ) -> Result<(ChunkPlan, Vec<ChunkFile>)> {
        let plan = self.plan(source).await?;
        let written = self.write_chunks(source, &plan, first_chunk, cancel).await?;
        Ok((plan, written))
    }

    /// Write chunks `first_chunk..` of an already planned source. Earlier
    /// chunks are counted but not materialised, since a resumed run has
    /// already applied them.
    ///
    /// Existing chunk files with the same index are overwritten. Cancellation
    /// is honoured at chunk boundaries.
    pub async fn write_chunks(
        &self,
        source: &Path,
        plan: &ChunkPlan,
        first_chunk: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkFile>> {
        info!(
            source = %source.display(),
            total_lines = plan.total_lines,
            total_chunks = plan.total_chunks,
            chunk_size = self.chunk_size,
            first_chunk,
            "Splitting source into chunks"
        );

        fs::create_dir_all(&self.chunk_dir).await?;

        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, open_source(source).await?);
        let mut line = Vec::with_capacity(512);
        let mut line_no = 0u64;
        let mut current: Option<(u64, BufWriter<File>)> = None;
        let mut written = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }

            let index = line_no / self.chunk_size + 1;
            line_no += 1;

            if index < first_chunk {
                continue;
            }

            let needs_new = current.as_ref().map(|(i, _)| *i != index).unwrap_or(true);
            if needs_new {
                if let Some((done, writer)) = current.take() {
                    close_chunk(writer).await?;
                    debug!(chunk = done, "Chunk file written");
                }
                if cancel.is_cancelled() {
                    return Err(IngestError::Cancelled);
                }

                let path = self.chunk_path(index);
                let file = File::create(&path).await?;
                written.push(ChunkFile {
                    index,
                    path,
                });
                current = Some((index, BufWriter::new(file)));
            }

            if let Some((_, writer)) = current.as_mut() {
                writer.write_all(strip_line_ending(&line)).await?;
                writer.write_all(b"\n").await?;
            }
        }

        if let Some((done, writer)) = current.take() {
            close_chunk(writer).await?;
            debug!(chunk = done, "Chunk file written");
        }

        info!(chunks_written = written.len(), "Split complete");
        Ok(written)
    }

    /// Chunk files currently on disk, ordered by index.
    pub async fn existing_chunks(&self) -> Result<Vec<ChunkFile>> {
        let mut entries = match fs::read_dir(&self.chunk_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_chunk_index) {
                chunks.push(ChunkFile {
                    index,
                    path: entry.path(),
                });
            }
        }
        chunks.sort();
        Ok(chunks)
    }

    /// Delete one loaded chunk. Missing files are not an error.
    pub async fn remove_chunk(&self, chunk: &ChunkFile) -> Result<()> {
        match fs::remove_file(&chunk.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the whole chunk directory. Returns how many chunk files it held.
    pub async fn remove_all(&self) -> Result<usize> {
        let count = self.existing_chunks().await?.len();
        match fs::remove_dir_all(&self.chunk_dir).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

async fn open_source(source: &Path) -> Result<File> {
    match File::open(source).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(IngestError::SourceNotFound(source.to_path_buf()))
        },
        Err(e) => Err(e.into()),
    }
}

async fn close_chunk(mut writer: BufWriter<File>) -> Result<()> {
    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(())
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
