use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use zstd::stream::write::Encoder;

use crate::error::{CollectError, Result};
use crate::paginator::Record;

/// Year encoded at bytes 4..8 of a record's `id`, e.g. `CVE-2019-0001` → 2019.
///
/// Only reads the record; the payload written afterwards is untouched.
pub fn partition_key(record: &Record) -> Result<u16> {
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .ok_or(CollectError::MissingId)?;
    let year = id
        .get(4..8)
        .ok_or_else(|| CollectError::MalformedId(id.to_string()))?;
    if !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CollectError::InvalidYear(id.to_string()));
    }
    year.parse()
        .map_err(|_| CollectError::InvalidYear(id.to_string()))
}

pub fn partition_path(dir: &Path, year: u16) -> PathBuf {
    dir.join(format!("{year}.jsonl.zst"))
}

struct PartitionWriter {
    path: PathBuf,
    encoder: Encoder<'static, BufWriter<File>>,
    records: u64,
}

/// Outcome of closing one partition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub year: u16,
    pub path: PathBuf,
    pub records: u64,
}

/// Routes records into one zstd-compressed JSONL file per year.
///
/// A file is opened the first time its year shows up and stays open until
/// [`PartitionSink::close_all`].
pub struct PartitionSink {
    dir: PathBuf,
    level: i32,
    writers: BTreeMap<u16, PartitionWriter>,
}

impl PartitionSink {
    /// Create the sink, creating `dir` if it does not exist yet.
    pub fn create(dir: impl Into<PathBuf>, level: i32) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CollectError::io(&dir, "creating output directory", e))?;
        Ok(Self {
            dir,
            level,
            writers: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Years with an open stream, ascending.
    pub fn partitions(&self) -> impl Iterator<Item = u16> + '_ {
        self.writers.keys().copied()
    }

    /// Append `record` as one JSON line to its year's stream.
    pub fn ingest(&mut self, record: &Record) -> Result<()> {
        let year = partition_key(record)?;
        let writer = match self.writers.entry(year) {
            std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::btree_map::Entry::Vacant(entry) => {
                let writer = open_partition(&self.dir, year, self.level)?;
                tracing::info!(year, path = %writer.path.display(), "opened partition");
                entry.insert(writer)
            }
        };

        serde_json::to_writer(&mut writer.encoder, record).map_err(|e| {
            if e.is_io() {
                CollectError::io(&writer.path, "writing", e.into())
            } else {
                CollectError::Encode(e)
            }
        })?;
        writer
            .encoder
            .write_all(b"\n")
            .map_err(|e| CollectError::io(&writer.path, "writing", e))?;
        writer.records += 1;
        Ok(())
    }

    /// Finish every zstd frame and flush every file.
    ///
    /// Keeps going past individual failures so each stream gets its chance to
    /// close, then reports the first error.
    pub fn close_all(self) -> Result<Vec<PartitionSummary>> {
        let mut summaries = Vec::with_capacity(self.writers.len());
        let mut first_error = None;

        for (year, writer) in self.writers {
            match close_partition(writer.encoder, &writer.path) {
                Ok(()) => {
                    tracing::info!(year, records = writer.records, path = %writer.path.display(), "closed partition");
                    summaries.push(PartitionSummary {
                        year,
                        path: writer.path,
                        records: writer.records,
                    });
                }
                Err(err) => {
                    tracing::error!(year, error = %err, "failed to close partition");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summaries),
        }
    }
}

fn open_partition(dir: &Path, year: u16, level: i32) -> Result<PartitionWriter> {
    let path = partition_path(dir, year);
    let file = File::create(&path).map_err(|e| CollectError::io(&path, "creating", e))?;
    let encoder = Encoder::new(BufWriter::new(file), level)
        .map_err(|e| CollectError::io(&path, "starting zstd stream for", e))?;
    Ok(PartitionWriter {
        path,
        encoder,
        records: 0,
    })
}

fn close_partition(encoder: Encoder<'static, BufWriter<File>>, path: &Path) -> Result<()> {
    let mut file = encoder
        .finish()
        .map_err(|e| CollectError::io(path, "finishing zstd stream for", e))?;
    file.flush()
        .map_err(|e| CollectError::io(path, "flushing", e))
}
