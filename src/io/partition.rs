//! Partition files: the spilled, on-disk side of a partition.
//!
//! A partition file holds zero or more appended spill batches of count
//! records. The same item may appear once per batch; readers sum them.
//!
//! # Record formats
//! - [`RecordFormat::Text`]: `item,count` lines. Decoding splits on the
//!   **last** comma, so items may themselves contain commas. Items can never
//!   contain a `\n` (they come from a line-delimited input) and encoding one
//!   that does is rejected. Any other byte, `\r` included, is kept as is.
//! - [`RecordFormat::Binary`] (feature `spilling`): self-delimiting `postcard`
//!   records appended back-to-back.
//!
//! Either format may be wrapped per batch by a [`Compression`] codec.

use crate::io::compression::{Compression, check_magic};
#[cfg(feature = "spilling")]
use crate::record::UrlCount;
use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fs::{File, OpenOptions, remove_file};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// File name prefix of every partition file in a work directory.
pub const PARTITION_FILE_PREFIX: &str = "mrtmp-";

/// Path of partition `id`'s file inside `dir`.
#[must_use]
pub fn partition_file_name(dir: impl AsRef<Path>, id: usize) -> PathBuf {
    dir.as_ref().join(format!("{PARTITION_FILE_PREFIX}{id}"))
}

/// Encoding of count records inside a spill batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordFormat {
    #[default]
    Text,
    Binary,
}

/// How spill batches are encoded on disk: record format plus compression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpillCodec {
    pub format: RecordFormat,
    pub compression: Compression,
}

impl SpillCodec {
    #[must_use]
    pub const fn new(format: RecordFormat, compression: Compression) -> Self {
        Self {
            format,
            compression,
        }
    }

    /// Encode one batch of `(item, count)` records, compressed if configured.
    ///
    /// # Errors
    /// Returns an error if a text item contains a newline, a record fails
    /// to serialize, or the configured codec is unavailable.
    pub fn encode_batch<'a, I>(&self, records: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut raw = Vec::new();
        match self.format {
            RecordFormat::Text => {
                for (item, count) in records {
                    if item.contains('\n') {
                        bail!("item {item:?} contains a newline and cannot be spilled as text");
                    }
                    writeln!(raw, "{item},{count}")?;
                }
            }
            RecordFormat::Binary => encode_binary(records, &mut raw)?,
        }
        match self.compression.codec()? {
            Some(codec) => codec
                .compress_frame(&raw)
                .with_context(|| format!("{} compress spill batch", codec.name())),
            None => Ok(raw),
        }
    }

    /// Decode every batch in `bytes` (a whole partition file), adding each
    /// record's count to `counts`. Returns the number of records decoded.
    ///
    /// # Errors
    /// Returns an error on malformed or truncated records, which indicate a
    /// corrupted partition file.
    pub fn decode_into(&self, bytes: Vec<u8>, counts: &mut HashMap<String, u64>) -> Result<u64> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let raw = match self.compression.codec()? {
            Some(codec) => {
                check_magic(codec.as_ref(), &bytes)?;
                let mut rdr = codec.wrap_reader_dyn(Box::new(Cursor::new(bytes)))?;
                let mut out = Vec::new();
                rdr.read_to_end(&mut out)
                    .with_context(|| format!("{} decompress spill batches", codec.name()))?;
                out
            }
            None => bytes,
        };
        match self.format {
            RecordFormat::Text => decode_text(&raw, counts),
            RecordFormat::Binary => decode_binary(&raw, counts),
        }
    }
}

fn decode_text(raw: &[u8], counts: &mut HashMap<String, u64>) -> Result<u64> {
    let mut n = 0u64;
    for (i, line) in raw.split(|&b| b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let line = std::str::from_utf8(line)
            .with_context(|| format!("record {}: not valid UTF-8", i + 1))?;
        let Some((item, count)) = line.rsplit_once(',') else {
            bail!("record {}: missing ',' separator in {line:?}", i + 1);
        };
        let count: u64 = count
            .parse()
            .with_context(|| format!("record {}: bad count in {line:?}", i + 1))?;
        add_count(counts, item, count, i + 1)?;
        n += 1;
    }
    Ok(n)
}

fn add_count(counts: &mut HashMap<String, u64>, item: &str, count: u64, record: usize) -> Result<()> {
    if count == 0 {
        bail!("record {record}: zero count for {item:?}");
    }
    match counts.get_mut(item) {
        Some(total) => *total += count,
        None => {
            counts.insert(item.to_owned(), count);
        }
    }
    Ok(())
}

/// Wire form of a binary record; decodes as a [`UrlCount`].
#[cfg(feature = "spilling")]
#[derive(serde::Serialize)]
struct RecordRef<'a> {
    url: &'a str,
    count: u64,
}

#[cfg(feature = "spilling")]
fn encode_binary<'a, I>(records: I, raw: &mut Vec<u8>) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    for (item, count) in records {
        let bytes = postcard::to_allocvec(&RecordRef { url: item, count })
            .with_context(|| format!("encode record for {item:?}"))?;
        raw.extend_from_slice(&bytes);
    }
    Ok(())
}

#[cfg(feature = "spilling")]
fn decode_binary(raw: &[u8], counts: &mut HashMap<String, u64>) -> Result<u64> {
    let mut rest = raw;
    let mut n = 0u64;
    while !rest.is_empty() {
        let (record, tail): (UrlCount, &[u8]) = postcard::take_from_bytes(rest)
            .map_err(|e| anyhow::anyhow!("record {}: truncated or corrupt ({e})", n + 1))?;
        add_count(counts, &record.url, record.count, n as usize + 1)?;
        rest = tail;
        n += 1;
    }
    Ok(n)
}

#[cfg(not(feature = "spilling"))]
fn encode_binary<'a, I>(_records: I, _raw: &mut Vec<u8>) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    bail!("binary spill records need the `spilling` feature")
}

#[cfg(not(feature = "spilling"))]
fn decode_binary(_raw: &[u8], _counts: &mut HashMap<String, u64>) -> Result<u64> {
    bail!("binary spill records need the `spilling` feature")
}

/// One partition's file, exclusively owned by that partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionFile {
    id: usize,
    path: PathBuf,
}

impl PartitionFile {
    /// Handle for partition `id` in `dir` without touching the file system.
    #[must_use]
    pub fn at(dir: impl AsRef<Path>, id: usize) -> Self {
        Self {
            id,
            path: partition_file_name(dir, id),
        }
    }

    /// Create (or truncate) partition `id`'s file in `dir`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create(dir: impl AsRef<Path>, id: usize) -> Result<Self> {
        let pf = Self::at(dir, id);
        File::create(&pf.path).with_context(|| format!("create {}", pf.path.display()))?;
        Ok(pf)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `table` as one spill batch. Returns the number of records written.
    ///
    /// # Errors
    /// Returns an error if the batch cannot be encoded or the file cannot be
    /// opened for append or written.
    pub fn append(&self, codec: &SpillCodec, table: &HashMap<String, u64>) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }
        let batch = codec
            .encode_batch(table.iter().map(|(k, v)| (k.as_str(), *v)))
            .with_context(|| format!("encode spill for {}", self.path.display()))?;
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {} for append", self.path.display()))?;
        f.write_all(&batch)
            .with_context(|| format!("append spill to {}", self.path.display()))?;
        f.flush()?;
        Ok(table.len())
    }

    /// Read every batch and sum counts per item.
    ///
    /// Returns the rebuilt frequency table and the number of records read.
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable, or holds a
    /// malformed record.
    pub fn read_counts(&self, codec: &SpillCodec) -> Result<(HashMap<String, u64>, u64)> {
        let bytes =
            std::fs::read(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let mut counts = HashMap::new();
        let records = codec
            .decode_into(bytes, &mut counts)
            .with_context(|| format!("corrupt partition file {}", self.path.display()))?;
        Ok((counts, records))
    }

    /// Delete the file once its contents have been fully consumed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be removed.
    pub fn remove(self) -> Result<()> {
        remove_file(&self.path).with_context(|| format!("remove {}", self.path.display()))
    }
}
