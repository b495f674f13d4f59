//! Pluggable compression for spill frames.
//!
//! A partition file is written as a sequence of appended spill batches. When
//! compression is enabled every batch is compressed into one self-contained
//! frame before it is appended, so a file is a concatenation of frames and a
//! reader decodes them back-to-back:
//!
//! - **Gzip** via `flate2` (feature: `compression-gzip`), read with a multi-member decoder
//! - **Zstd** via `zstd` (feature: `compression-zstd`), read as a multi-frame stream
//!
//! ```no_run
//! use topn::io::compression::Compression;
//!
//! # fn main() -> anyhow::Result<()> {
//! let codec = Compression::Zstd.codec()?.expect("zstd enabled");
//! let frame = codec.compress_frame(b"example.com,3\n")?;
//! # let _ = frame;
//! # Ok(())
//! # }
//! ```

use anyhow::{Result, bail};
use std::io::Read;

/// Compression codec applied to each spill batch.
///
/// Implementations must be `Send + Sync`: spills for different partitions
/// are compressed concurrently.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Magic byte signature every frame starts with.
    fn magic_bytes(&self) -> &[u8];

    /// Compress one batch into a complete, independently decodable frame.
    fn compress_frame(&self, raw: &[u8]) -> std::io::Result<Vec<u8>>;

    /// Wrap a reader positioned at the first of one or more concatenated frames.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;
}

/// Spill compression selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// The codec for this setting, or `None` for uncompressed spills.
    ///
    /// # Errors
    /// Returns an error if the codec's feature flag is not enabled.
    pub fn codec(self) -> Result<Option<Box<dyn CompressionCodec>>> {
        match self {
            Self::None => Ok(None),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Some(Box::new(GzipCodec))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Ok(Some(Box::new(ZstdCodec))),
            #[allow(unreachable_patterns)]
            other => bail!("{other:?} compression is not enabled in this build"),
        }
    }
}

/// Check that `head` (the first bytes of a non-empty file) starts a frame of `codec`.
///
/// # Errors
/// Returns an error when the signature does not match.
pub fn check_magic(codec: &dyn CompressionCodec, head: &[u8]) -> Result<()> {
    let magic = codec.magic_bytes();
    if head.len() < magic.len() || !head.starts_with(magic) {
        bail!("data does not start with a {} frame", codec.name());
    }
    Ok(())
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x1f, 0x8b]
    }

    fn compress_frame(&self, raw: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(raw)?;
        enc.finish()
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn compress_frame(&self, raw: &[u8]) -> std::io::Result<Vec<u8>> {
        zstd::stream::encode_all(raw, 3)
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }
}
