//! On-disk format for [`VectorIndex`].
//!
//! One little-endian file:
//!
//! ```text
//! "DVIX" | version u16 | metric u8 | reserved u8 | dimensions u32 | entries u64
//! | model name len u16 | model name | entries * dimensions f32
//! | chunks len u64 | bincode(Vec<Chunk>) | sha256(everything above)
//! ```
//!
//! Saves go to a temporary sibling that is fsynced and renamed over the
//! target, so readers see either the old artifact or the complete new one.
//! Loads check magic, version, digest, metric and every length before
//! decoding anything.

use bincode::Options;
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Number;
use crate::error::{Error, Result};
use crate::index::{Metric, VectorIndex};
use crate::vector_entry::Chunk;

const MAGIC: &[u8; 4] = b"DVIX";
pub const FORMAT_VERSION: u16 = 1;
const DIGEST_LEN: usize = 32;
// magic + version + metric + reserved + dimensions + entries + model len + chunks len
const MIN_BODY_LEN: usize = 4 + 2 + 1 + 1 + 4 + 8 + 2 + 8;

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

pub fn save_index(index: &VectorIndex, path: &Path) -> Result<()> {
    let bytes = encode(index)?;
    write_atomically(path, &bytes)?;
    log::info!(
        "Saved index with {} entries ({} bytes) to '{}'",
        index.len(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

pub fn load_index(path: &Path) -> Result<VectorIndex> {
    if !path.exists() {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| Error::corrupt(path, e.to_string()))?;
    let len = file
        .metadata()
        .map_err(|e| Error::corrupt(path, e.to_string()))?
        .len();
    if !file_len_plausible(len) {
        return Err(Error::corrupt(path, format!("file too small ({} bytes)", len)));
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::corrupt(path, e.to_string()))?;
    let index = decode(&mmap).map_err(|reason| Error::corrupt(path, reason))?;

    log::info!(
        "Loaded index with {} entries of dimension {} from '{}'",
        index.len(),
        index.dimensions(),
        path.display()
    );
    Ok(index)
}

fn file_len_plausible(len: u64) -> bool {
    len >= (MIN_BODY_LEN + DIGEST_LEN) as u64
}

fn encode(index: &VectorIndex) -> Result<Vec<u8>> {
    let model = index.embedder_model().unwrap_or("").as_bytes();
    let model_len = u16::try_from(model.len())
        .map_err(|_| Error::Config(format!("embedder model name too long ({} bytes)", model.len())))?;
    let dimensions = u32::try_from(index.dimensions())
        .map_err(|_| Error::Config(format!("dimension {} too large", index.dimensions())))?;
    let chunks = codec()
        .serialize(index.chunks())
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    let vectors = index.raw_vectors();
    let mut buf = Vec::with_capacity(
        MIN_BODY_LEN + model.len() + vectors.len() * std::mem::size_of::<Number>() + chunks.len() + DIGEST_LEN,
    );
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.push(index.metric().code());
    buf.push(0);
    buf.extend_from_slice(&dimensions.to_le_bytes());
    buf.extend_from_slice(&(index.len() as u64).to_le_bytes());
    buf.extend_from_slice(&model_len.to_le_bytes());
    buf.extend_from_slice(model);
    buf.extend(vectors.iter().flat_map(|&num| num.to_le_bytes()));
    buf.extend_from_slice(&(chunks.len() as u64).to_le_bytes());
    buf.extend_from_slice(&chunks);

    let digest = Sha256::digest(&buf);
    buf.extend_from_slice(&digest);
    Ok(buf)
}

fn decode(bytes: &[u8]) -> std::result::Result<VectorIndex, String> {
    if !bytes.starts_with(MAGIC) {
        return Err("not a docvec index (bad magic)".to_string());
    }
    if bytes.len() < MIN_BODY_LEN + DIGEST_LEN {
        return Err("truncated header".to_string());
    }

    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let mut reader = Reader::new(body);
    reader.take(MAGIC.len())?;

    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        ));
    }

    if Sha256::digest(body).as_slice() != digest {
        return Err("checksum mismatch".to_string());
    }

    let metric_code = reader.u8()?;
    let metric = Metric::from_code(metric_code)
        .ok_or_else(|| format!("unknown similarity metric {}", metric_code))?;
    reader.u8()?;

    let dimensions = reader.u32()? as usize;
    let entries = usize::try_from(reader.u64()?).map_err(|_| "entry count overflow".to_string())?;

    let model_len = reader.u16()? as usize;
    let model = std::str::from_utf8(reader.take(model_len)?)
        .map_err(|e| format!("invalid model name: {}", e))?;
    let embedder_model = (!model.is_empty()).then(|| model.to_string());

    let vector_bytes = entries
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(std::mem::size_of::<Number>()))
        .ok_or_else(|| "vector section size overflow".to_string())?;
    let vectors: Vec<Number> = reader
        .take(vector_bytes)?
        .chunks_exact(std::mem::size_of::<Number>())
        .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if let Some(pos) = vectors.iter().position(|x| !x.is_finite()) {
        return Err(format!(
            "non-finite component in vector {}",
            pos / dimensions.max(1)
        ));
    }

    let chunks_len = usize::try_from(reader.u64()?).map_err(|_| "chunk section overflow".to_string())?;
    let chunk_bytes = reader.take(chunks_len)?;
    let chunks: Vec<Chunk> = codec()
        .with_limit(chunks_len as u64)
        .deserialize(chunk_bytes)
        .map_err(|e| format!("invalid chunk section: {}", e))?;

    if chunks.len() != entries {
        return Err(format!(
            "header declares {} entries but chunk section holds {}",
            entries,
            chunks.len()
        ));
    }
    if reader.remaining() != 0 {
        return Err(format!("{} trailing bytes", reader.remaining()));
    }

    Ok(VectorIndex::from_parts(dimensions, metric, embedder_model, vectors, chunks))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        if n > self.remaining() {
            return Err(format!(
                "truncated: wanted {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> std::result::Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> std::result::Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> std::result::Result<u64, String> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("index path '{}' has no file name", path.display())))?;
    Ok(path.with_file_name(format!(
        ".{}.tmp-{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path)?;
    let result = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp_path, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
