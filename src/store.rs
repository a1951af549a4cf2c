//! Persistent Variant Store
//!
//! Optional disk-backed cache of compiled program pairs. It only ever saves a
//! trip through the compiler service; registration and linking always happen.
//!
//! # File Layout
//!
//! One file per key, named `<hash>.ffpv` where `hash` is the 128-bit
//! [`VariantKey::persistent_hash`](crate::mask::VariantKey::persistent_hash) in
//! lowercase hex:
//!
//! ```text
//! ┌──────────────────────────── 24-byte header ───────────────────────────┐
//! │ magic "FFPV" │ version u32 │ vertex_len u32 │ fragment_len u32 │ xxh3-64 │
//! └───────────────────────────────────────────────────────────────────────┘
//! vertex blob (vertex_len bytes) ++ fragment blob (fragment_len bytes)
//! ```
//!
//! All integers are little-endian. The checksum covers both blobs. Writes go to
//! a temporary file that is renamed into place, so readers never observe a
//! partial entry. A short, mismatched or corrupt file is reported as a
//! [`StoreError`], which callers treat as a miss.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::backend::{CompiledBlob, CompiledPair, ShaderStage};

const MAGIC: [u8; 4] = *b"FFPV";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = size_of::<StoreHeader>();
const EXTENSION: &str = "ffpv";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    vertex_len: u32,
    fragment_len: u32,
    checksum: u64,
}

/// Reasons a stored entry could not be used.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("entry truncated ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported format version {0}")]
    Version(u32),
    #[error("payload length mismatch")]
    Length,
    #[error("checksum mismatch")]
    Checksum,
    #[error("blob too large to store ({0} bytes)")]
    TooLarge(usize),
}

/// Backing store for compiled program pairs, keyed by a 128-bit hash.
pub trait VariantStore {
    /// Loads the entry for `hash`. `Ok(None)` is an ordinary miss.
    fn try_load(&mut self, hash: u128) -> Result<Option<CompiledPair>, StoreError>;

    fn save(&mut self, hash: u128, blobs: &CompiledPair) -> Result<(), StoreError>;
}

/// [`VariantStore`] keeping one file per entry in a directory.
#[derive(Debug, Clone)]
pub struct DiskVariantStore {
    dir: PathBuf,
}

impl DiskVariantStore {
    /// Opens (and creates, if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::debug!("Persistent variant store at {}", dir.display());
        Ok(Self { dir })
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `hash`.
    #[must_use]
    pub fn entry_path(&self, hash: u128) -> PathBuf {
        self.dir.join(format!("{hash:032x}.{EXTENSION}"))
    }
}

impl VariantStore for DiskVariantStore {
    fn try_load(&mut self, hash: u128) -> Result<Option<CompiledPair>, StoreError> {
        let data = match fs::read(self.entry_path(hash)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(&data).map(Some)
    }

    fn save(&mut self, hash: u128, blobs: &CompiledPair) -> Result<(), StoreError> {
        let data = encode(blobs)?;
        let path = self.entry_path(hash);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, &data)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            // Best-effort cleanup.
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn payload_len(blob: &CompiledBlob) -> Result<u32, StoreError> {
    u32::try_from(blob.len()).map_err(|_| StoreError::TooLarge(blob.len()))
}

fn encode(blobs: &CompiledPair) -> Result<Vec<u8>, StoreError> {
    let mut payload = Vec::with_capacity(blobs.vertex.len() + blobs.fragment.len());
    payload.extend_from_slice(blobs.vertex.bytes());
    payload.extend_from_slice(blobs.fragment.bytes());

    let header = StoreHeader {
        magic: MAGIC,
        version: FORMAT_VERSION.to_le(),
        vertex_len: payload_len(&blobs.vertex)?.to_le(),
        fragment_len: payload_len(&blobs.fragment)?.to_le(),
        checksum: xxh3_64(&payload).to_le(),
    };

    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.extend_from_slice(bytemuck::bytes_of(&header));
    data.extend_from_slice(&payload);
    Ok(data)
}

fn decode(data: &[u8]) -> Result<CompiledPair, StoreError> {
    if data.len() < HEADER_LEN {
        return Err(StoreError::Truncated(data.len()));
    }
    let header: StoreHeader = bytemuck::pod_read_unaligned(&data[..HEADER_LEN]);
    if header.magic != MAGIC {
        return Err(StoreError::BadMagic);
    }
    let version = u32::from_le(header.version);
    if version != FORMAT_VERSION {
        return Err(StoreError::Version(version));
    }

    let vertex_len = u32::from_le(header.vertex_len) as usize;
    let fragment_len = u32::from_le(header.fragment_len) as usize;
    let payload = &data[HEADER_LEN..];
    if payload.len() != vertex_len + fragment_len {
        return Err(StoreError::Length);
    }
    if xxh3_64(payload) != u64::from_le(header.checksum) {
        return Err(StoreError::Checksum);
    }

    let (vertex, fragment) = payload.split_at(vertex_len);
    Ok(CompiledPair {
        vertex: CompiledBlob::new(ShaderStage::Vertex, vertex),
        fragment: CompiledBlob::new(ShaderStage::Fragment, fragment),
    })
}
