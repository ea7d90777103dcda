//! Structure stores: where region snapshots live between capture and restore.
//!
//! Callers only hold opaque [`StructureToken`]s. Two backends:
//! ```text
//! MemoryStructureStore      - snapshots kept as-is
//! CompressedStructureStore  - CBOR + zstd bytes with a SHA-256 digest per entry
//! ```

use crate::snapshot::{CaptureOptions, RegionSnapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use voxedit_common::{BlockPos, Region};
use voxedit_kernel::{World, WorldError};

/// Opaque handle to a stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureToken(pub u64);

impl std::fmt::Display for StructureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "history_{:x}", self.0)
    }
}

/// Errors from structure store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("unknown structure {0}")]
    UnknownToken(StructureToken),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("integrity check failed for {token}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        token: StructureToken,
        expected: String,
        actual: String,
    },
}

/// Saves and restores region snapshots by token.
pub trait StructureStore {
    /// Capture `region` from `world` and keep it under a fresh token.
    fn save(
        &mut self,
        world: &World,
        region: &Region,
        options: CaptureOptions,
    ) -> Result<StructureToken, StoreError>;

    /// Read back and check a stored snapshot without touching any world.
    fn fetch(&self, token: StructureToken) -> Result<RegionSnapshot, StoreError>;

    /// Restore the snapshot with its origin placed at `at`.
    fn load(
        &self,
        token: StructureToken,
        world: &mut World,
        at: BlockPos,
    ) -> Result<(), StoreError> {
        self.fetch(token)?.restore(world, at)?;
        Ok(())
    }

    /// Absolute bounds of the stored region at its captured origin.
    fn bounds(&self, token: StructureToken) -> Option<(BlockPos, BlockPos)>;

    /// Release a snapshot. Returns whether it existed.
    fn delete(&mut self, token: StructureToken) -> bool;

    /// Number of snapshots held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store keeping snapshots uncompressed.
#[derive(Debug, Default)]
pub struct MemoryStructureStore {
    next: u64,
    snapshots: HashMap<StructureToken, RegionSnapshot>,
}

impl MemoryStructureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: StructureToken) -> Option<&RegionSnapshot> {
        self.snapshots.get(&token)
    }
}

impl StructureStore for MemoryStructureStore {
    fn save(
        &mut self,
        world: &World,
        region: &Region,
        options: CaptureOptions,
    ) -> Result<StructureToken, StoreError> {
        let snap = RegionSnapshot::capture(world, region, options)?;
        let token = StructureToken(self.next);
        self.next += 1;
        self.snapshots.insert(token, snap);
        Ok(token)
    }

    fn fetch(&self, token: StructureToken) -> Result<RegionSnapshot, StoreError> {
        self.get(token)
            .cloned()
            .ok_or(StoreError::UnknownToken(token))
    }

    fn bounds(&self, token: StructureToken) -> Option<(BlockPos, BlockPos)> {
        self.snapshots.get(&token).and_then(RegionSnapshot::bounds)
    }

    fn delete(&mut self, token: StructureToken) -> bool {
        self.snapshots.remove(&token).is_some()
    }

    fn len(&self) -> usize {
        self.snapshots.len()
    }
}

#[derive(Debug)]
struct CompressedEntry {
    bytes: Vec<u8>,
    sha256: String,
    bounds: Option<(BlockPos, BlockPos)>,
}

/// Store keeping snapshots as zstd-compressed CBOR.
///
/// Every entry carries the SHA-256 of its compressed bytes; a load whose
/// bytes no longer match fails closed instead of restoring garbage.
#[derive(Debug)]
pub struct CompressedStructureStore {
    level: i32,
    next: u64,
    entries: HashMap<StructureToken, CompressedEntry>,
}

impl Default for CompressedStructureStore {
    fn default() -> Self {
        Self::new(3)
    }
}

impl CompressedStructureStore {
    /// Create a store using the given zstd compression level.
    pub fn new(level: i32) -> Self {
        Self {
            level,
            next: 0,
            entries: HashMap::new(),
        }
    }

    /// Total compressed bytes held.
    pub fn stored_bytes(&self) -> usize {
        self.entries.values().map(|e| e.bytes.len()).sum()
    }

    fn decode(&self, token: StructureToken) -> Result<RegionSnapshot, StoreError> {
        let entry = self
            .entries
            .get(&token)
            .ok_or(StoreError::UnknownToken(token))?;
        let actual = sha256_hex(&entry.bytes);
        if actual != entry.sha256 {
            return Err(StoreError::IntegrityMismatch {
                token,
                expected: entry.sha256.clone(),
                actual,
            });
        }
        let cbor_bytes = zstd_decompress(&entry.bytes)?;
        let snap: RegionSnapshot = cbor_deserialize(&cbor_bytes)?;
        if !snap.verify() {
            return Err(StoreError::IntegrityMismatch {
                token,
                expected: "valid snapshot hash".into(),
                actual: "snapshot hash mismatch".into(),
            });
        }
        Ok(snap)
    }

    #[cfg(test)]
    fn corrupt(&mut self, token: StructureToken) {
        if let Some(byte) = self
            .entries
            .get_mut(&token)
            .and_then(|e| e.bytes.last_mut())
        {
            *byte ^= 0xff;
        }
    }
}

impl StructureStore for CompressedStructureStore {
    fn save(
        &mut self,
        world: &World,
        region: &Region,
        options: CaptureOptions,
    ) -> Result<StructureToken, StoreError> {
        let snap = RegionSnapshot::capture(world, region, options)?;
        let cbor_bytes = cbor_serialize(&snap)?;
        let bytes = zstd_compress(&cbor_bytes, self.level)?;
        let sha256 = sha256_hex(&bytes);

        let token = StructureToken(self.next);
        self.next += 1;
        tracing::trace!(
            %token,
            raw = cbor_bytes.len(),
            compressed = bytes.len(),
            "stored compressed snapshot"
        );
        self.entries.insert(
            token,
            CompressedEntry {
                bytes,
                sha256,
                bounds: snap.bounds(),
            },
        );
        Ok(token)
    }

    fn fetch(&self, token: StructureToken) -> Result<RegionSnapshot, StoreError> {
        self.decode(token)
    }

    fn bounds(&self, token: StructureToken) -> Option<(BlockPos, BlockPos)> {
        self.entries.get(&token).and_then(|e| e.bounds)
    }

    fn delete(&mut self, token: StructureToken) -> bool {
        self.entries.remove(&token).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8], level: i32) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
