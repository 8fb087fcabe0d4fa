//! Snapshot file format for [`MemoryStore`](super::MemoryStore).
//!
//! Layout: 16-byte header (magic, version, entry count, all little-endian)
//! followed by the bincode-encoded key-value map. Files are written to a
//! temporary file in the target directory and renamed into place.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_SIZE: usize = 16;

const MAGIC_BYTES: &[u8; 4] = b"SSNP";

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn write_snapshot(path: &Path, map: &BTreeMap<Vec<u8>, Vec<u8>>) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let body = bincode::encode_to_vec(map, bincode::config::standard())?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    file.write_all(MAGIC_BYTES).map_err(|e| io_error(path, e))?;
    file.write_all(&SNAPSHOT_VERSION.to_le_bytes())
        .map_err(|e| io_error(path, e))?;
    file.write_all(&(map.len() as u64).to_le_bytes())
        .map_err(|e| io_error(path, e))?;
    file.write_all(&body).map_err(|e| io_error(path, e))?;
    file.as_file().sync_all().map_err(|e| io_error(path, e))?;

    file.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

pub(crate) fn read_snapshot(path: &Path) -> StorageResult<BTreeMap<Vec<u8>, Vec<u8>>> {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;

    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::Corrupted {
            reason: "File too small to contain header".to_string(),
        });
    }
    if &bytes[0..4] != MAGIC_BYTES {
        return Err(StorageError::Corrupted {
            reason: "Invalid magic bytes".to_string(),
        });
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != SNAPSHOT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[8..16]);
    let expected_entries = u64::from_le_bytes(count);

    let (map, _): (BTreeMap<Vec<u8>, Vec<u8>>, usize) =
        bincode::decode_from_slice(&bytes[HEADER_SIZE..], bincode::config::standard())?;

    if map.len() as u64 != expected_entries {
        return Err(StorageError::Corrupted {
            reason: format!(
                "header declares {expected_entries} entries, body holds {}",
                map.len()
            ),
        });
    }

    Ok(map)
}
