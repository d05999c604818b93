//! Bootstrap trust store.
//!
//! A plain text file of trusted peer bootstrap keys, one record per line:
//!
//! ```text
//! index opclass channel mac key_b64
//! 1 81 6 0a1b2c3d4e5f MDkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDIgAD...
//! 2 0 0 ffffffffffff MDkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDIgAC...
//! ```
//!
//! Records are only ever appended. Indices are assigned as one more than the
//! largest index on file, so they are never reused. Lines that do not parse
//! are skipped with a warning.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fs2::FileExt;

use crate::error::StoreError;

/// MAC placeholder for keys learned before the peer's address is known.
pub const BROADCAST_MAC: &str = "ffffffffffff";

/// One trusted peer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRecord {
    pub index: u32,
    pub opclass: u8,
    pub channel: u8,
    /// 12 lowercase hex digits, or [`BROADCAST_MAC`].
    pub mac: String,
    /// Base64 of the peer's DER-encoded public key.
    pub key_b64: String,
}

impl BootstrapRecord {
    /// Record for a key learned through PKEX: no channel hint, broadcast MAC.
    pub fn learned(index: u32, key_b64: impl Into<String>) -> Self {
        Self {
            index,
            opclass: 0,
            channel: 0,
            mac: BROADCAST_MAC.to_string(),
            key_b64: key_b64.into(),
        }
    }

    /// Decode the stored key.
    pub fn key_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.key_b64)
    }

    /// Render as one line of the store, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.index, self.opclass, self.channel, self.mac, self.key_b64
        )
    }
}

impl FromStr for BootstrapRecord {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        }

        let index: u32 = fields[0]
            .parse()
            .map_err(|_| format!("bad index {:?}", fields[0]))?;
        if index == 0 {
            return Err("index 0 is reserved".to_string());
        }
        let opclass = fields[1]
            .parse()
            .map_err(|_| format!("bad operating class {:?}", fields[1]))?;
        let channel = fields[2]
            .parse()
            .map_err(|_| format!("bad channel {:?}", fields[2]))?;
        let mac = fields[3];
        if mac.len() != 12 || !mac.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("bad MAC address {:?}", mac));
        }

        Ok(Self {
            index,
            opclass,
            channel,
            mac: mac.to_ascii_lowercase(),
            key_b64: fields[4].to_string(),
        })
    }
}

/// Result of [`TrustStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedKey {
    /// Index assigned to the new record.
    pub index: u32,
    /// Index of an earlier record carrying the same key, if any.
    pub duplicate_of: Option<u32>,
}

/// Append-only store of peer bootstrap keys.
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    /// Use the bootstrap file at `path`. The file is not touched until the
    /// first `save` or `lookup`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the bootstrap file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a peer's public key and return the index it was stored under.
    ///
    /// The file must already exist. A key that is already trusted is logged
    /// and appended again under a fresh index; the earlier index is reported
    /// in [`SavedKey::duplicate_of`]. The scan and the append happen under an
    /// exclusive file lock. Nothing is written once index `u32::MAX` is taken.
    pub fn save(&self, peer_public_key: &[u8]) -> Result<SavedKey, StoreError> {
        let key_b64 = STANDARD.encode(peer_public_key);
        tracing::info!("peer's bootstrapping key (b64 encoded) {}", key_b64);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.unavailable(source))?;
        file.lock_exclusive()?;

        let contents = read_all(&mut file)?;
        let mut max_index = 0;
        let mut duplicate_of = None;
        for record in parse_records(&contents) {
            max_index = max_index.max(record.index);
            if duplicate_of.is_none() && record.key_b64 == key_b64 {
                tracing::warn!(
                    "bootstrapping key is trusted already (index {})",
                    record.index
                );
                duplicate_of = Some(record.index);
            }
        }

        let next_index = max_index
            .checked_add(1)
            .ok_or(StoreError::IndexExhausted(max_index))?;
        let record = BootstrapRecord::learned(next_index, key_b64);
        let mut line = String::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');

        file.write_all(line.as_bytes())?;
        file.flush()?;
        FileExt::unlock(&file)?;

        tracing::debug!("stored bootstrap key as index {}", record.index);
        Ok(SavedKey {
            index: record.index,
            duplicate_of,
        })
    }

    /// Find the record with `index`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no record matches or the file cannot be
    /// opened.
    pub fn lookup(&self, index: u32) -> Result<BootstrapRecord, StoreError> {
        tracing::debug!(
            "looking for bootstrap key index {} in {}",
            index,
            self.path.display()
        );

        let contents = match self.read_locked() {
            Ok(contents) => contents,
            Err(StoreError::Unavailable { path, source }) => {
                tracing::warn!("unable to open {}: {}", path.display(), source);
                return Err(StoreError::NotFound(index));
            }
            Err(e) => return Err(e),
        };

        let found = parse_records(&contents)
            .find(|record| record.index == index)
            .ok_or(StoreError::NotFound(index));
        found
    }

    /// All parseable records, in file order.
    pub fn records(&self) -> Result<Vec<BootstrapRecord>, StoreError> {
        Ok(parse_records(&self.read_locked()?).collect())
    }

    fn read_locked(&self) -> Result<String, StoreError> {
        let mut file = File::open(&self.path).map_err(|source| self.unavailable(source))?;
        file.lock_shared()?;
        let contents = read_all(&mut file)?;
        FileExt::unlock(&file)?;
        Ok(contents)
    }

    fn unavailable(&self, source: std::io::Error) -> StoreError {
        StoreError::Unavailable {
            path: self.path.clone(),
            source,
        }
    }
}

fn read_all(file: &mut File) -> Result<String, StoreError> {
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

fn parse_records(contents: &str) -> impl Iterator<Item = BootstrapRecord> + '_ {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match line.parse::<BootstrapRecord>() {
            Ok(record) => Some(record),
            Err(reason) => {
                tracing::warn!("skipping bootstrap file line {}: {}", n + 1, reason);
                None
            }
        })
}
