//! Stub-pointer file and replica parameter store.
//!
//! The stub pointer (`XAPIANDB`) is the atomic-switchover mechanism: it is
//! a small text file naming the currently live subdirectory, and it is only
//! ever replaced by writing `XAPIANDB.tmp` and renaming it into place.
//! Readers that follow the stub therefore never observe a half-written
//! database.
//!
//! The parameter store (`params`) is a `key=value`-per-line file rewritten
//! in full on every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::backend::BackendKind;
use crate::error::ReplicationError;

/// Name of the stub-pointer file inside a replica directory.
pub const STUB_FILE: &str = "XAPIANDB";
/// Temporary sibling used for the write-then-rename dance.
pub const STUB_TMP_FILE: &str = "XAPIANDB.tmp";
/// Name of the parameter file inside a replica directory.
pub const PARAMS_FILE: &str = "params";

/// Parse the stub file, returning `(backend, subdir_name)` entries.
///
/// `#`-prefixed comments and blank lines are ignored; lines without a
/// space separator are skipped. An unsupported backend tag is an error.
pub fn read_stub(replica_dir: &Path) -> Result<Vec<(BackendKind, String)>, ReplicationError> {
    let stub_path = replica_dir.join(STUB_FILE);
    let text = fs::read_to_string(&stub_path).map_err(|e| {
        ReplicationError::DatabaseOpening(format!("cannot read stub file {:?}: {}", stub_path, e))
    })?;
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(space) = line.find(' ') else {
            continue;
        };
        let kind = BackendKind::from_tag(&line[..space])?;
        entries.push((kind, line[space + 1..].to_string()));
    }
    Ok(entries)
}

/// Atomically rewrite the stub to name `live_name`: write the temporary
/// sibling, then rename over the stub. Rename failure is fatal.
pub fn write_stub(
    replica_dir: &Path,
    kind: BackendKind,
    live_name: &str,
) -> Result<(), ReplicationError> {
    let tmp_path = replica_dir.join(STUB_TMP_FILE);
    let stub_path = replica_dir.join(STUB_FILE);
    let contents = format!(
        "# Automatically generated by the replication applier.\n\
         # Rewritten after each replication operation; do not edit.\n\
         {} {}\n",
        kind.tag(),
        live_name
    );
    let write_err = |e: std::io::Error| {
        ReplicationError::DatabaseOpening(format!("cannot write stub file {:?}: {}", tmp_path, e))
    };
    let mut tmp = fs::File::create(&tmp_path).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.sync_all().map_err(write_err)?;
    drop(tmp);
    fs::rename(&tmp_path, &stub_path).map_err(|e| {
        ReplicationError::DatabaseOpening(format!(
            "failed to update stub file for replica {:?}: {}",
            replica_dir, e
        ))
    })
}

/// The `params` key/value store.
#[derive(Debug, Default)]
pub struct Parameters {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Parameters {
    /// Load the parameter file from `replica_dir`, tolerating its absence.
    pub fn load(replica_dir: &Path) -> Result<Parameters, ReplicationError> {
        let path = replica_dir.join(PARAMS_FILE);
        let mut values = BTreeMap::new();
        match fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines() {
                    if let Some(eq) = line.find('=') {
                        values.insert(line[..eq].to_string(), line[eq + 1..].to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ReplicationError::DatabaseOpening(format!(
                    "cannot read parameter file {:?}: {}",
                    path, e
                )))
            }
        }
        Ok(Parameters { path, values })
    }

    /// Get a parameter, or `""` when unset.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Set a parameter (an empty value removes it) and rewrite the file.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ReplicationError> {
        if value.is_empty() {
            self.values.remove(name);
        } else {
            self.values.insert(name.to_string(), value.to_string());
        }
        self.write()
    }

    fn write(&self) -> Result<(), ReplicationError> {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        fs::write(&self.path, out).map_err(|e| {
            ReplicationError::DatabaseOpening(format!(
                "cannot write parameter file {:?}: {}",
                self.path, e
            ))
        })
    }
}

/// Render bytes as lowercase hex, the form the `uuid` parameter is stored in.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Decode hex, stopping at the first invalid or odd-length tail. Callers
/// treat the stored value as opaque, so a corrupt parameter simply reads
/// as a mismatching UUID.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let bytes = hex.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16);
        let lo = (pair[1] as char).to_digit(16);
        match (hi, lo) {
            (Some(hi), Some(lo)) => out.push(((hi << 4) | lo) as u8),
            _ => break,
        }
    }
    out
}
