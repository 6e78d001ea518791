//! Storage-engine seam for the replication core.
//!
//! The replication protocol never inspects database internals: it moves
//! opaque revision blobs and changesets between a [`MasterDatabase`] and a
//! [`WritableDatabase`], both opened through a [`StorageEngine`]. The
//! engine itself lives outside this crate; tests provide a file-backed
//! implementation.
//!
//! Revisions are compared only via
//! [`WritableDatabase::check_revision_at_least`], never decoded here.

use std::path::Path;
use std::time::Instant;

use crate::error::ReplicationError;
use crate::message::MessageChannel;

/// Supported storage backends, as named in the stub-pointer file.
///
/// The stub format carries a backend tag on every line precisely so that
/// new backends can be added later; today only one is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendKind {
    Flint,
}

impl BackendKind {
    /// Tag written ahead of the subdirectory name in the stub file.
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Flint => "flint",
        }
    }

    /// Resolve a stub-file tag.
    pub fn from_tag(tag: &str) -> Result<BackendKind, ReplicationError> {
        match tag {
            "flint" => Ok(BackendKind::Flint),
            other => Err(ReplicationError::FeatureUnavailable(format!(
                "database replication does not support the '{}' backend",
                other
            ))),
        }
    }
}

/// How to open a writable database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing database.
    Open,
    /// Create a fresh database in an empty directory.
    Create,
}

/// Counters reported back to the caller of the replication operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationInfo {
    /// Changesets applied (to the live or the offline database).
    pub changesets_applied: u32,
    /// Full database copies applied.
    pub full_copies_applied: u32,
    /// Whether the live database changed during the operation.
    pub changed: bool,
}

impl ReplicationInfo {
    pub fn clear(&mut self) {
        *self = ReplicationInfo::default();
    }
}

/// Factory for databases of one backend.
pub trait StorageEngine {
    fn kind(&self) -> BackendKind;

    /// Open (or create) a single writable subdatabase at `path`.
    fn open_writable(
        &self,
        path: &Path,
        mode: OpenMode,
    ) -> Result<Box<dyn WritableDatabase>, ReplicationError>;

    /// Open the master database read-only at `path`.
    fn open_readonly(&self, path: &Path) -> Result<Box<dyn MasterDatabase>, ReplicationError>;
}

/// Replica-side handle: a single writable subdatabase.
pub trait WritableDatabase {
    /// The database's identity, as opaque bytes.
    fn uuid(&self) -> Vec<u8>;

    /// Opaque blob describing the current revision.
    fn revision_info(&self) -> Result<Vec<u8>, ReplicationError>;

    /// Consume one `Changeset` message from the channel and apply it.
    /// Returns the revision this database must reach before a copy of it
    /// may go live.
    fn apply_changeset_from_stream(
        &mut self,
        chan: &mut dyn MessageChannel,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>, ReplicationError>;

    /// Whether `rev` satisfies `needed`, by the backend's ordering.
    fn check_revision_at_least(
        &self,
        rev: &[u8],
        needed: &[u8],
    ) -> Result<bool, ReplicationError>;
}

/// Master-side handle: a read-only database that can serialise its own
/// update stream.
pub trait MasterDatabase {
    /// The database's identity, as opaque bytes.
    fn uuid(&self) -> Vec<u8>;

    /// Number of subdatabases behind this handle. Replication requires
    /// exactly one.
    fn subdatabase_count(&self) -> usize;

    /// Emit the message sequence bringing a replica at `start_revision` up
    /// to date: changesets when possible, a full copy when `need_whole_db`
    /// or when changesets are not available, then `EndOfChanges`.
    fn write_changesets_to_stream(
        &self,
        chan: &mut dyn MessageChannel,
        start_revision: &[u8],
        need_whole_db: bool,
        info: Option<&mut ReplicationInfo>,
    ) -> Result<(), ReplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_flint_tag_is_accepted() {
        assert_eq!(BackendKind::from_tag("flint").unwrap(), BackendKind::Flint);
        assert!(matches!(
            BackendKind::from_tag("quartz"),
            Err(ReplicationError::FeatureUnavailable(_))
        ));
    }

    #[test]
    fn info_clear_resets_all_counters() {
        let mut info = ReplicationInfo {
            changesets_applied: 3,
            full_copies_applied: 1,
            changed: true,
        };
        info.clear();
        assert_eq!(info, ReplicationInfo::default());
    }
}
