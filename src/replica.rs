//! Replica side of database replication.
//!
//! A [`Replica`] owns a directory holding the stub pointer, the parameter
//! file, and one or two database subdirectories. At every instant exactly
//! one subdirectory is *live* (named by the stub); during a full copy or a
//! multi-step catch-up at most one more exists *offline*, being built
//! towards a required revision.
//!
//! ```text
//!            ┌──────┐ DbHeader  ┌──────────┐  rev ≥ needed ┌───────────┐
//!            │ Idle │──────────▶│ Building │──────────────▶│ promoted, │
//!            └──────┘           └──────────┘               │ back to   │
//!               │  Changeset        │ Changeset (offline)  │ Idle      │
//!               ▼                   ▼                      └───────────┘
//!          apply to live       CatchingUp ── rev ≥ needed ──────┘
//! ```
//!
//! Promotion rewrites the stub pointer via write-temp-then-rename and
//! persists the new database's UUID in the parameter file before the old
//! live directory is deleted.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::{OpenMode, ReplicationInfo, StorageEngine, WritableDatabase};
use crate::error::ReplicationError;
use crate::message::{split_length_prefixed, MessageChannel, MessageType};
use crate::stub;

/// A replica database directory plus the channel its updates arrive on.
pub struct Replica {
    path: PathBuf,
    engine: Arc<dyn StorageEngine>,
    live_name: String,
    live_db: Box<dyn WritableDatabase>,
    offline_name: Option<String>,
    offline_uuid: Vec<u8>,
    offline_revision: Vec<u8>,
    offline_needed_revision: Vec<u8>,
    params: stub::Parameters,
    chan: Option<Box<dyn MessageChannel>>,
    /// Budget for each channel call inside one apply step.
    timeout: Option<Duration>,
}

impl Replica {
    /// Open (creating if necessary) the replica at `path`.
    ///
    /// A fresh directory gets a `replica_0` database, a stub pointing at
    /// it, and an empty parameter file. An existing directory must hold a
    /// stub naming exactly one subdatabase of a supported backend.
    pub fn open(
        path: impl Into<PathBuf>,
        engine: Arc<dyn StorageEngine>,
    ) -> Result<Replica, ReplicationError> {
        let path = path.into();
        if path.is_file() {
            return Err(ReplicationError::InvalidOperation(format!(
                "replica path {:?} should not be a file",
                path
            )));
        }

        let (live_name, live_db) = if !path.is_dir() {
            fs::create_dir_all(&path).map_err(|e| {
                ReplicationError::DatabaseOpening(format!(
                    "cannot create replica directory {:?}: {}",
                    path, e
                ))
            })?;
            let live_name = "replica_0".to_string();
            let live_path = path.join(&live_name);
            fs::create_dir(&live_path).map_err(|e| {
                ReplicationError::DatabaseOpening(format!(
                    "cannot create directory {:?}: {}",
                    live_path, e
                ))
            })?;
            let live_db = engine.open_writable(&live_path, OpenMode::Create)?;
            stub::write_stub(&path, engine.kind(), &live_name)?;
            (live_name, live_db)
        } else {
            let entries = stub::read_stub(&path)?;
            if entries.len() != 1 {
                return Err(ReplicationError::InvalidOperation(format!(
                    "replica must reference exactly one subdatabase - found {}",
                    entries.len()
                )));
            }
            let live_name = entries.into_iter().next().unwrap().1;
            let live_db = engine.open_writable(&path.join(&live_name), OpenMode::Open)?;
            (live_name, live_db)
        };

        let params = stub::Parameters::load(&path)?;
        Ok(Replica {
            path,
            engine,
            live_name,
            live_db,
            offline_name: None,
            offline_uuid: Vec::new(),
            offline_revision: Vec::new(),
            offline_needed_revision: Vec::new(),
            params,
            chan: None,
            timeout: None,
        })
    }

    /// Name of the currently live subdirectory.
    pub fn live_name(&self) -> &str {
        &self.live_name
    }

    /// Set the per-channel-call timeout for subsequent apply calls.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Attach the channel updates arrive on, releasing any previous one.
    pub fn set_channel(&mut self, chan: Box<dyn MessageChannel>) {
        self.chan = Some(chan);
    }

    /// Store a parameter; an empty value removes it.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), ReplicationError> {
        self.params.set(name, value)
    }

    /// Fetch a parameter, `""` when unset.
    pub fn get_parameter(&self, name: &str) -> &str {
        self.params.get(name)
    }

    /// The start-revision token to hand to a master:
    /// `uvarint(len(uuid)) ‖ uuid ‖ revision_info`.
    ///
    /// The UUID comes from the committed `uuid` parameter, so a replica
    /// that has never completed a promotion sends an unknown identity and
    /// is served a full copy.
    pub fn get_revision_info(&self) -> Result<Vec<u8>, ReplicationError> {
        let uuid = stub::hex_decode(self.params.get("uuid"));
        let mut token = Vec::new();
        crate::message::encode_uvarint(&mut token, uuid.len() as u64);
        token.extend_from_slice(&uuid);
        token.extend_from_slice(&self.live_db.revision_info()?);
        Ok(token)
    }

    /// Read and apply the next logical update from the channel.
    ///
    /// Returns `false` only on `EndOfChanges`. A full copy counts as one
    /// update, as does a changeset. Errors leave the live database and
    /// stub consistent; a partial offline build stays on disk and is
    /// discarded when the next `DbHeader` arrives.
    pub fn apply_next_changeset(
        &mut self,
        mut info: Option<&mut ReplicationInfo>,
    ) -> Result<bool, ReplicationError> {
        if let Some(info) = info.as_deref_mut() {
            info.clear();
        }
        if self.chan.is_none() {
            return Err(ReplicationError::InvalidOperation(
                "no channel attached to replica".to_string(),
            ));
        }
        let deadline = self.timeout.map(|t| Instant::now() + t);

        match self.chan.as_mut().unwrap().peek_type(deadline)? {
            MessageType::EndOfChanges => Ok(false),
            MessageType::DbHeader => {
                let completed = match self.apply_db_copy(deadline) {
                    Ok(completed) => completed,
                    Err(e) => {
                        self.remove_offline_db();
                        return Err(e);
                    }
                };
                if let Some(info) = info.as_deref_mut() {
                    info.full_copies_applied += 1;
                }
                if completed && self.possibly_make_offline_live()? {
                    if let Some(info) = info.as_deref_mut() {
                        info.changed = true;
                    }
                }
                Ok(true)
            }
            MessageType::Changeset => {
                if self.offline_name.is_none() {
                    self.apply_changeset_to_live(deadline, info.as_deref_mut())?;
                } else {
                    // Counters track the live database; an offline apply
                    // only becomes visible if it triggers promotion.
                    self.apply_changeset_to_offline(deadline)?;
                    if self.possibly_make_offline_live()? {
                        if let Some(info) = info.as_deref_mut() {
                            info.changed = true;
                        }
                    }
                }
                Ok(true)
            }
            MessageType::Fail => {
                let (_, payload) = self.chan.as_mut().unwrap().receive(deadline)?;
                Err(ReplicationError::Network(format!(
                    "unable to fully synchronise: {}",
                    String::from_utf8_lossy(&payload)
                )))
            }
            other => Err(ReplicationError::Network(format!(
                "unexpected replication protocol message type {:?}",
                other
            ))),
        }
    }

    fn apply_changeset_to_live(
        &mut self,
        deadline: Option<Instant>,
        info: Option<&mut ReplicationInfo>,
    ) -> Result<(), ReplicationError> {
        let chan = self.chan.as_mut().unwrap();
        self.offline_needed_revision = self
            .live_db
            .apply_changeset_from_stream(chan.as_mut(), deadline)?;
        if let Some(info) = info {
            info.changesets_applied += 1;
            info.changed = true;
        }
        // Reopen to pick up the new revision.
        let live_path = self.path.join(&self.live_name);
        self.live_db = self.engine.open_writable(&live_path, OpenMode::Open)?;
        Ok(())
    }

    fn apply_changeset_to_offline(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError> {
        let offline_path = self.path.join(self.offline_name.as_ref().unwrap());
        let mut offline_db = self.engine.open_writable(&offline_path, OpenMode::Open)?;
        let chan = self.chan.as_mut().unwrap();
        self.offline_needed_revision =
            offline_db.apply_changeset_from_stream(chan.as_mut(), deadline)?;
        self.offline_revision = offline_db.revision_info()?;
        Ok(())
    }

    /// Consume one full-copy message group (`DbHeader` … `DbFooter`).
    ///
    /// Returns `false` when the copy was cut short by a `Fail` frame; the
    /// frame itself is left on the channel for the next apply call to
    /// surface.
    fn apply_db_copy(&mut self, deadline: Option<Instant>) -> Result<bool, ReplicationError> {
        // A leftover offline build means a previous copy never reached its
        // needed revision; a new header supersedes it.
        self.remove_offline_db();

        let offline_name = next_db_name(&self.live_name);
        let offline_path = self.path.join(&offline_name);
        if offline_path.is_dir() {
            fs::remove_dir_all(&offline_path).map_err(|e| {
                ReplicationError::DatabaseOpening(format!(
                    "cannot remove stale directory {:?}: {}",
                    offline_path, e
                ))
            })?;
        }
        fs::create_dir(&offline_path).map_err(|e| {
            ReplicationError::DatabaseOpening(format!(
                "cannot make directory {:?}: {}",
                offline_path, e
            ))
        })?;
        self.offline_name = Some(offline_name);
        debug!(offline = %offline_path.display(), "starting full-copy build");

        let chan = self.chan.as_mut().unwrap();
        let (msg_type, payload) = chan.receive(deadline)?;
        check_message_type(msg_type, MessageType::DbHeader)?;
        let (uuid, revision) = split_length_prefixed(&payload)?;
        self.offline_uuid = uuid.to_vec();
        self.offline_revision = revision.to_vec();
        self.offline_needed_revision = Vec::new();

        loop {
            match chan.peek_type(deadline)? {
                MessageType::Fail => return Ok(false),
                MessageType::DbFooter => break,
                _ => {}
            }

            let (msg_type, filename) = chan.receive(deadline)?;
            check_message_type(msg_type, MessageType::DbFilename)?;
            let filename = String::from_utf8(filename).map_err(|_| {
                ReplicationError::Network("filename in database copy is not UTF-8".to_string())
            })?;
            // No valid database file contains "..", so reject it outright
            // rather than reasoning about path components.
            if filename.contains("..") {
                return Err(ReplicationError::Network(
                    "filename in database copy contained '..'".to_string(),
                ));
            }

            if chan.peek_type(deadline)? == MessageType::Fail {
                return Ok(false);
            }
            let msg_type = chan.receive_file(&offline_path.join(&filename), deadline)?;
            check_message_type(msg_type, MessageType::DbFiledata)?;
        }

        let (msg_type, needed) = chan.receive(deadline)?;
        check_message_type(msg_type, MessageType::DbFooter)?;
        self.offline_needed_revision = needed;
        Ok(true)
    }

    /// Promote the offline database if it has reached its needed revision.
    fn possibly_make_offline_live(&mut self) -> Result<bool, ReplicationError> {
        let Some(offline_name) = self.offline_name.clone() else {
            return Ok(false);
        };
        if !self
            .live_db
            .check_revision_at_least(&self.offline_revision, &self.offline_needed_revision)?
        {
            return Ok(false);
        }
        let offline_path = self.path.join(&offline_name);
        self.live_db = self.engine.open_writable(&offline_path, OpenMode::Open)?;
        stub::write_stub(&self.path, self.engine.kind(), &offline_name)?;
        let uuid_hex = stub::hex_encode(&self.offline_uuid);
        self.params.set("uuid", &uuid_hex)?;
        info!(live = %offline_name, "promoted offline database");
        self.offline_name = Some(std::mem::replace(&mut self.live_name, offline_name));
        self.remove_offline_db();
        Ok(true)
    }

    /// Discard the offline build, if any.
    fn remove_offline_db(&mut self) {
        if let Some(name) = self.offline_name.take() {
            let offline_path = self.path.join(name);
            if offline_path.is_dir() {
                let _ = fs::remove_dir_all(&offline_path);
            }
        }
    }
}

/// Derive the next build directory name from the live one: flip a trailing
/// `_0`/`_1`, or append `_0` when there is no such suffix.
fn next_db_name(live_name: &str) -> String {
    let bytes = live_name.as_bytes();
    if bytes.len() < 2 || bytes[bytes.len() - 2] != b'_' {
        return format!("{}_0", live_name);
    }
    let flipped = if bytes[bytes.len() - 1] == b'0' {
        "1"
    } else {
        "0"
    };
    format!("{}{}", &live_name[..live_name.len() - 1], flipped)
}

fn check_message_type(
    got: MessageType,
    expected: MessageType,
) -> Result<(), ReplicationError> {
    if got != expected {
        return Err(ReplicationError::Network(format!(
            "unexpected replication protocol message type (got {:?}, expected {:?})",
            got, expected
        )));
    }
    Ok(())
}
