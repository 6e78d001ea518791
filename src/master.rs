//! Master side of database replication.
//!
//! Given a replica's start-revision token and an output channel, decide
//! whether the replica needs a full copy or can catch up via changesets,
//! then hand the channel to the backend to emit the message sequence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::backend::{ReplicationInfo, StorageEngine};
use crate::error::ReplicationError;
use crate::message::{split_length_prefixed, MessageChannel, MessageType};

/// Serves the update stream of one master database.
pub struct Master {
    path: PathBuf,
    engine: Arc<dyn StorageEngine>,
}

impl Master {
    pub fn new(path: impl Into<PathBuf>, engine: Arc<dyn StorageEngine>) -> Master {
        Master {
            path: path.into(),
            engine,
        }
    }

    /// Emit the messages that bring a replica at `start_revision_token` up
    /// to date.
    ///
    /// An unopenable master database is reported to the replica as a single
    /// `Fail` frame rather than an error here; the caller closes the
    /// transport afterwards. Transport errors propagate. No retries.
    pub fn write_changesets(
        &self,
        chan: &mut dyn MessageChannel,
        start_revision_token: &[u8],
        mut info: Option<&mut ReplicationInfo>,
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError> {
        if let Some(info) = info.as_deref_mut() {
            info.clear();
        }

        let db = match self.engine.open_readonly(&self.path) {
            Ok(db) => db,
            Err(e) => {
                chan.send(
                    MessageType::Fail,
                    format!("Can't open database: {}", e).as_bytes(),
                    deadline,
                )?;
                return Ok(());
            }
        };
        if db.subdatabase_count() != 1 {
            return Err(ReplicationError::InvalidOperation(
                "replication master must be pointed at exactly one subdatabase".to_string(),
            ));
        }

        // An empty token, or a token minted by a different database
        // generation, forces a full copy; the opaque revision blob is only
        // meaningful within the UUID that produced it.
        let mut need_whole_db = false;
        let mut start_revision: &[u8] = &[];
        if start_revision_token.is_empty() {
            need_whole_db = true;
        } else {
            let (token_uuid, rest) = split_length_prefixed(start_revision_token)?;
            if token_uuid != db.uuid() {
                need_whole_db = true;
            } else {
                start_revision = rest;
            }
        }
        debug!(need_whole_db, "serving replication stream");

        db.write_changesets_to_stream(chan, start_revision, need_whole_db, info)
    }
}
