//! Framed message channel for the replication wire protocol.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! ┌──────────┬─────────────────┬─────────┐
//! │ type: u8 │ uvarint(len)    │ payload │
//! └──────────┴─────────────────┴─────────┘
//! ```
//!
//! The type codes form a closed set ([`MessageType`]); an unknown code is a
//! protocol violation. Payload lengths use LEB128 unsigned varints, the same
//! encoding used for the length prefix inside start-revision tokens.
//!
//! [`StreamChannel`] implements the channel over any blocking
//! `Read`/`Write` pair. Each call takes an optional absolute deadline;
//! expiry is observed between I/O operations and surfaces as
//! [`ReplicationError::Network`].

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use crate::error::ReplicationError;

/// Upper bound on a single buffered payload, to keep a corrupt or hostile
/// length prefix from forcing a huge allocation. File data is streamed to
/// disk and is not subject to this limit.
const MAX_BUFFERED_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Chunk size for streaming file payloads.
const FILE_CHUNK: usize = 8192;

/// Replication protocol message types, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// No more updates are available.
    EndOfChanges = 0,
    /// Terminal failure; payload is a human-readable description.
    Fail = 1,
    /// Begin a full database copy; payload is `uvarint-len uuid ‖ revision`.
    DbHeader = 2,
    /// Relative filename of the next file in a full copy.
    DbFilename = 3,
    /// Raw bytes of the file named by the preceding `DbFilename`.
    DbFiledata = 4,
    /// End of a full copy; payload is the revision required for promotion.
    DbFooter = 5,
    /// A single changeset; payload is opaque to this core.
    Changeset = 6,
}

impl MessageType {
    pub fn from_code(code: u8) -> Result<MessageType, ReplicationError> {
        Ok(match code {
            0 => MessageType::EndOfChanges,
            1 => MessageType::Fail,
            2 => MessageType::DbHeader,
            3 => MessageType::DbFilename,
            4 => MessageType::DbFiledata,
            5 => MessageType::DbFooter,
            6 => MessageType::Changeset,
            other => {
                return Err(ReplicationError::Network(format!(
                    "unknown replication protocol message type {}",
                    other
                )))
            }
        })
    }
}

/// Encode `value` as a LEB128 unsigned varint, appending to `out`.
pub fn encode_uvarint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a LEB128 unsigned varint from the front of `buf`, returning the
/// value and the number of bytes consumed.
pub fn decode_uvarint(buf: &[u8]) -> Result<(u64, usize), ReplicationError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return Err(ReplicationError::Network(
                "varint length prefix overflows u64".to_string(),
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(ReplicationError::Network(
        "truncated varint length prefix".to_string(),
    ))
}

/// Split a `uvarint(len) ‖ bytes ‖ rest` buffer into the length-prefixed
/// chunk and the remainder. Used for start-revision tokens and `DbHeader`
/// payloads, where a UUID is carried ahead of an opaque revision blob.
pub fn split_length_prefixed(buf: &[u8]) -> Result<(&[u8], &[u8]), ReplicationError> {
    let (len, consumed) = decode_uvarint(buf)?;
    let len = usize::try_from(len).map_err(|_| {
        ReplicationError::Network("length prefix too large for this platform".to_string())
    })?;
    let rest = &buf[consumed..];
    if rest.len() < len {
        return Err(ReplicationError::Network(
            "length prefix runs past end of payload".to_string(),
        ));
    }
    Ok((&rest[..len], &rest[len..]))
}

/// A framed, unidirectional-per-side message channel.
///
/// The replica only receives; the master only sends. Both sides are on one
/// trait so backends can be handed a single `&mut dyn MessageChannel`
/// regardless of direction.
pub trait MessageChannel {
    /// Send one frame.
    fn send(
        &mut self,
        msg_type: MessageType,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError>;

    /// Send one frame whose payload is the contents of `path`, streamed.
    fn send_file(
        &mut self,
        msg_type: MessageType,
        path: &Path,
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError>;

    /// Return the type of the next message without consuming it.
    fn peek_type(&mut self, deadline: Option<Instant>) -> Result<MessageType, ReplicationError>;

    /// Receive the next frame into memory.
    fn receive(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(MessageType, Vec<u8>), ReplicationError>;

    /// Receive the next frame, streaming its payload into a file at `path`.
    /// Returns the frame's type; the caller checks it is the expected one.
    fn receive_file(
        &mut self,
        path: &Path,
        deadline: Option<Instant>,
    ) -> Result<MessageType, ReplicationError>;
}

/// [`MessageChannel`] over blocking byte streams.
///
/// A receive-only channel can pass `std::io::empty()`/`std::io::sink()` for
/// the unused side, and vice versa.
pub struct StreamChannel<R, W> {
    reader: R,
    writer: W,
    /// Type byte consumed by `peek_type` but not yet delivered.
    peeked: Option<u8>,
}

impl<R: Read, W: Write> StreamChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        StreamChannel {
            reader,
            writer,
            peeked: None,
        }
    }

    fn check_deadline(deadline: Option<Instant>) -> Result<(), ReplicationError> {
        if let Some(end) = deadline {
            if Instant::now() >= end {
                return Err(ReplicationError::Network(
                    "deadline expired on replication channel".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError> {
        Self::check_deadline(deadline)?;
        self.reader
            .read_exact(buf)
            .map_err(|e| ReplicationError::Network(format!("read failed: {}", e)))
    }

    fn next_type_byte(&mut self, deadline: Option<Instant>) -> Result<u8, ReplicationError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(byte);
        }
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte, deadline)?;
        Ok(byte[0])
    }

    fn read_length(&mut self, deadline: Option<Instant>) -> Result<u64, ReplicationError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            if shift >= 64 {
                return Err(ReplicationError::Network(
                    "frame length prefix overflows u64".to_string(),
                ));
            }
            let mut byte = [0u8; 1];
            self.read_exact(&mut byte, deadline)?;
            value |= u64::from(byte[0] & 0x7f) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}

impl<R: Read, W: Write> MessageChannel for StreamChannel<R, W> {
    fn send(
        &mut self,
        msg_type: MessageType,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError> {
        Self::check_deadline(deadline)?;
        let mut header = Vec::with_capacity(11);
        header.push(msg_type as u8);
        encode_uvarint(&mut header, payload.len() as u64);
        let write = |w: &mut W, bytes: &[u8]| {
            w.write_all(bytes)
                .map_err(|e| ReplicationError::Network(format!("write failed: {}", e)))
        };
        write(&mut self.writer, &header)?;
        write(&mut self.writer, payload)?;
        self.writer
            .flush()
            .map_err(|e| ReplicationError::Network(format!("flush failed: {}", e)))
    }

    fn send_file(
        &mut self,
        msg_type: MessageType,
        path: &Path,
        deadline: Option<Instant>,
    ) -> Result<(), ReplicationError> {
        Self::check_deadline(deadline)?;
        let mut file = File::open(path)
            .map_err(|e| ReplicationError::Network(format!("cannot open {:?}: {}", path, e)))?;
        let len = file
            .metadata()
            .map_err(|e| ReplicationError::Network(format!("cannot stat {:?}: {}", path, e)))?
            .len();
        let mut header = Vec::with_capacity(11);
        header.push(msg_type as u8);
        encode_uvarint(&mut header, len);
        self.writer
            .write_all(&header)
            .map_err(|e| ReplicationError::Network(format!("write failed: {}", e)))?;
        let mut remaining = len;
        let mut chunk = [0u8; FILE_CHUNK];
        while remaining > 0 {
            Self::check_deadline(deadline)?;
            let want = remaining.min(FILE_CHUNK as u64) as usize;
            file.read_exact(&mut chunk[..want])
                .map_err(|e| ReplicationError::Network(format!("read of {:?} failed: {}", path, e)))?;
            self.writer
                .write_all(&chunk[..want])
                .map_err(|e| ReplicationError::Network(format!("write failed: {}", e)))?;
            remaining -= want as u64;
        }
        self.writer
            .flush()
            .map_err(|e| ReplicationError::Network(format!("flush failed: {}", e)))
    }

    fn peek_type(&mut self, deadline: Option<Instant>) -> Result<MessageType, ReplicationError> {
        let byte = self.next_type_byte(deadline)?;
        self.peeked = Some(byte);
        MessageType::from_code(byte)
    }

    fn receive(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(MessageType, Vec<u8>), ReplicationError> {
        let msg_type = MessageType::from_code(self.next_type_byte(deadline)?)?;
        let len = self.read_length(deadline)?;
        if len > MAX_BUFFERED_PAYLOAD {
            return Err(ReplicationError::Network(format!(
                "message payload of {} bytes exceeds in-memory limit",
                len
            )));
        }
        let mut payload = vec![0u8; len as usize];
        self.read_exact(&mut payload, deadline)?;
        Ok((msg_type, payload))
    }

    fn receive_file(
        &mut self,
        path: &Path,
        deadline: Option<Instant>,
    ) -> Result<MessageType, ReplicationError> {
        let msg_type = MessageType::from_code(self.next_type_byte(deadline)?)?;
        let mut remaining = self.read_length(deadline)?;
        let mut file = File::create(path).map_err(|e| {
            ReplicationError::DatabaseOpening(format!("cannot create {:?}: {}", path, e))
        })?;
        let mut chunk = [0u8; FILE_CHUNK];
        while remaining > 0 {
            Self::check_deadline(deadline)?;
            let want = remaining.min(FILE_CHUNK as u64) as usize;
            self.reader
                .read_exact(&mut chunk[..want])
                .map_err(|e| ReplicationError::Network(format!("read failed: {}", e)))?;
            file.write_all(&chunk[..want]).map_err(|e| {
                ReplicationError::DatabaseOpening(format!("write to {:?} failed: {}", path, e))
            })?;
            remaining -= want as u64;
        }
        file.sync_all().map_err(|e| {
            ReplicationError::DatabaseOpening(format!("sync of {:?} failed: {}", path, e))
        })?;
        Ok(msg_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uvarint_round_trip() {
        for value in [0u64, 1, 127, 128, 300, 16383, 16384, u64::MAX] {
            let mut buf = Vec::new();
            encode_uvarint(&mut buf, value);
            let (decoded, used) = decode_uvarint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn truncated_uvarint_is_an_error() {
        assert!(decode_uvarint(&[0x80]).is_err());
        assert!(decode_uvarint(&[]).is_err());
    }

    #[test]
    fn frame_round_trip() {
        let mut wire = Vec::new();
        {
            let mut out = StreamChannel::new(std::io::empty(), &mut wire);
            out.send(MessageType::Changeset, b"payload", None).unwrap();
            out.send(MessageType::EndOfChanges, b"", None).unwrap();
        }
        let mut chan = StreamChannel::new(Cursor::new(wire), std::io::sink());
        assert_eq!(chan.peek_type(None).unwrap(), MessageType::Changeset);
        // Peeking again must not consume anything further.
        assert_eq!(chan.peek_type(None).unwrap(), MessageType::Changeset);
        let (msg_type, payload) = chan.receive(None).unwrap();
        assert_eq!(msg_type, MessageType::Changeset);
        assert_eq!(payload, b"payload");
        assert_eq!(chan.peek_type(None).unwrap(), MessageType::EndOfChanges);
    }

    #[test]
    fn unknown_type_code_is_a_network_error() {
        let mut chan = StreamChannel::new(Cursor::new(vec![42u8, 0]), std::io::sink());
        assert!(chan.peek_type(None).is_err());
    }

    #[test]
    fn expired_deadline_is_a_network_error() {
        let mut chan = StreamChannel::new(Cursor::new(vec![0u8, 0]), std::io::sink());
        let past = Instant::now() - std::time::Duration::from_secs(1);
        assert!(chan.receive(Some(past)).is_err());
    }

    #[test]
    fn length_prefixed_split() {
        let mut buf = Vec::new();
        encode_uvarint(&mut buf, 4);
        buf.extend_from_slice(b"uuidrest");
        let (head, rest) = split_length_prefixed(&buf).unwrap();
        assert_eq!(head, b"uuid");
        assert_eq!(rest, b"rest");
    }

    #[test]
    fn file_payloads_stream_through_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let mut wire = Vec::new();
        {
            let mut out = StreamChannel::new(std::io::empty(), &mut wire);
            out.send_file(MessageType::DbFiledata, &src, None).unwrap();
        }
        let mut chan = StreamChannel::new(Cursor::new(wire), std::io::sink());
        let msg_type = chan.receive_file(&dst, None).unwrap();
        assert_eq!(msg_type, MessageType::DbFiledata);
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }
}
