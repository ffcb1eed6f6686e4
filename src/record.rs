//! Wire-level log record: a fixed header followed by four concatenated
//! variable-length strings.
//!
//! This is the one type that crosses the producer/handler boundary. It is
//! built once per `log()` call on the producer side, handed to the
//! transport by value, and decoded (or just borrowed, for the in-process
//! bus) on the handler side.

use crate::error::{codes, Error, Result};
use crate::level::Level;
use std::convert::TryFrom;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-width fields that precede the four strings on the wire.
///
/// Field order and widths are part of the wire contract: any change here
/// must be mirrored in [`Record::to_bytes`] and [`Record::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub level: Level,
    pub wall_time_secs: u64,
    pub wall_time_nanos: u32,
    pub pid: u32,
    pub tid: u32,
    pub thread_rank: u64,
    pub line_no: u32,
    pub filename_len: u32,
    pub funcname_len: u32,
    pub loggername_len: u32,
    pub message_len: u32,
}

/// Number of bytes [`RecordHeader`] occupies on the wire.
pub const HEADER_LEN: usize = 8 + 8 + 4 + 4 + 4 + 8 + 4 + 4 + 4 + 4 + 1;

/// One log event, fully formatted and ready to hand to a handler.
///
/// Immutable after construction: ownership of a `Record` moves from the
/// producer into the transport, and from the transport into each handler
/// that must see it (the in-process bus clones it per subscriber; see
/// [`crate::bus`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub filename: String,
    pub funcname: String,
    pub loggername: String,
    pub message: String,
}

impl Record {
    /// Builds a record, capturing wall-clock time now and computing the
    /// four string lengths for the header.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        level: Level,
        pid: u32,
        tid: u32,
        thread_rank: u64,
        line_no: u32,
        filename: impl Into<String>,
        funcname: impl Into<String>,
        loggername: impl Into<String>,
        message: impl Into<String>,
    ) -> Record {
        let filename = filename.into();
        let funcname = funcname.into();
        let loggername = loggername.into();
        let message = message.into();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let header = RecordHeader {
            level,
            wall_time_secs: now.as_secs(),
            wall_time_nanos: now.subsec_nanos(),
            pid,
            tid,
            thread_rank,
            line_no,
            filename_len: filename.len() as u32,
            funcname_len: funcname.len() as u32,
            loggername_len: loggername.len() as u32,
            message_len: message.len() as u32,
        };
        Record {
            header,
            filename,
            funcname,
            loggername,
            message,
        }
    }

    /// Strips any directory prefix from `path`, scanning for the last
    /// path separator, as the producer does before building a `Record`.
    pub fn basename(path: &str) -> &str {
        match path.rfind('/') {
            Some(idx) => &path[idx + 1..],
            None => path,
        }
    }

    /// Serializes this record into a single contiguous buffer: the header,
    /// then the four strings back to back in filename/funcname/loggername/
    /// message order. Used by the remote handler's length-prefixed wire
    /// frames; the in-process bus passes the `Record` by value instead.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            HEADER_LEN
                + self.filename.len()
                + self.funcname.len()
                + self.loggername.len()
                + self.message.len(),
        );
        buf.push(self.header.level.as_u8());
        buf.extend_from_slice(&self.header.wall_time_secs.to_le_bytes());
        buf.extend_from_slice(&self.header.wall_time_nanos.to_le_bytes());
        buf.extend_from_slice(&self.header.pid.to_le_bytes());
        buf.extend_from_slice(&self.header.tid.to_le_bytes());
        buf.extend_from_slice(&self.header.thread_rank.to_le_bytes());
        buf.extend_from_slice(&self.header.line_no.to_le_bytes());
        buf.extend_from_slice(&self.header.filename_len.to_le_bytes());
        buf.extend_from_slice(&self.header.funcname_len.to_le_bytes());
        buf.extend_from_slice(&self.header.loggername_len.to_le_bytes());
        buf.extend_from_slice(&self.header.message_len.to_le_bytes());
        buf.extend_from_slice(self.filename.as_bytes());
        buf.extend_from_slice(self.funcname.as_bytes());
        buf.extend_from_slice(self.loggername.as_bytes());
        buf.extend_from_slice(self.message.as_bytes());
        buf
    }

    /// Inverse of [`Record::to_bytes`]. Fails with
    /// [`codes::PROTOCOL`](crate::error::codes::PROTOCOL) on a truncated or
    /// malformed buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<Record> {
        if buf.len() < HEADER_LEN {
            return Err(Error::new(codes::PROTOCOL, "record buffer shorter than header"));
        }
        let mut pos = 0usize;
        let level_byte = buf[pos];
        pos += 1;
        let level = Level::ALL
            .get(level_byte as usize)
            .copied()
            .ok_or_else(|| Error::new(codes::PROTOCOL, "invalid level byte in record header"))?;
        let wall_time_secs = read_u64(buf, &mut pos)?;
        let wall_time_nanos = read_u32(buf, &mut pos)?;
        let pid = read_u32(buf, &mut pos)?;
        let tid = read_u32(buf, &mut pos)?;
        let thread_rank = read_u64(buf, &mut pos)?;
        let line_no = read_u32(buf, &mut pos)?;
        let filename_len = read_u32(buf, &mut pos)?;
        let funcname_len = read_u32(buf, &mut pos)?;
        let loggername_len = read_u32(buf, &mut pos)?;
        let message_len = read_u32(buf, &mut pos)?;

        let total_strings = filename_len as usize
            + funcname_len as usize
            + loggername_len as usize
            + message_len as usize;
        if buf.len() - pos < total_strings {
            return Err(Error::new(codes::PROTOCOL, "record buffer truncated before string payload"));
        }

        let filename = read_string(buf, &mut pos, filename_len)?;
        let funcname = read_string(buf, &mut pos, funcname_len)?;
        let loggername = read_string(buf, &mut pos, loggername_len)?;
        let message = read_string(buf, &mut pos, message_len)?;

        Ok(Record {
            header: RecordHeader {
                level,
                wall_time_secs,
                wall_time_nanos,
                pid,
                tid,
                thread_rank,
                line_no,
                filename_len,
                funcname_len,
                loggername_len,
                message_len,
            },
            filename,
            funcname,
            loggername,
            message,
        })
    }
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let bytes: [u8; 4] = <[u8; 4]>::try_from(&buf[*pos..end])
        .map_err(|_| Error::new(codes::PROTOCOL, "truncated u32 in record header"))?;
    *pos = end;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let end = *pos + 8;
    let bytes: [u8; 8] = <[u8; 8]>::try_from(&buf[*pos..end])
        .map_err(|_| Error::new(codes::PROTOCOL, "truncated u64 in record header"))?;
    *pos = end;
    Ok(u64::from_le_bytes(bytes))
}

fn read_string(buf: &[u8], pos: &mut usize, len: u32) -> Result<String> {
    let end = *pos + len as usize;
    let s = String::from_utf8(buf[*pos..end].to_vec())
        .map_err(|e| Error::new(codes::PROTOCOL, format!("record string is not utf-8: {}", e)))?;
    *pos = end;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_directory() {
        assert_eq!(Record::basename("src/log/handler.rs"), "handler.rs");
        assert_eq!(Record::basename("handler.rs"), "handler.rs");
        assert_eq!(Record::basename("a/b/c"), "c");
    }

    #[test]
    fn round_trips_through_bytes() {
        let record = Record::new(
            Level::Warning,
            1234,
            5678,
            1,
            42,
            "handler.rs",
            "dispatch",
            "app.db",
            "connection dropped",
        );
        let bytes = record.to_bytes();
        let decoded = Record::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn from_bytes_rejects_truncated_header() {
        let err = Record::from_bytes(&[0u8; 4]).unwrap_err();
        assert_eq!(err.code(), codes::PROTOCOL);
    }

    #[test]
    fn from_bytes_rejects_truncated_payload() {
        let record = Record::new(Level::Info, 1, 1, 0, 0, "f", "g", "h", "a full message");
        let mut bytes = record.to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(Record::from_bytes(&bytes).is_err());
    }
}
