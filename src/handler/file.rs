//! File sink (§4.G, §11): single writer per file, its own `BufWriter`,
//! and a configurable `fdatasync` policy (see `DESIGN.md` for the
//! reasoning behind the default).

use crate::error::Result;
use crate::handler::contract::{HandlerContract, HandlerParam};
use crate::record::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// When the handler calls `fdatasync` on its underlying file descriptor.
/// Not log *rotation* (explicitly out of scope elsewhere) — purely a
/// durability/throughput tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// `fdatasync` after every record. Safest, slowest.
    EveryWrite,
    /// `fdatasync` every `N` records.
    EveryNRecords(u32),
    /// Only on an explicit or implicit flush; relies on the OS to
    /// eventually persist the rest.
    OnFlushOnly,
}

pub struct FileHandlerParam {
    pub base: HandlerParam,
    pub path: PathBuf,
    pub sync_policy: SyncPolicy,
}

pub struct FileHandler {
    param: FileHandlerParam,
    writer: Option<BufWriter<File>>,
    records_since_sync: u32,
}

impl FileHandler {
    pub fn new(param: FileHandlerParam) -> FileHandler {
        FileHandler {
            param,
            writer: None,
            records_since_sync: 0,
        }
    }

    fn maybe_sync(&mut self, force: bool) -> Result<()> {
        let due = match self.param.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNRecords(n) => self.records_since_sync >= n,
            SyncPolicy::OnFlushOnly => false,
        };
        if (due || force) && self.writer.is_some() {
            if let Some(writer) = self.writer.as_mut() {
                writer.flush()?;
                let fd = writer.get_ref().as_raw_fd();
                // SAFETY: `fd` is the live file descriptor owned by
                // `writer`, valid for the duration of this call.
                let rc = unsafe { libc::fdatasync(fd) };
                if rc != 0 {
                    return Err(std::io::Error::last_os_error().into());
                }
            }
            self.records_since_sync = 0;
        }
        Ok(())
    }
}

impl HandlerContract for FileHandler {
    fn init(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.param.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn process_log(
        &mut self,
        record: &Record,
        _filename: &str,
        _funcname: &str,
        _loggername: &str,
        message: &str,
    ) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .expect("process_log called before init");
        for line in message.split('\n') {
            writeln!(
                writer,
                "{} [{}] {}: {}",
                record.header.wall_time_secs,
                record.header.level,
                record.loggername,
                line
            )?;
        }
        self.records_since_sync += 1;
        self.maybe_sync(false)
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        self.maybe_sync(true)
    }

    fn process_explicit_flush(&mut self) -> Result<()> {
        self.maybe_sync(true)
    }

    fn process_exit(&mut self) -> Result<()> {
        self.maybe_sync(true)?;
        self.writer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::level::Level;
    use std::io::Read;

    fn base_param() -> HandlerParam {
        HandlerParam {
            filters: FilterSet::all_all(),
            data_hwm: 8,
            ctrl_hwm: 8,
            ierr_max: 10,
            flush_freq_ms: 1000,
        }
    }

    #[test]
    fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut handler = FileHandler::new(FileHandlerParam {
            base: base_param(),
            path: path.clone(),
            sync_policy: SyncPolicy::OnFlushOnly,
        });
        handler.init().unwrap();
        let record = Record::new(Level::Info, 1, 1, 0, 0, "f", "g", "app.db", "hello world");
        handler
            .process_log(&record, "f", "g", "app.db", &record.message)
            .unwrap();
        handler.process_exit().unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert!(contents.contains("app.db"));
        assert!(contents.contains("hello world"));
    }

    #[test]
    fn splits_multiline_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut handler = FileHandler::new(FileHandlerParam {
            base: base_param(),
            path: path.clone(),
            sync_policy: SyncPolicy::EveryWrite,
        });
        handler.init().unwrap();
        let record = Record::new(Level::Info, 1, 1, 0, 0, "f", "g", "app", "line one\nline two");
        handler
            .process_log(&record, "f", "g", "app", &record.message)
            .unwrap();
        handler.process_exit().unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
