//! The null handler (§4.G, §11): discards every record but still
//! participates fully in the control protocol and error accounting, for
//! tests that want a handler thread without caring about its sink.

use crate::error::Result;
use crate::handler::contract::{HandlerContract, HandlerParam};
use crate::record::Record;

pub struct NullHandler {
    pub base: HandlerParam,
    records_seen: u64,
}

impl NullHandler {
    pub fn new(base: HandlerParam) -> NullHandler {
        NullHandler {
            base,
            records_seen: 0,
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }
}

impl HandlerContract for NullHandler {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn process_log(
        &mut self,
        _record: &Record,
        _filename: &str,
        _funcname: &str,
        _loggername: &str,
        _message: &str,
    ) -> Result<()> {
        self.records_seen += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::level::Level;

    #[test]
    fn discards_everything_but_counts_it() {
        let mut handler = NullHandler::new(HandlerParam {
            filters: FilterSet::all_all(),
            data_hwm: 8,
            ctrl_hwm: 8,
            ierr_max: 10,
            flush_freq_ms: 1000,
        });
        handler.init().unwrap();
        let record = Record::new(Level::Debug, 1, 1, 0, 0, "f", "g", "app", "hi");
        handler
            .process_log(&record, &record.filename, &record.funcname, &record.loggername, &record.message)
            .unwrap();
        assert_eq!(handler.records_seen(), 1);
    }
}
