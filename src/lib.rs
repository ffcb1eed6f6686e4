//! A thread-per-handler structured logging library.
//!
//! Business threads format [`Record`](record::Record)s through a
//! thread-local [`producer`] endpoint and hand them to a [`bus`]; each
//! configured handler (§4.G) runs on its own OS thread, driven by the
//! runtime in [`handler`], reading from that bus and writing to its own
//! sink. A single process-wide [`coordinator::Coordinator`] starts,
//! flushes, and tears the whole thing down.
//!
//! # Example
//!
//! ```no_run
//! use threadlog::coordinator::{global, HandlerSpec};
//! use threadlog::config::Config;
//! use threadlog::filter::FilterSet;
//! use threadlog::handler::contract::HandlerParam;
//! use threadlog::handler::null::NullHandler;
//! use threadlog::level::Level;
//! use threadlog::log_info;
//!
//! let param = HandlerParam {
//!     filters: FilterSet::all_output(),
//!     data_hwm: 256,
//!     ctrl_hwm: 16,
//!     ierr_max: 100,
//!     flush_freq_ms: 1000,
//! };
//! global()
//!     .init(
//!         Config::default(),
//!         vec![HandlerSpec {
//!             contract: Box::new(NullHandler::new(param.clone())),
//!             param,
//!         }],
//!     )
//!     .unwrap();
//!
//! let logger = global().registry().get("app.main");
//! log_info!(logger, "hello at {}", Level::Info);
//!
//! global().finalize().unwrap();
//! ```

#[macro_use]
pub mod macros;

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod diag;
pub mod error;
pub mod exit;
pub mod filter;
pub mod handler;
pub mod level;
pub mod producer;
pub mod record;
pub mod registry;
pub mod report;
pub mod signal;

pub use error::{Error, Result};
pub use level::Level;
pub use producer::set_thread_rank;
pub use registry::{Logger, LoggerRef};
