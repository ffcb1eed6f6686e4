//! Configuration structs recognized by the coordinator constructor (§6).
//!
//! Plain `serde` `Deserialize`/`Serialize` structs with `Default` impls
//! supplying the documented defaults, the same pattern `dqcsim-core`'s
//! `plugin::config` module uses for per-plugin configuration.

use crate::filter::FilterSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default size, in bytes, of a producer endpoint's per-thread format
/// buffer before it must grow.
pub const DEFAULT_TSD_LOG_BUF_SIZE: usize = 128;

/// Default handler dispatch-loop wake period, in milliseconds.
pub const DEFAULT_FLUSH_PERIOD_MS: u64 = 1000;

/// Default number of non-blocking send attempts before a producer
/// degrades to a blocking send.
pub const DEFAULT_RETRIES_MAX: u32 = 3;

/// Default pause between retry attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1;

/// Default bound on a handler's control/data high-water marks.
pub const DEFAULT_HWM: usize = 256;

/// Default cap on total internal errors a handler tolerates before it
/// gives up and exits (§4.F.4).
pub const DEFAULT_IERR_MAX: u32 = 100;

/// Global configuration, independent of any one handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program name, used only for diagnostics (the coordinator's direct
    /// stderr channel).
    pub progname: String,
    pub tsd_log_buf_size: usize,
    pub retries_max: u32,
    pub retry_delay_ms: u64,
    /// Handlers to start, in order; their thread rank equals their index
    /// in this list.
    pub handlers: Vec<HandlerConfig>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            progname: String::new(),
            tsd_log_buf_size: DEFAULT_TSD_LOG_BUF_SIZE,
            retries_max: DEFAULT_RETRIES_MAX,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            handlers: Vec::new(),
        }
    }
}

impl Config {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Per-handler configuration: the shared fields every concrete handler's
/// `HandlerParam` embeds (§11), independent of handler-specific trailing
/// fields such as a file path or network address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub data_hwm: usize,
    pub ctrl_hwm: usize,
    pub ierr_max: u32,
    pub flush_freq_ms: u64,
    #[serde(with = "filter_set_serde")]
    pub filter_set: FilterSet,
}

impl Default for HandlerConfig {
    fn default() -> HandlerConfig {
        HandlerConfig {
            data_hwm: DEFAULT_HWM,
            ctrl_hwm: DEFAULT_HWM,
            ierr_max: DEFAULT_IERR_MAX,
            flush_freq_ms: DEFAULT_FLUSH_PERIOD_MS,
            filter_set: FilterSet::all_output(),
        }
    }
}

impl HandlerConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_freq_ms)
    }
}

/// (De)serializes a [`FilterSet`] through its textual grammar, the same
/// `FromStr`/`Display` round-trip `TeeFile::from_str` uses for its own
/// `<filter>:<file>` syntax.
mod filter_set_serde {
    use super::FilterSet;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &FilterSet, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FilterSet, D::Error> {
        let s = String::deserialize(deserializer)?;
        FilterSet::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.tsd_log_buf_size, 128);
        assert_eq!(cfg.retries_max, 3);
    }

    #[test]
    fn default_handler_config_flush_period_is_one_second() {
        let hc = HandlerConfig::default();
        assert_eq!(hc.flush_period().as_millis(), 1000);
    }

    #[test]
    fn handler_config_round_trips_through_json() {
        let hc = HandlerConfig {
            filter_set: FilterSet::parse("app:DEBUG,:ERROR").unwrap(),
            ..HandlerConfig::default()
        };
        let json = serde_json::to_string(&hc).unwrap();
        let back: HandlerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.filter_set, hc.filter_set);
        assert_eq!(back.ierr_max, hc.ierr_max);
    }
}
