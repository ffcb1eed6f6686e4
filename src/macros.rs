//! Per-level logging macros (§11), plus `assert!`/`unreachable!` glue that
//! renders and logs an [`Error`](crate::error::Error) before panicking.
//!
//! One generic `log!` macro captures file/line and formats the message;
//! each per-level macro (`panic!`/`alert!`/`critical!`/.../`trace!`)
//! delegates to it with its [`Level`](crate::level::Level) baked in,
//! taking any expression that resolves to a
//! [`Logger`](crate::registry::Logger) or [`LoggerRef`](crate::registry::LoggerRef).

#[macro_export]
macro_rules! log {
    ($logger:expr, $lvl:expr, $($arg:tt)+) => {{
        let logger: &$crate::registry::Logger = $crate::registry::LoggerRef::as_logger(&$logger);
        if logger.is_enabled_for($lvl) {
            $crate::producer::log(logger, $lvl, file!(), module_path!(), line!(), format_args!($($arg)+));
        }
    }};
}

#[macro_export]
macro_rules! log_panic {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Panic, $($arg)+) };
}

#[macro_export]
macro_rules! log_alert {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Alert, $($arg)+) };
}

#[macro_export]
macro_rules! log_critical {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Critical, $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! log_warning {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Warning, $($arg)+) };
}

#[macro_export]
macro_rules! log_notice {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Notice, $($arg)+) };
}

#[macro_export]
macro_rules! log_output {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Output, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! log_fine {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Fine, $($arg)+) };
}

#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Trace, $($arg)+) };
}

#[macro_export]
macro_rules! log_lowest {
    ($logger:expr, $($arg:tt)+) => { $crate::log!($logger, $crate::level::Level::Lowest, $($arg)+) };
}

/// Logs the rendered error at [`Level::Panic`](crate::level::Level) and
/// panics, the macro equivalent of `BXIASSERT`/`BXIEXIT` combined for
/// call sites that need to unwind rather than exit the process outright.
#[macro_export]
macro_rules! log_assert {
    ($logger:expr, $cond:expr, $($arg:tt)+) => {{
        if !($cond) {
            let err = $crate::error::Error::new($crate::error::codes::ASSERT, format!($($arg)+));
            err.report($crate::registry::LoggerRef::as_logger(&$logger), $crate::level::Level::Panic);
            panic!("assertion failed: {}", stringify!($cond));
        }
    }};
}

/// Logs at [`Level::Panic`](crate::level::Level) and panics; for code
/// paths the caller has proven unreachable, grounded in
/// `BXIUNREACHABLE_STATEMENT`.
#[macro_export]
macro_rules! log_unreachable {
    ($logger:expr) => {{
        let err = $crate::error::Error::new($crate::error::codes::UNREACHABLE, "entered unreachable code");
        err.report($crate::registry::LoggerRef::as_logger(&$logger), $crate::level::Level::Panic);
        unreachable!();
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let err = $crate::error::Error::new($crate::error::codes::UNREACHABLE, format!($($arg)+));
        err.report($crate::registry::LoggerRef::as_logger(&$logger), $crate::level::Level::Panic);
        unreachable!($($arg)+);
    }};
}
