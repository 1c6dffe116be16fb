//! Logging facilities for Horizon Data.
//!
//! Horizon Data uses the `tracing` crate for instrumentation. The library
//! never installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_data::model=debug,horizon_data::collection=trace")
//!     .init();
//! ```

/// Span names used throughout Horizon Data for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Graph conversion span.
    pub const CONVERT: &str = "horizon_data::convert";
    /// Persistence operation span.
    pub const PERSIST: &str = "horizon_data::persist";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Crate-level target.
    pub const CORE: &str = "horizon_data";
    /// Event substrate target.
    pub const OBSERVABLE: &str = "horizon_data::observable";
    /// Attribute conversion target.
    pub const ATTRIBUTE: &str = "horizon_data::attribute";
    /// Model lifecycle target.
    pub const MODEL: &str = "horizon_data::model";
    /// Collection membership target.
    pub const COLLECTION: &str = "horizon_data::collection";
    /// Native-object conversion target.
    pub const CONVERT: &str = "horizon_data::convert";
    /// Persistence proxy target.
    pub const PROXY: &str = "horizon_data::proxy";
    /// Deferred scheduler target.
    pub const SCHEDULER: &str = "horizon_data::scheduler";
    /// Performance span target.
    pub const PERF: &str = "horizon_data::perf";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// Thin wrappers around the `tracing` macros that log under the crate-level
/// target.
#[macro_export]
macro_rules! data_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! data_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! data_info {
    ($($arg:tt)*) => {
        tracing::info!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! data_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! data_error {
    ($($arg:tt)*) => {
        tracing::error!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
