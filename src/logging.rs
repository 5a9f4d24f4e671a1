//! Store events, emitted through `tracing` when the `logging` feature is on.
//!
//! Events the store emits, by level:
//!
//! - `error`: a canonical write failed and canonical state was cleared
//!   (`key`, `error` fields).
//! - `warn`: a rejected birth record, a corrupt or foreign-schema
//!   envelope, a dropped legacy payload, a quota hit (`swept`), or a
//!   best-effort mirror write that failed.
//! - `info`: a record stored (`fingerprint`, `saved_at`), migrated
//!   (`source`), expired (`age_secs`) or cleared wholesale, and preference
//!   sweeps (`removed`), durable scopes opened (`path`, `scope`).
//! - `debug`: chart ids, session ids, dropped chart ids.
//! - `trace`: individual durable scope writes.
//!
//! Without the feature every event compiles away and the embedding
//! application never pays for a subscriber it did not install.

/// Forward to the `tracing` macro named by `$level`.
#[cfg(feature = "logging")]
macro_rules! store_event {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! store_event {
    ($level:ident, $($arg:tt)*) => {};
}

macro_rules! log_trace {
    ($($arg:tt)*) => { $crate::logging::store_event!(trace, $($arg)*) };
}

macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::logging::store_event!(debug, $($arg)*) };
}

macro_rules! log_info {
    ($($arg:tt)*) => { $crate::logging::store_event!(info, $($arg)*) };
}

macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::logging::store_event!(warn, $($arg)*) };
}

macro_rules! log_error {
    ($($arg:tt)*) => { $crate::logging::store_event!(error, $($arg)*) };
}

pub(crate) use log_debug as debug;
pub(crate) use log_error as error;
pub(crate) use log_info as info;
pub(crate) use log_trace as trace;
pub(crate) use log_warn as warn;
pub(crate) use store_event;
