//! Session-scoped, TTL-bound persistence for birth data and chart ids.
//!
//! A [`SessionStore`] keeps exactly one "current" birth record in a
//! versioned envelope of canonical keys, next to the chart id computed for
//! it. Records are validated before they are written, fingerprinted so a
//! stale chart id is dropped when the identity changes, and expire a fixed
//! time after their last write. Records left under older key layouts are
//! migrated on first read.
//!
//! # Quick Start
//!
//! ```ignore
//! use chart_cache::prelude::*;
//! use serde_json::json;
//!
//! let store = SessionStore::in_memory(StoreConfig::default());
//!
//! store.set_birth_data(&json!({
//!     "name": "Test Person",
//!     "dateOfBirth": "1990-01-01",
//!     "timeOfBirth": "12:00",
//!     "latitude": 19.076,
//!     "longitude": 72.8777,
//!     "timezone": "Asia/Kolkata"
//! }))?;
//! store.set_chart_id("chart_12345")?;
//!
//! let meta = store.get_meta().expect("fresh envelope");
//! assert_eq!(meta.schema_version, "2");
//! ```
//!
//! # Modules
//!
//! - [`store`] - The session store and its outcome types
//! - [`storage`] - Storage scopes: in-memory, fjall-backed, unavailable
//! - [`keys`] - Registry of every key the store reads or writes
//! - [`record`] - Birth record validation
//! - [`fingerprint`] - Deterministic record fingerprints
//! - [`ttl`] - Clocks and freshness evaluation
//! - [`config`] - TOML configuration
//!
//! # Feature Flags
//!
//! - `durable` - Enable the fjall-backed storage scope (enabled by default)
//! - `logging` - Enable library-level tracing (enabled by default; consumers provide their own subscriber)
//! - `cli` - Enable the command-line interface binary
//! - `full` - Enable all features

mod logging;

pub mod config;
pub mod envelope;
mod error;
pub mod fingerprint;
pub mod keys;
pub mod prelude;
pub mod record;
pub mod storage;
pub mod store;
pub mod ttl;

// Re-export the unified error type
pub use error::{Error, Result};

pub use config::{Config, ConfigError, StoreConfig};
pub use envelope::{Envelope, EnvelopeMeta, Lookup};
pub use fingerprint::Fingerprint;
pub use record::{BirthRecord, ValidationError};
pub use storage::{MemoryScope, StorageError, StorageScope, UnavailableScope};
pub use store::{AnalysisKind, SaveFailure, SessionStore};
pub use ttl::{Clock, ManualClock, SystemClock};

#[cfg(feature = "durable")]
pub use storage::FjallScope;
