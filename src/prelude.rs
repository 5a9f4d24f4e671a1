//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```ignore
//! use chart_cache::prelude::*;
//!
//! let store = SessionStore::open(".chart-cache", StoreConfig::default())?;
//! if let Some(envelope) = store.get_birth_data() {
//!     println!("{}", envelope.meta.fingerprint);
//! }
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Store and its outcomes
pub use crate::envelope::{Envelope, EnvelopeMeta, Lookup};
pub use crate::store::{
    AnalysisKind, CleanupOptions, CleanupReport, Diagnostics, IntegrityIssue, IntegrityReport,
    LastChart, LoadedSession, SaveFailure, SessionSaved, SessionStore,
};

// Records and configuration
pub use crate::config::{Config, StoreConfig};
pub use crate::fingerprint::Fingerprint;
pub use crate::record::{BirthRecord, ValidationError};

// Storage scopes
#[cfg(feature = "durable")]
pub use crate::storage::FjallScope;
pub use crate::storage::{MemoryScope, StorageError, StorageScope, UnavailableScope};
pub use crate::ttl::{Clock, ManualClock, SystemClock};
