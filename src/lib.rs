// Eventgen - Synthetic User Lifecycle Event Stream
// Exposes all modules for use in the CLI and tests

pub mod catalog;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod fabricate;
pub mod payload;
pub mod resolver;
pub mod sink;

// Re-export commonly used types
pub use catalog::{EventCatalog, EventKind, DEFAULT_WEIGHTS};
pub use config::{Credentials, ARCHIVE_ROOT, DB_PATH, STREAM_PATH};
pub use db::RelationalTarget;
pub use driver::{StreamConfig, StreamDriver, StreamStats};
pub use error::StreamError;
pub use payload::{EventPayload, PayloadBuilder, DEFAULT_DEPOSIT_CAP_CENTS};
pub use resolver::{DependencyResolver, Resolution};
pub use sink::{archive_key, ArchiveTarget, EventSink, StreamTarget};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
