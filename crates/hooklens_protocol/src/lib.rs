//! Core data model shared across hooklens crates.
//!
//! Everything the pipeline stages exchange lives here: the payload type tree,
//! redaction reports, persisted schema records, event-log rows, and the
//! queue's job envelope. Pure data + serde, no I/O.

pub mod config;
pub mod defaults;
pub mod naming;
pub mod types;

pub use config::{Config, QueueConfig, StoreConfig, TruncatorConfig};
pub use naming::{interface_ident, pascal_case, sanitize_kind};
pub use types::{
    EventRow, FieldCensus, NodeKind, RedactedField, RedactionReport, RedactionTag, SchemaRecord,
    TypeTree, Variation, WebhookJob,
};
