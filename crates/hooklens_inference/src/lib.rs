//! Structural inference over webhook payloads.
//!
//! The pure, in-memory half of the pipeline: classify JSON values into a
//! closed kind set, fingerprint trees and payloads, redact oversize strings,
//! build type trees, and merge trees while enumerating drift. Nothing here
//! suspends or touches disk.

pub mod analyze;
pub mod detect;
pub mod diff;
pub mod hash;
pub mod merge;
pub mod truncate;

pub use analyze::analyze;
pub use detect::detect;
pub use diff::{diff, is_subset, Difference};
pub use hash::{payload_fingerprint, short_id, similarity, structure_fingerprint};
pub use merge::merge;
pub use truncate::Truncator;
