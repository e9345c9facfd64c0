//! # Ingest Events
//!
//! This crate defines the records produced from raw message-bus frames and the
//! decode chain that produces them.
//!
//! A frame is never dropped: every payload yields at least one `IngestRecord`,
//! either decoded JSON or the raw bytes preserved as hex.

// Declare the modules that make up this crate.
pub mod decoder;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use decoder::{decode_bodies, decode_payload};
pub use messages::{IngestRecord, RawFormat, RecordBody};
