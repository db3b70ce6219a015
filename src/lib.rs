//! Load-generation worker for realtime pub/sub services.
//!
//! The heart of the crate is the latency histogram engine in
//! [`metrics`]: a fixed-width linear-bucket histogram with
//! deterministic percentile computation and a binary stream codec
//! for persisting labelled histograms to `.hist` files. Around it
//! sit the recorder actor that serializes all histogram writes, a
//! synthetic load generator, and the shutdown report/upload path.

pub mod config;
pub mod load_generator;
pub mod metrics;
pub mod pubsub_client;
pub mod report;
pub mod uploader;
