//! Skill-Shadow — a small notebook service for "thought traces".
//!
//! A thought trace records an error signature, how it was resolved, which files
//! changed, and who fixed it. Traces are submitted over HTTP, kept in a flat JSON file,
//! and found again either by case-insensitive substring match or by semantic
//! nearest-neighbor search over sentence embeddings.
//!
//! # Architecture
//!
//! - **Trace store**: one JSON array on disk, rewritten in full on every save
//! - **Vector index**: a flat, exhaustive-scan L2 index persisted as one binary file;
//!   vector *i* belongs to trace *i*
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Transport**: JSON over HTTP via axum
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`error`] — Error taxonomy and the crate `Result` alias
//! - [`trace`] — Trace records and the JSON trace store
//! - [`index`] — Flat vector index and its file format
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`server`] — Service context, router, and HTTP handlers

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod server;
pub mod trace;
