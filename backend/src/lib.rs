//! DISE video analysis backend
//!
//! Accepts a sleep endoscopy video, forwards it to the Gemini API, waits for
//! the vendor to process it and returns a structured obstruction report.

#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

/// Upload, polling, inference and cleanup pipeline
pub mod analysis;

/// Gemini REST API client
pub mod gemini_api;

/// S3-backed storage for the large-file path
pub mod media_storage;

/// HTTP routes
pub mod routes;

/// Server bootstrap
pub mod server;

/// Shared API types, errors and configuration
pub mod types;
