//! Receipt enhancement and OCR server
//!
//! Ingests photographed receipts, enhances them for recognition, extracts
//! structured expense data, and persists records to a key-value store.

pub mod config;
pub mod engine;
pub mod engines;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod ocr;
pub mod server;
pub mod store;
