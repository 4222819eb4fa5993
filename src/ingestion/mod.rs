//! Data ingestion module - functional pipeline for NYC 311 service requests

pub mod clean;
pub mod fetch;
pub mod types;
pub mod utils;
pub mod write;

pub use types::*;
