//! Google Analytics Reporting API adapter.
//!
//! Normalizes metric/dimension specifications and date expressions, drives the
//! paginated `reports:batchGet` loop and materializes the pages into one typed table.

pub mod api;
pub mod auth;
pub mod config;
pub mod debug;
pub mod error;
pub mod fields;
pub mod materialize;
pub mod reporting;
pub mod server;
pub mod table;
