//! banggia: price-data publishing backend
//!
//! A public JSON API over commodity price series (per-region time series,
//! multi-region comparison, company snapshots), a blog read API, and a
//! passcode-gated admin API, backed by Postgres.

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod prices;
pub mod services;
