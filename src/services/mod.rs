//! Service-layer seams between HTTP handlers and persistence.

pub mod price_store;

pub use price_store::{MemoryPriceStore, PointFilter, PriceStore};
