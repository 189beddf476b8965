//! Price series query and aggregation core.

pub mod aggregation;
pub mod format;
pub mod query;
pub mod shaper;
pub mod snapshot;

pub use aggregation::{run_query, QueryOutcome};
pub use format::{compact_thousands, format_compact_price_range};
pub use query::{PriceQuery, RangeParam};
pub use shaper::{shape, PointDto, SeriesHeader, SeriesPayload};
pub use snapshot::{build_snapshot, sort_snapshot, SnapshotRow};
