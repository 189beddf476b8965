//! Shared data models spanning the service layers.

pub mod blog;
pub mod price;
pub mod region;

pub use blog::{BlogPost, PostInput};
pub use price::{day_floor, day_instant, CompanyKey, PointKey, PricePoint, PriceSeries, SeriesInput};
pub use region::{
    derive_product_from_code, infer_region_from_code, normalize_region, region_sort_key, RegionKey,
    RegionSelector, ALL_REGIONS_KEY,
};
