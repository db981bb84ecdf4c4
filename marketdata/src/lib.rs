pub mod cache;
pub mod config;
pub mod counters;
pub mod fetch;
pub mod types;

pub use cache::{MarketDataCache, RefreshError};
pub use config::CacheConfig;
pub use fetch::BookFetcher;
pub use types::{BookLevel, BookSnapshot, CacheRead, FreshnessMode, Instrument};
