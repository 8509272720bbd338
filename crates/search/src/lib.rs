//! Multi-provider search aggregation: fan-out, merge, cache, health.

pub mod aggregator;
pub mod cache;
pub mod filter;
pub mod health;
pub mod merge;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use cache::{CacheConfig, CacheStore, PopularQueryRefresher};
pub use health::HealthRegistry;
