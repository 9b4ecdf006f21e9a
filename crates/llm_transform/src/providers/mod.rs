//! Vendor/platform identity and per-platform capabilities.

pub mod id;

pub use id::{CacheAccounting, ProviderId};
