//! Shared services injected into screens.

mod cache;

pub use cache::{CacheChange, ChangeCause, SharedCache};
