//! Local storage and memoization.
//!
//! - `SlotStorage`: the string-keyed blob store behind the session cache,
//!   with `FileStorage` (one file per key) and `MemoryStorage` backends
//! - `TtlCache`: short-lived memoization of GET responses, 30 seconds by
//!   default, driven by an injectable clock

pub mod storage;
pub mod ttl;

pub use storage::{FileStorage, MemoryStorage, SlotStorage};
pub use ttl::{format_age, CachedData, TtlCache, DEFAULT_TTL_SECS};
