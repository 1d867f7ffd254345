//! Foundational utilities shared across forgegram crates.
//!
//! Provides the expiring concurrent map backing every ephemeral state table,
//! the clock abstraction it reads time through, atomic file-write helpers, and
//! time utilities used by expiry calculations.

pub mod atomic_io;
pub mod time_utils;
pub mod ttl_store;

pub use atomic_io::write_text_atomic;
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, deadline_after, is_expired_unix_ms,
};
pub use ttl_store::{Clock, ManualClock, SystemClock, TtlStore};
