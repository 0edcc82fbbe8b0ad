//! Window engine: reads one shard of a stream over a recent time window,
//! unpacks aggregated envelopes and filters the resulting user records.

pub mod error;
pub mod filter;
pub mod retry;
pub mod walker;
pub mod window;

pub use error::{StatusClass, WindowError};
pub use filter::{Criteria, IdentifierPath, UnionValue};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
pub use walker::{Completion, ShardWalker, TruncationReason, Walk, WalkLimits};
pub use window::{
    window_start_ms, WindowReader, WindowRequest, WindowResult, WindowStats,
    DEFAULT_WINDOW_MINUTES, MAX_WINDOW_MINUTES,
};
