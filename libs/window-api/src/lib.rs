//! Shared data model of the window reader: raw and user records, cursors,
//! pages, the `StreamService` boundary and its error type.

mod error;
mod stream;
mod types;
mod util;

pub use error::{ServiceError, ServiceErrorKind};
pub use stream::{StreamService, DEFAULT_SHARD_ID};
pub use types::{
    Page, Payload, RawRecord, ShardCursor, StartPosition, UserRecord, INVALID_PAYLOAD_KEY,
};
pub use util::{now_ms, resolve_path};
