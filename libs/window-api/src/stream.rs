use std::future::Future;
use std::pin::Pin;

use crate::{Page, ServiceError, ShardCursor, StartPosition};

// ════════════════════════════════════════════════════════════════
//  Stream Service
// ════════════════════════════════════════════════════════════════

/// Shard id of the first (and, for single-shard streams, only) shard.
pub const DEFAULT_SHARD_ID: &str = "shardId-000000000000";

/// Клиент stream service'а (Kinesis-подобного).
///
/// Engine владеет только этим трейтом; транспорт, пул соединений и
/// аутентификация остаются за реализацией.
///
/// Реализации: `MemoryStreamService` (stream-memory), тестовые заглушки.
pub trait StreamService: Send + Sync {
    /// Получить cursor на позицию в shard'е.
    ///
    /// Неизвестный stream → `ServiceErrorKind::UnknownStream`.
    fn get_cursor(
        &self,
        stream: &str,
        shard_id: &str,
        position: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, ServiceError>> + Send + '_>>;

    /// Прочитать следующую страницу (не более `limit` записей).
    fn get_page(
        &self,
        cursor: &ShardCursor,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Page, ServiceError>> + Send + '_>>;
}
