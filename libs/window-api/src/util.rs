/// Resolve a path of literal keys in a `serde_json::Value`.
///
/// Segments are used as-is, so keys that contain dots
/// (`"com.example.events.ContactEvent"`) resolve correctly:
/// - `&["tenantId"]` → `value["tenantId"]`
/// - `&["baseEventData", "com.example.Event", "id"]` → three levels down
///
/// Returns `None` if any segment is missing or a non-object is traversed.
pub fn resolve_path<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
