//! Small helpers shared by the remote clients, store, and executor.

/// Clamp remote error text to a length safe for audit rows and logs.
///
/// Remote endpoints occasionally echo entire HTML error pages; anything past
/// 200 characters is cut and marked with a trailing ellipsis.
pub fn clamp_message(text: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = text.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut clamped: String = trimmed.chars().take(LIMIT).collect();
    clamped.push_str("...");
    clamped
}

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
