use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

// Absolute distance between two millisecond timestamps
pub fn timestamp_distance(a: u64, b: u64) -> Duration {
    Duration::from_millis(a.abs_diff(b))
}
