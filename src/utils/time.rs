use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall-clock milliseconds since the unix epoch, as carried by samples and records.
pub type Timestamp = u64;

pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// return millisecond
pub fn now_ms() -> Timestamp {
    get_duration_since_epoch().as_millis() as Timestamp
}

/// Milliseconds elapsed between `since` and `now`; 0 when `since` lies in the future.
pub fn elapsed_ms(
    since: Timestamp,
    now: Timestamp,
) -> u64 {
    now.saturating_sub(since)
}
