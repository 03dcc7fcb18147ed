//! Wall-clock helpers and message id generation.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Returns 0 if the clock is before 1970.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Produces `msg-<unix millis>` ids. Two ids requested within the same
/// millisecond (or after the clock stepped back) are bumped past the last one
/// handed out, so ids from one generator never repeat.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: u64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> String {
        let now = current_timestamp_millis();
        let stamp = if now > self.last { now } else { self.last + 1 };
        self.last = stamp;
        format!("msg-{stamp}")
    }
}
