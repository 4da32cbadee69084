//! Wall-clock access in one place so tests can reason about it explicitly
//! rather than each module reaching for `SystemTime` directly.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}
