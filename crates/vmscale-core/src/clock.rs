//! Wall-clock time in whole seconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in epoch seconds. A clock set before 1970 reads as zero.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
