use std::fmt;

use serde::Serialize;

/// Snapshot of a limiter slot set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    /// Maximum number of concurrent holders
    pub capacity: usize,
    /// Slots currently held
    pub held: usize,
    /// Acquire attempts currently in flight
    pub queued: usize,
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.queued > 0 {
            write!(
                f,
                "{{Cap:{}, Taken:{}, Queued:{}}}",
                self.capacity, self.held, self.queued
            )
        } else {
            write!(f, "{{Cap:{}, Taken:{}}}", self.capacity, self.held)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_empty_queue() {
        let info = LockInfo {
            capacity: 2,
            held: 1,
            queued: 0,
        };
        assert_eq!(info.to_string(), "{Cap:2, Taken:1}");
    }

    #[test]
    fn test_display_with_queue() {
        let info = LockInfo {
            capacity: 2,
            held: 2,
            queued: 3,
        };
        assert_eq!(info.to_string(), "{Cap:2, Taken:2, Queued:3}");
    }
}
