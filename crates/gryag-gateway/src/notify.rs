//! Per-user throttle-notice suppression (spec.md §4.1 "Notification
//! suppression", §4.6 step 1, §8 invariant 3). Kept as a single
//! concurrent map local to this crate rather than spread through call
//! sites (spec.md §9's redesign flag for the teacher's cross-cutting
//! state).

use dashmap::DashMap;

use gryag_core::types::UserId;

/// `user_id -> last_error_at` (unix seconds). A throttle outcome only
/// produces a user-visible notice when `now - last_error_at >= window`.
pub struct NotifySuppression {
    last_notified: DashMap<UserId, i64>,
}

impl NotifySuppression {
    pub fn new() -> Self {
        Self {
            last_notified: DashMap::new(),
        }
    }

    /// Returns `true` and records `now` when a notice may be shown; returns
    /// `false` (and leaves the recorded timestamp untouched) when still
    /// within the suppression window.
    pub fn should_notify(&self, user_id: UserId, now: i64, window_secs: u64) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.last_notified.entry(user_id) {
            Entry::Occupied(e) if now - *e.get() < window_secs as i64 => false,
            Entry::Occupied(mut e) => {
                e.insert(now);
                true
            }
            Entry::Vacant(e) => {
                e.insert(now);
                true
            }
        }
    }
}

impl Default for NotifySuppression {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_throttle_always_notifies() {
        let map = NotifySuppression::new();
        assert!(map.should_notify(7, 1_000, 600));
    }

    #[test]
    fn second_throttle_within_window_is_suppressed() {
        let map = NotifySuppression::new();
        assert!(map.should_notify(7, 1_000, 600));
        assert!(!map.should_notify(7, 1_200, 600));
    }

    #[test]
    fn throttle_after_window_elapses_notifies_again() {
        let map = NotifySuppression::new();
        assert!(map.should_notify(7, 1_000, 600));
        assert!(map.should_notify(7, 1_601, 600));
    }

    #[test]
    fn suppression_is_per_user() {
        let map = NotifySuppression::new();
        assert!(map.should_notify(7, 1_000, 600));
        assert!(map.should_notify(8, 1_000, 600));
    }
}
