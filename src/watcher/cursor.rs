//! # Event cursor.
//!
//! The platform returns events *at or after* a start time, so the newest events
//! of the previous fetch come back again. [`EventCursor`] remembers the newest
//! timestamp seen and which events at exactly that timestamp were already
//! emitted, so every platform event is relayed once.
//!
//! ```text
//! fetch #1 (newest first): [t3 c] [t2 b] [t1 a]      → emit a, b, c   cursor=t3{c}
//! fetch #2 since t3:       [t4 e] [t3 d] [t3 c]      → emit d, e      cursor=t4{e}
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::platform::PlatformEvent;

/// Monotonic position in an environment's event log.
#[derive(Clone, Debug, Default)]
pub struct EventCursor {
    last_seen: Option<DateTime<Utc>>,
    seen_at_last: HashSet<(String, String)>,
}

impl EventCursor {
    /// Positions the cursor on the newest pre-existing event (if any), which is
    /// treated as already emitted.
    pub fn seeded(newest: Option<&PlatformEvent>) -> Self {
        let mut cursor = Self::default();
        if let Some(ev) = newest {
            cursor.last_seen = Some(ev.at);
            cursor.seen_at_last.insert(fingerprint(ev));
        }
        cursor
    }

    /// Positions the cursor at `at` with nothing emitted yet.
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            last_seen: Some(at),
            seen_at_last: HashSet::new(),
        }
    }

    /// Start time for the next fetch.
    #[inline]
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Takes one fetch result (newest first) and returns the events not emitted
    /// before, oldest first, advancing the cursor past them.
    pub fn admit(&mut self, newest_first: Vec<PlatformEvent>) -> Vec<PlatformEvent> {
        let mut fresh = Vec::new();
        for ev in newest_first.into_iter().rev() {
            match self.last_seen {
                Some(last) if ev.at < last => continue,
                Some(last) if ev.at == last => {
                    if !self.seen_at_last.insert(fingerprint(&ev)) {
                        continue;
                    }
                }
                _ => {
                    self.last_seen = Some(ev.at);
                    self.seen_at_last.clear();
                    self.seen_at_last.insert(fingerprint(&ev));
                }
            }
            fresh.push(ev);
        }
        fresh
    }
}

fn fingerprint(ev: &PlatformEvent) -> (String, String) {
    (ev.severity.clone(), ev.message.clone())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn ev(secs: i64, msg: &str) -> PlatformEvent {
        PlatformEvent::new(at(secs), "INFO", msg)
    }

    fn messages(events: &[PlatformEvent]) -> Vec<&str> {
        events.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn overlapping_fetches_emit_each_event_once() {
        let mut cursor = EventCursor::seeded(Some(&ev(1, "seed")));

        let first = cursor.admit(vec![ev(3, "c"), ev(2, "b"), ev(1, "seed")]);
        assert_eq!(messages(&first), ["b", "c"]);
        assert_eq!(cursor.since(), Some(at(3)));

        let second = cursor.admit(vec![ev(4, "e"), ev(3, "d"), ev(3, "c")]);
        assert_eq!(messages(&second), ["d", "e"]);

        let third = cursor.admit(vec![ev(4, "e")]);
        assert!(third.is_empty());
        assert_eq!(cursor.since(), Some(at(4)));
    }

    #[test]
    fn never_moves_backwards() {
        let mut cursor = EventCursor::starting_at(at(10));
        let fresh = cursor.admit(vec![ev(11, "new"), ev(9, "stale")]);
        assert_eq!(messages(&fresh), ["new"]);
        assert_eq!(cursor.since(), Some(at(11)));
    }

    #[test]
    fn empty_seed_accepts_everything() {
        let mut cursor = EventCursor::seeded(None);
        assert_eq!(cursor.since(), None);
        let fresh = cursor.admit(vec![ev(2, "b"), ev(1, "a")]);
        assert_eq!(messages(&fresh), ["a", "b"]);
    }
}
