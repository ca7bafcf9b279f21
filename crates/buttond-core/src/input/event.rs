// Buttond Input Layer - Raw Events
// Decoded input records and event type checking

use std::time::Instant;

/// EV_KEY event type code from input-event-codes.h
pub const EV_KEY: u16 = 0x01;

/// Check if an event is a key event.
///
/// Key events have event.type == EV_KEY (0x01)
pub fn is_key_event(event_type: u16) -> bool {
    event_type == EV_KEY
}

/// One decoded input record, stamped on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp: Instant,
    /// Event type (EV_KEY, EV_SYN, ...)
    pub kind: u16,
    pub code: u16,
    /// 0 = release, 1 = press, 2 = autorepeat
    pub value: i32,
}

impl RawEvent {
    pub fn new(timestamp: Instant, kind: u16, code: u16, value: i32) -> Self {
        Self {
            timestamp,
            kind,
            code,
            value,
        }
    }

    /// Shorthand for an EV_KEY event
    pub fn key(timestamp: Instant, code: u16, value: i32) -> Self {
        Self::new(timestamp, EV_KEY, code, value)
    }

    pub fn is_key(&self) -> bool {
        is_key_event(self.kind)
    }

    pub fn is_press(&self) -> bool {
        self.value != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_key_event_with_ev_key() {
        assert!(is_key_event(EV_KEY));
    }

    #[test]
    fn test_is_key_event_with_other_event() {
        assert!(!is_key_event(0x02)); // EV_REL
        assert!(!is_key_event(0x00)); // EV_SYN
        assert!(!is_key_event(0x04)); // EV_MSC
    }

    #[test]
    fn test_raw_event_helpers() {
        let now = Instant::now();
        let press = RawEvent::key(now, 116, 1);
        assert!(press.is_key());
        assert!(press.is_press());
        assert!(RawEvent::key(now, 116, 2).is_press());
        assert!(!RawEvent::key(now, 116, 0).is_press());
        assert!(!RawEvent::new(now, 0, 0, 0).is_key());
    }
}
