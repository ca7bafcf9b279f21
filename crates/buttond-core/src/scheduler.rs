// Buttond Deadline Scheduler
// Earliest-deadline computation bounding the multiplexed wait

use std::time::{Duration, Instant};

use crate::machine::KeyMachine;

/// Time until the earliest pending wakeup among `keys`.
///
/// Deadlines already in the past count as zero. Returns `None` when no key
/// has a pending wakeup, meaning the caller may block indefinitely.
pub fn next_wait<'a>(keys: impl IntoIterator<Item = &'a KeyMachine>, now: Instant) -> Option<Duration> {
    let wait = keys
        .into_iter()
        .filter_map(KeyMachine::wakeup)
        .map(|deadline| deadline.saturating_duration_since(now))
        .min();

    match wait {
        Some(wait) => log::trace!("wakeup scheduled in {:?}", wait),
        None => log::trace!("no wakeup scheduled"),
    }
    wait
}

/// Convert a wait to a `poll(2)` timeout in milliseconds.
///
/// `None` maps to -1 (infinite). Sub-millisecond remainders round up so the
/// loop never wakes before a deadline and spins with a zero timeout.
pub fn poll_timeout_ms(wait: Option<Duration>) -> i32 {
    match wait {
        None => -1,
        Some(wait) => {
            let micros = wait.as_micros();
            let millis = micros.div_ceil(1000);
            i32::try_from(millis).unwrap_or(i32::MAX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use smallvec::smallvec;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn long_key(code: u16, trigger: u64) -> KeyMachine {
        KeyMachine::new(code, None, smallvec![Action::long(trigger, "x")], ms(10))
    }

    #[test]
    fn test_idle_blocks_indefinitely() {
        let keys = vec![long_key(1, 1000), long_key(2, 2000)];
        assert_eq!(next_wait(&keys, Instant::now()), None);
        assert_eq!(next_wait(std::iter::empty(), Instant::now()), None);
    }

    #[test]
    fn test_minimum_deadline_wins() {
        let t0 = Instant::now();
        let mut keys = vec![long_key(1, 3000), long_key(2, 1000)];
        keys[0].handle_event(t0, 1);
        keys[1].handle_event(t0, 1);
        assert_eq!(next_wait(&keys, t0 + ms(200)), Some(ms(800)));
    }

    #[test]
    fn test_due_deadline_returns_zero() {
        let t0 = Instant::now();
        let mut keys = vec![long_key(1, 100), long_key(2, 5000)];
        keys[0].handle_event(t0, 1);
        keys[1].handle_event(t0, 1);
        assert_eq!(next_wait(&keys, t0 + ms(100)), Some(Duration::ZERO));
        assert_eq!(next_wait(&keys, t0 + ms(300)), Some(Duration::ZERO));
    }

    #[test]
    fn test_poll_timeout_conversion() {
        assert_eq!(poll_timeout_ms(None), -1);
        assert_eq!(poll_timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(poll_timeout_ms(Some(ms(15))), 15);
        assert_eq!(poll_timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(poll_timeout_ms(Some(Duration::from_micros(2500))), 3);
        assert_eq!(poll_timeout_ms(Some(Duration::from_secs(u64::MAX / 2))), i32::MAX);
    }
}
