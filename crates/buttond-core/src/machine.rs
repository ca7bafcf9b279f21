// Buttond Key State Machine
// Per-key press/debounce tracking and timer-driven action decisions

use std::fmt;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::action::{find_action, Action, ActionKind};
use crate::key::key_name;

/// Default debounce window (milliseconds)
pub const DEBOUNCE_MSECS: u64 = 10;

/// Sorted action list of a key. Keys rarely have more than a short and a
/// long action.
pub type ActionList = SmallVec<[Action; 2]>;

/// Press state of a single key.
///
/// - `Released` / `Pressed`: physical state
/// - `Debounce`: released less than the debounce window ago; a new press
///   continues the previous one
/// - `Handled`: a long press already fired, ignore until the release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyState {
    #[default]
    Released,
    Pressed,
    Debounce,
    Handled,
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Released => write!(f, "released"),
            KeyState::Pressed => write!(f, "pressed"),
            KeyState::Debounce => write!(f, "debounce"),
            KeyState::Handled => write!(f, "handled"),
        }
    }
}

/// Decision to run an action, produced when a key's timer expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    /// Key code that triggered the action
    pub code: u16,
    /// Configured key name, if any
    pub key_name: Option<String>,
    /// Command to run
    pub command: String,
    /// Whether the daemon stops after running the command
    pub exit_after: bool,
    /// Matched press duration in milliseconds
    pub elapsed_ms: u64,
}

/// State machine of one monitored key.
#[derive(Debug, Clone)]
pub struct KeyMachine {
    code: u16,
    name: Option<String>,
    actions: ActionList,
    debounce: Duration,
    state: KeyState,
    pressed_at: Option<Instant>,
    released_at: Option<Instant>,
    wakeup: Option<Instant>,
}

impl KeyMachine {
    /// Create a machine for `code` with an already sorted action list.
    pub fn new(code: u16, name: Option<String>, actions: ActionList, debounce: Duration) -> Self {
        Self {
            code,
            name,
            actions,
            debounce,
            state: KeyState::Released,
            pressed_at: None,
            released_at: None,
            wakeup: None,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    /// Pending wakeup deadline, if any
    pub fn wakeup(&self) -> Option<Instant> {
        self.wakeup
    }

    /// Name used in log messages
    pub fn label(&self) -> String {
        match self.name.as_deref().or_else(|| key_name(self.code)) {
            Some(name) => format!("{} ({})", name, self.code),
            None => self.code.to_string(),
        }
    }

    /// Handle a raw key event stamped `timestamp`; `value == 0` is a release.
    pub fn handle_event(&mut self, timestamp: Instant, value: i32) {
        match (self.state, value != 0) {
            (KeyState::Released | KeyState::Debounce, true) => {
                // A press during debounce continues the previous press
                if self.state == KeyState::Released || self.pressed_at.is_none() {
                    self.pressed_at = Some(timestamp);
                }
                self.state = KeyState::Pressed;

                // Short press is always sorted first, so the last action is
                // the longest long press if there is any.
                self.wakeup = match (self.actions.last(), self.pressed_at) {
                    (Some(action), Some(pressed_at)) if action.kind == ActionKind::LongPress => {
                        Some(pressed_at + Duration::from_millis(action.trigger_time_ms))
                    }
                    _ => None,
                };
            }
            (KeyState::Pressed, false) => {
                self.state = KeyState::Debounce;
                self.released_at = Some(timestamp);
                self.wakeup = Some(timestamp + self.debounce);
            }
            (KeyState::Handled, false) => {
                self.state = KeyState::Released;
            }
            // repress while down, release while up, anything while handled
            _ => {}
        }
    }

    /// Whether the wakeup deadline is at or before `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.wakeup.is_some_and(|deadline| deadline <= now)
    }

    /// Fire the key's timer if it is due.
    ///
    /// Returns the action to run, if the elapsed press duration matches one.
    pub fn handle_timeout(&mut self, now: Instant) -> Option<Firing> {
        let deadline = self.wakeup?;
        if deadline > now {
            return None;
        }
        log::trace!(
            "key {}: timer {:?} past deadline",
            self.label(),
            now.saturating_duration_since(deadline)
        );

        debug_assert!(
            matches!(self.state, KeyState::Pressed | KeyState::Debounce),
            "timer pending in state {}",
            self.state
        );

        if self.state != KeyState::Debounce {
            // Key still held: artificial release now
            self.released_at = Some(now);
        }

        let elapsed_ms = match (self.pressed_at, self.released_at) {
            (Some(pressed), Some(released)) => {
                released.saturating_duration_since(pressed).as_millis() as u64
            }
            _ => 0,
        };

        let firing = match find_action(&self.actions, elapsed_ms) {
            Some(action) => {
                log::info!("running {} after {} ms", action.command, elapsed_ms);
                Some(Firing {
                    code: self.code,
                    key_name: self.name.clone(),
                    command: action.command.clone(),
                    exit_after: action.exit_after,
                    elapsed_ms,
                })
            }
            None => {
                log::info!("ignoring key {} released after {} ms", self.label(), elapsed_ms);
                None
            }
        };

        self.wakeup = None;
        self.state = if self.state == KeyState::Debounce {
            KeyState::Released
        } else {
            KeyState::Handled
        };

        firing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn short_only() -> KeyMachine {
        KeyMachine::new(116, None, smallvec![Action::short(800, "A")], ms(DEBOUNCE_MSECS))
    }

    fn short_and_long() -> KeyMachine {
        KeyMachine::new(
            116,
            None,
            smallvec![Action::short(800, "A"), Action::long(4000, "B")],
            ms(DEBOUNCE_MSECS),
        )
    }

    #[test]
    fn test_initial_state() {
        let key = short_only();
        assert_eq!(key.state(), KeyState::Released);
        assert_eq!(key.wakeup(), None);
    }

    #[test]
    fn test_press_without_long_action_arms_nothing() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 1);
        assert_eq!(key.state(), KeyState::Pressed);
        assert_eq!(key.wakeup(), None);
    }

    #[test]
    fn test_press_with_long_action_arms_long_deadline() {
        let t0 = Instant::now();
        let mut key = short_and_long();
        key.handle_event(t0, 1);
        assert_eq!(key.wakeup(), Some(t0 + ms(4000)));
    }

    #[test]
    fn test_release_arms_debounce() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(500), 0);
        assert_eq!(key.state(), KeyState::Debounce);
        assert_eq!(key.wakeup(), Some(t0 + ms(510)));
    }

    #[test]
    fn test_short_press_fires_after_debounce() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(500), 0);

        assert_eq!(key.handle_timeout(t0 + ms(505)), None);
        assert_eq!(key.state(), KeyState::Debounce);

        let firing = key.handle_timeout(t0 + ms(510)).expect("short press should fire");
        assert_eq!(firing.command, "A");
        assert_eq!(firing.elapsed_ms, 500);
        assert_eq!(key.state(), KeyState::Released);
        assert_eq!(key.wakeup(), None);
    }

    #[test]
    fn test_repress_while_down_is_ignored() {
        let t0 = Instant::now();
        let mut key = short_and_long();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(100), 2);
        key.handle_event(t0 + ms(200), 1);
        assert_eq!(key.state(), KeyState::Pressed);
        assert_eq!(key.wakeup(), Some(t0 + ms(4000)));
    }

    #[test]
    fn test_release_while_released_is_ignored() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 0);
        assert_eq!(key.state(), KeyState::Released);
        assert_eq!(key.wakeup(), None);
    }

    #[test]
    fn test_long_press_fires_while_held_then_latches() {
        let t0 = Instant::now();
        let mut key = short_and_long();
        key.handle_event(t0, 1);

        let firing = key.handle_timeout(t0 + ms(4000)).expect("long press should fire");
        assert_eq!(firing.command, "B");
        assert_eq!(firing.elapsed_ms, 4000);
        assert_eq!(key.state(), KeyState::Handled);
        assert_eq!(key.wakeup(), None);

        // key repeat while handled
        key.handle_event(t0 + ms(4100), 2);
        assert_eq!(key.state(), KeyState::Handled);

        key.handle_event(t0 + ms(4200), 0);
        assert_eq!(key.state(), KeyState::Released);
        assert_eq!(key.wakeup(), None);
        assert_eq!(key.handle_timeout(t0 + ms(10_000)), None);
    }

    #[test]
    fn test_bounce_keeps_press_origin() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(5), 0);
        key.handle_event(t0 + ms(8), 1);
        assert_eq!(key.state(), KeyState::Pressed);
        // press after bounce cancels the debounce timer
        assert_eq!(key.wakeup(), None);

        key.handle_event(t0 + ms(900), 0);
        // 900 ms is past the 800 ms short threshold
        assert_eq!(key.handle_timeout(t0 + ms(910)), None);
        assert_eq!(key.state(), KeyState::Released);
    }

    #[test]
    fn test_bounce_rearms_long_deadline_from_origin() {
        let t0 = Instant::now();
        let mut key = short_and_long();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(3), 0);
        key.handle_event(t0 + ms(7), 1);
        assert_eq!(key.wakeup(), Some(t0 + ms(4000)));
    }

    #[test]
    fn test_gap_duration_fires_nothing() {
        let t0 = Instant::now();
        let mut key = short_and_long();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(2000), 0);
        assert_eq!(key.handle_timeout(t0 + ms(2010)), None);
        assert_eq!(key.state(), KeyState::Released);
    }

    #[test]
    fn test_late_timer_uses_release_time_in_debounce() {
        let t0 = Instant::now();
        let mut key = short_only();
        key.handle_event(t0, 1);
        key.handle_event(t0 + ms(300), 0);
        // loop woke up very late
        let firing = key.handle_timeout(t0 + ms(5000)).unwrap();
        assert_eq!(firing.elapsed_ms, 300);
    }

    #[test]
    fn test_label_prefers_configured_name() {
        let key = KeyMachine::new(116, Some("pwr".into()), smallvec![], ms(10));
        assert_eq!(key.label(), "pwr (116)");
        let key = KeyMachine::new(116, None, smallvec![], ms(10));
        assert_eq!(key.label(), "POWER (116)");
        let key = KeyMachine::new(4242, None, smallvec![], ms(10));
        assert_eq!(key.label(), "4242");
    }
}
