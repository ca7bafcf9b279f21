// Buttond Actions
// Configured short/long press actions and the duration matching policy

use std::fmt;

/// Default threshold for a short press action (milliseconds)
pub const DEFAULT_SHORT_PRESS_MSECS: u64 = 1000;

/// Default threshold for a long press action (milliseconds)
pub const DEFAULT_LONG_PRESS_MSECS: u64 = 5000;

/// Kind of press an action reacts to.
///
/// A short press fires on release if the button was held for less than the
/// trigger time. A long press fires as soon as the button has been held for
/// at least the trigger time, even if it is still down.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumString, strum_macros::IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ActionKind {
    #[strum(serialize = "short")]
    ShortPress,
    #[strum(serialize = "long")]
    LongPress,
}

impl ActionKind {
    /// Threshold used when none is configured
    pub fn default_trigger_ms(self) -> u64 {
        match self {
            ActionKind::ShortPress => DEFAULT_SHORT_PRESS_MSECS,
            ActionKind::LongPress => DEFAULT_LONG_PRESS_MSECS,
        }
    }

    /// Returns true for `LongPress`
    pub fn is_long(self) -> bool {
        matches!(self, ActionKind::LongPress)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}", name)
    }
}

/// A command bound to a key for a given press duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Short or long press
    pub kind: ActionKind,
    /// Cutoff time in milliseconds
    pub trigger_time_ms: u64,
    /// Shell command to run
    pub command: String,
    /// Whether the daemon stops after this action ran
    pub exit_after: bool,
}

impl Action {
    /// Create an action with the default threshold for its kind
    pub fn new(kind: ActionKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            trigger_time_ms: kind.default_trigger_ms(),
            command: command.into(),
            exit_after: false,
        }
    }

    /// Create a short press action
    pub fn short(trigger_time_ms: u64, command: impl Into<String>) -> Self {
        Self::new(ActionKind::ShortPress, command).with_trigger(trigger_time_ms)
    }

    /// Create a long press action
    pub fn long(trigger_time_ms: u64, command: impl Into<String>) -> Self {
        Self::new(ActionKind::LongPress, command).with_trigger(trigger_time_ms)
    }

    /// Set the trigger time
    pub fn with_trigger(mut self, trigger_time_ms: u64) -> Self {
        self.trigger_time_ms = trigger_time_ms;
        self
    }

    /// Mark this action as terminating the daemon
    pub fn with_exit_after(mut self, exit_after: bool) -> Self {
        self.exit_after = exit_after;
        self
    }

    /// Whether this action applies to a press of `elapsed_ms` milliseconds
    pub fn matches(&self, elapsed_ms: u64) -> bool {
        match self.kind {
            ActionKind::LongPress => elapsed_ms >= self.trigger_time_ms,
            ActionKind::ShortPress => elapsed_ms < self.trigger_time_ms,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ms: {}", self.kind, self.trigger_time_ms, self.command)
    }
}

/// Select the action for a press of `elapsed_ms` milliseconds.
///
/// `actions` must be sorted (short press first, then long presses by
/// ascending threshold). The list is scanned from the longest threshold
/// backwards so that the most specific long press wins, while a short press
/// still catches brief presses.
pub fn find_action(actions: &[Action], elapsed_ms: u64) -> Option<&Action> {
    actions.iter().rev().find(|action| action.matches(elapsed_ms))
}
