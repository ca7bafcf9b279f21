// Buttond Controller
// Owns all key state machines and exposes the surface driven by the poll loop

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::config::ActionTable;
use crate::exec::CommandExecutor;
use crate::input::RawEvent;
use crate::machine::{Firing, KeyMachine, KeyState, DEBOUNCE_MSECS};
use crate::scheduler;

/// What happened to an event handed to `Controller::feed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Forwarded to the key's state machine
    Processed,
    /// Key event for a code without configured actions
    Unconfigured,
    /// Not a key event
    NotKey,
}

/// Result of running due timers through an executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireOutcome {
    /// Number of commands handed to the executor
    pub fired: usize,
    /// An action with `exit_after` ran
    pub exit_requested: bool,
}

/// Press tracking for every configured key.
///
/// Keys are kept in configuration order, which is also the order their
/// timers are retired in within one wakeup.
#[derive(Debug, Clone)]
pub struct Controller {
    keys: IndexMap<u16, KeyMachine>,
}

impl Controller {
    /// Create a controller with the default debounce window
    pub fn new(table: ActionTable) -> Self {
        Self::with_debounce(table, Duration::from_millis(DEBOUNCE_MSECS))
    }

    pub fn with_debounce(table: ActionTable, debounce: Duration) -> Self {
        let keys = table
            .into_iter()
            .map(|entry| {
                let machine = KeyMachine::new(entry.code, entry.name, entry.actions, debounce);
                (entry.code, machine)
            })
            .collect();
        Self { keys }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, code: u16) -> Option<&KeyMachine> {
        self.keys.get(&code)
    }

    /// Current state of `code`, if configured
    pub fn state(&self, code: u16) -> Option<KeyState> {
        self.keys.get(&code).map(KeyMachine::state)
    }

    /// Route one raw event to its key.
    pub fn feed(&mut self, event: &RawEvent) -> Dispatch {
        if !event.is_key() {
            log::trace!(
                "{} {} {}: non-keyboard event ignored",
                event.kind,
                event.code,
                event.value
            );
            return Dispatch::NotKey;
        }

        let Some(key) = self.keys.get_mut(&event.code) else {
            log::debug!(
                "{} {}: ignored",
                event.code,
                if event.is_press() { "pressed" } else { "released" }
            );
            return Dispatch::Unconfigured;
        };

        log::info!(
            "{} {}: processing",
            key.label(),
            if event.is_press() { "pressed" } else { "released" }
        );
        key.handle_event(event.timestamp, event.value);
        Dispatch::Processed
    }

    /// Fire every timer due at `now` and collect the resulting actions.
    pub fn retire_due_timers(&mut self, now: Instant) -> Vec<Firing> {
        self.keys
            .values_mut()
            .filter(|key| key.is_due(now))
            .filter_map(|key| key.handle_timeout(now))
            .collect()
    }

    /// Time until the next timer is due; `None` when nothing is pending
    pub fn next_wait(&self, now: Instant) -> Option<Duration> {
        scheduler::next_wait(self.keys.values(), now)
    }

    /// Retire due timers and run the resulting commands through `executor`.
    ///
    /// Executor failures are logged; the key transition is complete either way.
    pub fn fire_due<E: CommandExecutor + ?Sized>(
        &mut self,
        now: Instant,
        executor: &mut E,
    ) -> FireOutcome {
        let mut outcome = FireOutcome::default();
        for firing in self.retire_due_timers(now) {
            if let Err(e) = executor.execute(&firing) {
                log::error!("failed to run '{}': {}", firing.command, e);
            }
            outcome.fired += 1;
            outcome.exit_requested |= firing.exit_after;
        }
        outcome
    }
}
