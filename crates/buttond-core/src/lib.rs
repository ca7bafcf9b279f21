// Buttond Core Library
// Short/long press detection for input device buttons

pub mod action;
pub mod config;
pub mod controller;
pub mod exec;
pub mod input;
pub mod key;
pub mod machine;
pub mod scheduler;

#[cfg(feature = "evdev")]
pub mod event;

pub use action::{find_action, Action, ActionKind};
pub use config::{ActionTable, ActionTableBuilder, Config, ConfigError};
pub use controller::{Controller, Dispatch, FireOutcome};
pub use exec::{CommandExecutor, ExecMode, RecordingExecutor, ShellExecutor};
pub use input::{is_key_event, RawEvent};
pub use key::{KeyParseError, KeySpec};
pub use machine::{Firing, KeyMachine, KeyState, DEBOUNCE_MSECS};
pub use scheduler::{next_wait, poll_timeout_ms};

#[cfg(feature = "evdev")]
pub use event::{EventLoop, EventLoopError, EventLoopResult};
