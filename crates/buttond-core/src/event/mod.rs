// Buttond Event Handling
// evdev poll loop feeding the controller

pub mod r#loop;

pub use r#loop::{DeviceInfo, EventLoop, EventLoopError, EventLoopResult, PollOutcome};
