// Buttond Input Layer
// Raw event records and event type filtering

mod event;

pub use event::{is_key_event, RawEvent, EV_KEY};
