// Buttond Key Codes
// Key code parsing from numeric values or input-event-codes.h names

use std::fmt;
use std::str::FromStr;

/// Names of the key codes most commonly found on buttons and small
/// keypads, from Linux input-event-codes.h.
const KEY_NAMES: &[(&str, u16)] = &[
    ("ESC", 1),
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("0", 11),
    ("BACKSPACE", 14),
    ("TAB", 15),
    ("ENTER", 28),
    ("LEFTCTRL", 29),
    ("A", 30),
    ("LEFTSHIFT", 42),
    ("LEFTALT", 56),
    ("SPACE", 57),
    ("F1", 59),
    ("F2", 60),
    ("F3", 61),
    ("F4", 62),
    ("F5", 63),
    ("F6", 64),
    ("F7", 65),
    ("F8", 66),
    ("F9", 67),
    ("F10", 68),
    ("F11", 87),
    ("F12", 88),
    ("HOME", 102),
    ("UP", 103),
    ("LEFT", 105),
    ("RIGHT", 106),
    ("END", 107),
    ("DOWN", 108),
    ("MUTE", 113),
    ("VOLUMEDOWN", 114),
    ("VOLUMEUP", 115),
    ("POWER", 116),
    ("PAUSE", 119),
    ("STOP", 128),
    ("AGAIN", 129),
    ("MENU", 139),
    ("CALC", 140),
    ("SETUP", 141),
    ("SLEEP", 142),
    ("WAKEUP", 143),
    ("PROG1", 148),
    ("PROG2", 149),
    ("WWW", 150),
    ("MAIL", 155),
    ("BACK", 158),
    ("FORWARD", 159),
    ("EJECTCD", 161),
    ("NEXTSONG", 163),
    ("PLAYPAUSE", 164),
    ("PREVIOUSSONG", 165),
    ("STOPCD", 166),
    ("RECORD", 167),
    ("REWIND", 168),
    ("PHONE", 169),
    ("CONFIG", 171),
    ("HOMEPAGE", 172),
    ("REFRESH", 173),
    ("EXIT", 174),
    ("PROG3", 202),
    ("PROG4", 203),
    ("SUSPEND", 205),
    ("CLOSE", 206),
    ("PLAY", 207),
    ("PRINT", 210),
    ("CAMERA", 212),
    ("SEARCH", 217),
    ("BRIGHTNESSDOWN", 224),
    ("BRIGHTNESSUP", 225),
    ("MEDIA", 226),
    ("BATTERY", 236),
    ("BLUETOOTH", 237),
    ("WLAN", 238),
    ("UNKNOWN", 240),
    ("RESTART", 0x198),
    ("BTN_0", 0x100),
    ("BTN_1", 0x101),
    ("BTN_2", 0x102),
    ("BTN_3", 0x103),
    ("BTN_LEFT", 0x110),
    ("BTN_RIGHT", 0x111),
    ("BTN_MIDDLE", 0x112),
    ("BTN_SOUTH", 0x130),
    ("BTN_EAST", 0x131),
    ("BTN_NORTH", 0x133),
    ("BTN_WEST", 0x134),
    ("BTN_SELECT", 0x13a),
    ("BTN_START", 0x13b),
    ("BTN_MODE", 0x13c),
];

/// Look up a key code by name.
///
/// Names are case-insensitive and accept an optional `KEY_` prefix, so
/// `power`, `POWER` and `KEY_POWER` all resolve to 116. Button names keep
/// their `BTN_` prefix.
pub fn key_from_name(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("KEY_").unwrap_or(&upper);
    KEY_NAMES
        .iter()
        .find(|(n, _)| *n == bare)
        .map(|(_, code)| *code)
}

/// Display name for a key code, if known
pub fn key_name(code: u16) -> Option<&'static str> {
    KEY_NAMES.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
}

/// Errors from parsing a key specification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("key code out of range (0-65535): {0}")]
    OutOfRange(String),

    #[error("unknown key name: {0}")]
    UnknownName(String),
}

/// A key as given in configuration: a numeric code, optionally with the
/// symbolic name it was written as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub code: u16,
    pub name: Option<String>,
}

impl KeySpec {
    pub fn from_code(code: u16) -> Self {
        Self { code, name: None }
    }
}

impl FromStr for KeySpec {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Anything that looks numeric must be a valid u16; "1".."9" are the
        // digit keys only when written as KEY_1 etc.
        if let Some(first) = s.chars().next() {
            if first.is_ascii_digit() || first == '-' || first == '+' {
                let code = parse_code(s).ok_or_else(|| KeyParseError::OutOfRange(s.to_string()))?;
                return Ok(Self::from_code(code));
            }
        }
        key_from_name(s)
            .map(|code| Self {
                code,
                name: Some(s.to_string()),
            })
            .ok_or_else(|| KeyParseError::UnknownName(s.to_string()))
    }
}

fn parse_code(s: &str) -> Option<u16> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse::<u16>().ok(),
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.code),
            None => write!(f, "{}", self.code),
        }
    }
}
