// Buttond Config Parser - TOML with Serde
// Parses key/action configuration from TOML files

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::action::{Action, ActionKind};
use crate::config::table::{ActionTable, ActionTableBuilder};
use crate::key::{KeyParseError, KeySpec};

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyParseError),

    #[error("Invalid action kind '{0}', expected 'short' or 'long'")]
    InvalidKind(String),

    #[error("Duplicate short action for key {0}")]
    DuplicateShort(u16),

    #[error("Key {0} was defined without action")]
    MissingCommand(u16),

    #[error("Action {0} can only be set after a key code")]
    NoCurrentKey(&'static str),

    #[error("Action command must not be empty")]
    EmptyCommand,

    #[error("No action given")]
    NoKeys,
}

/// Root TOML table
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    /// Debounce window in milliseconds
    #[serde(default)]
    pub debounce_ms: Option<u64>,

    /// Event devices to monitor
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    /// Event devices that may disappear and come back
    #[serde(default)]
    pub wait_inputs: Vec<PathBuf>,

    /// Monitored keys
    #[serde(default)]
    pub key: Vec<KeyToml>,
}

/// A `[[key]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyToml {
    /// Numeric code or key name
    pub code: KeyCodeToml,

    /// Display name used in logs
    pub name: Option<String>,

    #[serde(default)]
    pub action: Vec<ActionToml>,
}

/// Key code written either as integer or as name
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyCodeToml {
    Code(i64),
    Name(String),
}

/// A `[[key.action]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionToml {
    /// "short" or "long"
    pub kind: String,

    /// Trigger time, defaults depend on kind
    pub time_ms: Option<u64>,

    pub command: String,

    #[serde(default)]
    pub exit_after: bool,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub debounce_ms: Option<u64>,
    pub inputs: Vec<PathBuf>,
    pub wait_inputs: Vec<PathBuf>,
    /// Keys with their actions, in file order
    pub keys: Vec<(KeySpec, Vec<Action>)>,
}

impl Config {
    /// Parse a TOML configuration file
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let toml_config: ConfigToml =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        toml_config.to_config()
    }

    /// Default configuration path (~/.config/buttond/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("buttond").join("config.toml"))
    }

    /// Feed the configured actions into `builder`.
    pub fn apply(&self, builder: &mut ActionTableBuilder) -> Result<(), ConfigError> {
        for (key, actions) in &self.keys {
            for action in actions {
                builder.action(key, action.clone())?;
            }
        }
        Ok(())
    }

    /// Build an action table from this file alone
    pub fn to_action_table(&self) -> Result<ActionTable, ConfigError> {
        let mut builder = ActionTableBuilder::new();
        self.apply(&mut builder)?;
        builder.build()
    }
}

impl ConfigToml {
    /// Convert parsed TOML to internal Config structure
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config {
            debounce_ms: self.debounce_ms,
            inputs: self.inputs.clone(),
            wait_inputs: self.wait_inputs.clone(),
            keys: Vec::with_capacity(self.key.len()),
        };

        for key in &self.key {
            let mut spec = match &key.code {
                KeyCodeToml::Code(code) => u16::try_from(*code)
                    .map(KeySpec::from_code)
                    .map_err(|_| KeyParseError::OutOfRange(code.to_string()))?,
                KeyCodeToml::Name(name) => KeySpec::from_str(name)?,
            };
            if key.name.is_some() {
                spec.name.clone_from(&key.name);
            }

            let mut actions = Vec::with_capacity(key.action.len());
            for action in &key.action {
                let kind = ActionKind::from_str(&action.kind)
                    .map_err(|_| ConfigError::InvalidKind(action.kind.clone()))?;
                let trigger = action.time_ms.unwrap_or_else(|| kind.default_trigger_ms());
                actions.push(
                    Action::new(kind, action.command.clone())
                        .with_trigger(trigger)
                        .with_exit_after(action.exit_after),
                );
            }
            if actions.is_empty() {
                return Err(ConfigError::MissingCommand(spec.code));
            }

            log::debug!("Loaded key {} with {} action(s)", spec, actions.len());
            config.keys.push((spec, actions));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_simple_toml() {
        let toml = r#"
            debounce_ms = 20
            inputs = ["/dev/input/event2"]

            [[key]]
            code = 116

            [[key.action]]
            kind = "short"
            command = "echo short"

            [[key.action]]
            kind = "long"
            time_ms = 3000
            command = "poweroff"
            exit_after = true
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.debounce_ms, Some(20));
        assert_eq!(config.inputs, vec![PathBuf::from("/dev/input/event2")]);
        assert!(config.wait_inputs.is_empty());

        let table = config.to_action_table().unwrap();
        let actions = &table.get(116).unwrap().actions;
        assert_eq!(actions[0], Action::short(1000, "echo short"));
        assert_eq!(actions[1], Action::long(3000, "poweroff").with_exit_after(true));
    }

    #[test]
    fn test_key_by_name_with_display_name() {
        let toml = r#"
            [[key]]
            code = "KEY_PROG1"
            name = "user button"
            [[key.action]]
            kind = "long"
            command = "reset"
        "#;
        let config = Config::from_toml(toml).unwrap();
        let (spec, actions) = &config.keys[0];
        assert_eq!(spec.code, 148);
        assert_eq!(spec.name.as_deref(), Some("user button"));
        assert_eq!(actions[0].trigger_time_ms, 5000);
    }

    #[test]
    fn test_out_of_range_code_rejected() {
        let toml = r#"
            [[key]]
            code = 70000
            [[key.action]]
            kind = "short"
            command = "x"
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::InvalidKey(KeyParseError::OutOfRange(_)))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
            [[key]]
            code = 1
            [[key.action]]
            kind = "double"
            command = "x"
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::InvalidKind(_))));
    }

    #[test]
    fn test_key_without_action_rejected() {
        let toml = r#"
            [[key]]
            code = 1
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::MissingCommand(1))));
    }

    #[test]
    fn test_duplicate_short_rejected_when_building() {
        let toml = r#"
            [[key]]
            code = 1
            [[key.action]]
            kind = "short"
            command = "a"
            [[key.action]]
            kind = "short"
            command = "b"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert!(matches!(config.to_action_table(), Err(ConfigError::DuplicateShort(1))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            polling = true
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_default_path_ends_with_buttond() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("buttond/config.toml"));
        }
    }
}
