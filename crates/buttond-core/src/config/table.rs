// Buttond Action Table
// Order-sensitive construction and validation of per-key action lists

use indexmap::IndexMap;

use crate::action::{Action, ActionKind};
use crate::config::ConfigError;
use crate::key::KeySpec;
use crate::machine::ActionList;

/// Actions of one configured key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub code: u16,
    pub name: Option<String>,
    pub actions: ActionList,
}

/// Per-key sorted action lists, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTable {
    keys: IndexMap<u16, KeyEntry>,
}

impl ActionTable {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, code: u16) -> Option<&KeyEntry> {
        self.keys.get(&code)
    }

    /// Keys in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.keys.values()
    }
}

impl IntoIterator for ActionTable {
    type Item = KeyEntry;
    type IntoIter = indexmap::map::IntoValues<u16, KeyEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_values()
    }
}

/// Action being configured: command not necessarily set yet
#[derive(Debug, Clone)]
struct PendingAction {
    kind: ActionKind,
    trigger_time_ms: u64,
    command: Option<String>,
    exit_after: bool,
}

/// Builds an `ActionTable` from a sequence of configuration steps.
///
/// The steps mirror the command line: `short`/`long` open a new action
/// for a key, `time` and `command` apply to the action opened last.
#[derive(Debug, Default)]
pub struct ActionTableBuilder {
    keys: IndexMap<u16, (Option<String>, Vec<PendingAction>)>,
    current: Option<u16>,
}

impl ActionTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a short press action for `key`
    pub fn short(&mut self, key: &KeySpec) -> Result<&mut Self, ConfigError> {
        self.open(key, ActionKind::ShortPress)
    }

    /// Open a long press action for `key`
    pub fn long(&mut self, key: &KeySpec) -> Result<&mut Self, ConfigError> {
        self.open(key, ActionKind::LongPress)
    }

    /// Set the trigger time of the current action
    pub fn time(&mut self, trigger_time_ms: u64) -> Result<&mut Self, ConfigError> {
        self.current_action()
            .ok_or(ConfigError::NoCurrentKey("time"))?
            .trigger_time_ms = trigger_time_ms;
        Ok(self)
    }

    /// Set the command of the current action
    pub fn command(&mut self, command: impl Into<String>) -> Result<&mut Self, ConfigError> {
        self.set_command(command.into(), false)
    }

    /// Set the command of the current action; the daemon exits after it ran
    pub fn exit_command(&mut self, command: impl Into<String>) -> Result<&mut Self, ConfigError> {
        self.set_command(command.into(), true)
    }

    /// Add a complete action in one step
    pub fn action(&mut self, key: &KeySpec, action: Action) -> Result<&mut Self, ConfigError> {
        self.open(key, action.kind)?;
        self.time(action.trigger_time_ms)?;
        self.set_command(action.command, action.exit_after)
    }

    fn set_command(&mut self, command: String, exit_after: bool) -> Result<&mut Self, ConfigError> {
        if command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        let action = self
            .current_action()
            .ok_or(ConfigError::NoCurrentKey("action"))?;
        action.command = Some(command);
        action.exit_after = exit_after;
        Ok(self)
    }

    fn current_action(&mut self) -> Option<&mut PendingAction> {
        let code = self.current?;
        self.keys.get_mut(&code)?.1.last_mut()
    }

    fn open(&mut self, key: &KeySpec, kind: ActionKind) -> Result<&mut Self, ConfigError> {
        if let Some(code) = self.current {
            if self.current_action().is_some_and(|a| a.command.is_none()) {
                return Err(ConfigError::MissingCommand(code));
            }
        }

        let (name, actions) = self
            .keys
            .entry(key.code)
            .or_insert_with(|| (None, Vec::new()));
        if name.is_none() {
            name.clone_from(&key.name);
        }

        if kind == ActionKind::ShortPress
            && actions.iter().any(|a| a.kind == ActionKind::ShortPress)
        {
            return Err(ConfigError::DuplicateShort(key.code));
        }

        actions.push(PendingAction {
            kind,
            trigger_time_ms: kind.default_trigger_ms(),
            command: None,
            exit_after: false,
        });
        self.current = Some(key.code);
        Ok(self)
    }

    /// Validate and sort.
    ///
    /// Each key's actions are stably sorted: the short press first, then
    /// long presses by ascending trigger time, ties in insertion order.
    pub fn build(self) -> Result<ActionTable, ConfigError> {
        let mut keys = IndexMap::with_capacity(self.keys.len());
        for (code, (name, pending)) in self.keys {
            let mut actions = pending
                .into_iter()
                .map(|p| match p.command {
                    Some(command) => Ok(Action {
                        kind: p.kind,
                        trigger_time_ms: p.trigger_time_ms,
                        command,
                        exit_after: p.exit_after,
                    }),
                    None => Err(ConfigError::MissingCommand(code)),
                })
                .collect::<Result<ActionList, _>>()?;

            actions.sort_by_key(|a| match a.kind {
                ActionKind::ShortPress => (0, 0),
                ActionKind::LongPress => (1, a.trigger_time_ms),
            });

            log::debug!(
                "key {}: {}",
                code,
                actions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            keys.insert(code, KeyEntry { code, name, actions });
        }
        Ok(ActionTable { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u16) -> KeySpec {
        KeySpec::from_code(code)
    }

    fn commands(table: &ActionTable, code: u16) -> Vec<&str> {
        table
            .get(code)
            .unwrap()
            .actions
            .iter()
            .map(|a| a.command.as_str())
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(116)).unwrap().command("s").unwrap();
        builder.long(&key(116)).unwrap().command("l").unwrap();
        let table = builder.build().unwrap();
        let actions = &table.get(116).unwrap().actions;
        assert_eq!(actions[0], Action::short(1000, "s"));
        assert_eq!(actions[1], Action::long(5000, "l"));
    }

    #[test]
    fn test_sorted_short_first_then_ascending() {
        let mut builder = ActionTableBuilder::new();
        builder.long(&key(1)).unwrap().time(6000).unwrap().command("l6").unwrap();
        builder.long(&key(1)).unwrap().time(4000).unwrap().command("l4").unwrap();
        builder.short(&key(1)).unwrap().time(800).unwrap().command("s").unwrap();
        let table = builder.build().unwrap();
        assert_eq!(commands(&table, 1), vec!["s", "l4", "l6"]);
    }

    #[test]
    fn test_equal_thresholds_keep_insertion_order() {
        let mut builder = ActionTableBuilder::new();
        builder.long(&key(1)).unwrap().time(3000).unwrap().command("first").unwrap();
        builder.long(&key(1)).unwrap().time(1000).unwrap().command("early").unwrap();
        builder.long(&key(1)).unwrap().time(3000).unwrap().command("second").unwrap();
        let table = builder.build().unwrap();
        assert_eq!(commands(&table, 1), vec!["early", "first", "second"]);
    }

    #[test]
    fn test_duplicate_short_rejected() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(116)).unwrap().command("a").unwrap();
        let err = builder.short(&key(116)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateShort(116)));
    }

    #[test]
    fn test_short_on_different_keys_allowed() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(1)).unwrap().command("a").unwrap();
        builder.short(&key(2)).unwrap().command("b").unwrap();
        assert_eq!(builder.build().unwrap().len(), 2);
    }

    #[test]
    fn test_next_key_before_command_rejected() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(1)).unwrap();
        assert!(matches!(builder.long(&key(2)), Err(ConfigError::MissingCommand(1))));
    }

    #[test]
    fn test_dangling_action_rejected() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(1)).unwrap().command("a").unwrap();
        builder.long(&key(1)).unwrap().time(2000).unwrap();
        assert!(matches!(builder.build(), Err(ConfigError::MissingCommand(1))));
    }

    #[test]
    fn test_time_before_key_rejected() {
        let mut builder = ActionTableBuilder::new();
        assert!(matches!(builder.time(10), Err(ConfigError::NoCurrentKey("time"))));
        assert!(matches!(builder.command("x"), Err(ConfigError::NoCurrentKey("action"))));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(1)).unwrap();
        assert!(matches!(builder.command(""), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn test_exit_command_sets_flag() {
        let mut builder = ActionTableBuilder::new();
        builder.long(&key(1)).unwrap().exit_command("poweroff").unwrap();
        let table = builder.build().unwrap();
        assert!(table.get(1).unwrap().actions[0].exit_after);
    }

    #[test]
    fn test_configuration_order_and_names() {
        let mut builder = ActionTableBuilder::new();
        builder.short(&key(30)).unwrap().command("a").unwrap();
        builder.short(&"POWER".parse().unwrap()).unwrap().command("b").unwrap();
        builder.long(&key(30)).unwrap().command("c").unwrap();
        let table = builder.build().unwrap();
        let codes: Vec<u16> = table.iter().map(|k| k.code).collect();
        assert_eq!(codes, vec![30, 116]);
        assert_eq!(table.get(116).unwrap().name.as_deref(), Some("POWER"));
        assert_eq!(table.get(30).unwrap().name, None);
    }

    #[test]
    fn test_empty_builder_gives_empty_table() {
        assert!(ActionTableBuilder::new().build().unwrap().is_empty());
    }
}
