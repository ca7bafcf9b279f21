// Buttond Config
// Action table construction from command line steps or TOML files

pub mod parser;
pub mod table;

pub use parser::{Config, ConfigError, ConfigToml};
pub use table::{ActionTable, ActionTableBuilder, KeyEntry};
