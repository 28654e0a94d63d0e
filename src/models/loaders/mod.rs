pub mod toml_loader;

pub use toml_loader::{load_account_registry, parse_account_registry};
