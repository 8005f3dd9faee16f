//! Configuration loading, env substitution and validation.
//!
//! Config files: `parley.toml`, `parley.yaml`, `parley.yml` or `parley.json`,
//! searched in `./` then the user config directory (`~/.config/parley/` on
//! Linux).
//!
//! `${ENV_VAR}` placeholders are substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, save_config},
    schema::{BrokerConfig, ParleyConfig, RelayConfig, StorageConfig, StorageKind},
    validate::{Diagnostic, Severity, ValidationResult},
};
