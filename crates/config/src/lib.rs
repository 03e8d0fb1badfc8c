//! Configuration loading for the sarah runtime and its plugins.
//!
//! Runtime config files: `sarah.toml`, `sarah.yaml`, `sarah.yml`, or `sarah.json`,
//! searched in `./` then the user config directory.
//!
//! Plugin config files live under `<plugin_config_root>/<bot type>/<id>.{yaml,yml,json}`
//! and are handled by [`plugin`].
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod plugin;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config},
    plugin::{ConfigFormat, RawConfig},
    schema::{ContextCacheConfig, RunnerConfig, SarahConfig, WorkerConfig},
};
