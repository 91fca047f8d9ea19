//! Configuration loading and env substitution.
//!
//! Config files: `ferrygram.toml`, `ferrygram.yaml`, `ferrygram.yml` or
//! `ferrygram.json`, searched in `./` then `~/.config/ferrygram/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config, save_config, set_config_dir, set_data_dir,
    },
    schema::{AuthConfig, FerrygramConfig, PluginsConfig, RuntimeConfig, ServerConfig},
};
