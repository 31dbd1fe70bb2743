//! Binary configuration, read from the fixed user config path
//! `~/.config/idstree/idstree.toml` with `IDSTREE_` environment overrides.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use idstree::error::{IdsError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Schema file used when a command needs a dictionary.
    pub dictionary: Option<PathBuf>,
    /// Default log filter, overridden by RUST_LOG.
    pub log: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Settings> {
        let mut builder = Config::builder();
        if let Ok(home) = std::env::var("HOME") {
            let path = PathBuf::from(home).join(".config/idstree/idstree.toml");
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("IDSTREE"));
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| IdsError::Config(e.to_string()))
    }
}
