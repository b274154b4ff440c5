//! Recognized options and how they are loaded.
//!
//! ```toml
//! available_dynamic_query = true
//! sql_file_root = "sql"
//! cache_size = 128
//! validate_table_names = true
//! ```
//!
//! Every key can be overridden through a `TWINSQLA_` prefixed environment
//! variable, e.g. `TWINSQLA_CACHE_SIZE=64`.

use config::{Config, Environment, File};
use serde::Deserialize;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub const ENVIRONMENT_PREFIX: &str = "TWINSQLA";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// When false, templates are executed exactly as written.
    pub available_dynamic_query: bool,
    /// Root for relative SQL file paths; the working directory when unset.
    pub sql_file_root: Option<PathBuf>,
    /// Bound on each cache; unbounded when unset.
    pub cache_size: Option<usize>,
    /// Also covers the column and condition names of synthesized statements.
    pub validate_table_names: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            available_dynamic_query: true,
            sql_file_root: None,
            cache_size: None,
            validate_table_names: true,
        }
    }
}

impl Settings {
    /// Layers an optional settings file and the environment over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENVIRONMENT_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
    pub fn with_sql_file_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sql_file_root = Some(root.into());
        self
    }
    pub fn with_cache_size(mut self, cache_size: Option<usize>) -> Self {
        self.cache_size = cache_size;
        self
    }
    pub fn with_dynamic_query(mut self, available: bool) -> Self {
        self.available_dynamic_query = available;
        self
    }
}
