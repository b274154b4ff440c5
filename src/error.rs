
use thiserror::Error;

use crate::context::OperationKind;

#[derive(Error, Debug)]
pub enum TwinsqlaError {
    #[error("Only one of the arguments 'query' or 'sql_path' can be specified")]
    DuplicatedQueryArgument,
    #[error("No query or sql path was specified for a {kind} operation")]
    NoQueryArgument { kind: OperationKind },
    #[error("Query parse failed: {message}")]
    QueryParseFailed { message: String, line: Option<usize>, col: Option<usize> },
    #[error("No entity found among the bound parameters of a {kind} operation")]
    NoSpecifiedEntity { kind: OperationKind },
    #[error("Table name is neither configured on the operation nor declared by the entity")]
    NotFoundTableName,
    #[error("Invalid table name '{name}': must match {pattern}")]
    InvalidTableName { name: String, pattern: String },
    #[error("Invalid column name '{name}': must match {pattern}")]
    InvalidColumnName { name: String, pattern: String },
    #[error("No value bound for placeholder ':{name}'")]
    MissingBindParameter { name: String },
    #[error("Nothing to update in table '{table}': every column is a condition column")]
    NothingToUpdate { table: String },
    #[error("Render error: {0}")]
    Render(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TwinsqlaError>;

impl TwinsqlaError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::QueryParseFailed { message: message.into(), line: None, col: None }
    }
}

// Helper conversions
impl From<rusqlite::Error> for TwinsqlaError {
    fn from(e: rusqlite::Error) -> Self { Self::Execution(e.to_string()) }
}

impl From<config::ConfigError> for TwinsqlaError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl<T> From<std::sync::PoisonError<T>> for TwinsqlaError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
