//! Operation declarations and the per-call context the binder works from.
//!
//! An [`Operation`] is declared once (kind, SQL origin, table, condition
//! columns) and reused; every call pairs it with fresh [`Params`] to form an
//! [`OperationContext`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::value::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Execute,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OperationKind::Select => "SELECT",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Execute => "EXECUTE",
        };
        write!(f, "{}", name)
    }
}

// ------------- Operation -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: OperationKind,
    query: Option<String>,
    sql_path: Option<PathBuf>,
    table_name: Option<String>,
    condition_columns: Vec<String>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            query: None,
            sql_path: None,
            table_name: None,
            condition_columns: Vec::new(),
        }
    }
    pub fn select(query: impl Into<String>) -> Self {
        Self::new(OperationKind::Select).query(query)
    }
    pub fn insert() -> Self {
        Self::new(OperationKind::Insert)
    }
    pub fn update() -> Self {
        Self::new(OperationKind::Update)
    }
    pub fn delete() -> Self {
        Self::new(OperationKind::Delete)
    }
    pub fn execute(query: impl Into<String>) -> Self {
        Self::new(OperationKind::Execute).query(query)
    }
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
    pub fn sql_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sql_path = Some(path.into());
        self
    }
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }
    pub fn condition_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition_columns = columns.into_iter().map(Into::into).collect();
        self
    }
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
    pub fn context(&self, params: Params) -> OperationContext<'_> {
        OperationContext {
            kind: self.kind,
            query: self.query.as_deref(),
            sql_path: self.sql_path.as_deref(),
            table_name: self.table_name.as_deref(),
            condition_columns: &self.condition_columns,
            params,
        }
    }
}

// ------------- OperationContext -------------
#[derive(Debug, Clone)]
pub struct OperationContext<'op> {
    pub kind: OperationKind,
    pub query: Option<&'op str>,
    pub sql_path: Option<&'op Path>,
    pub table_name: Option<&'op str>,
    pub condition_columns: &'op [String],
    pub params: Params,
}

impl<'op> OperationContext<'op> {
    pub fn new(kind: OperationKind, params: Params) -> Self {
        Self {
            kind,
            query: None,
            sql_path: None,
            table_name: None,
            condition_columns: &[],
            params,
        }
    }
    pub fn with_query(mut self, query: &'op str) -> Self {
        self.query = Some(query);
        self
    }
    pub fn with_sql_path(mut self, path: &'op Path) -> Self {
        self.sql_path = Some(path);
        self
    }
    pub fn with_table(mut self, table_name: &'op str) -> Self {
        self.table_name = Some(table_name);
        self
    }
    pub fn with_condition_columns(mut self, columns: &'op [String]) -> Self {
        self.condition_columns = columns;
        self
    }
    pub fn is_condition_column(&self, column: &str) -> bool {
        self.condition_columns.iter().any(|c| c == column)
    }
}
