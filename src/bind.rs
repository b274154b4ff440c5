//! Statement builders: one per operation kind.
//!
//! Every builder first tries the operation's own SQL (inline or file). When
//! there is none, SELECT and EXECUTE give up with
//! [`TwinsqlaError::NoQueryArgument`], while INSERT, UPDATE and DELETE
//! synthesize a canonical statement from the bound entity:
//!
//! ```text
//! INSERT INTO staff(id, name) VALUES (:id, :name)
//! UPDATE staff SET name = :name WHERE id = :id
//! DELETE FROM staff WHERE id = :id
//! ```
//!
//! Without condition columns, UPDATE and DELETE get no WHERE clause and
//! touch every row of the table. Unless validation is switched off,
//! every table and column name must be a bare identifier.

use tracing::{debug, warn};

use std::fmt;

use crate::context::{OperationContext, OperationKind};
use crate::error::{Result, TwinsqlaError};
use crate::source::SqlBuilder;
use crate::template::{self, Rendered};
use crate::value::{EntityValue, Params, Value, validate_column_name, validate_table_name};

// ------------- PreparedStatement -------------
#[derive(Debug, Clone, PartialEq)]
pub enum BindParams {
    Single(Params),
    Batch(Vec<Params>),
}

impl BindParams {
    pub fn as_slice(&self) -> &[Params] {
        match self {
            BindParams::Single(params) => std::slice::from_ref(params),
            BindParams::Batch(batch) => batch,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    sql: String,
    binds: BindParams,
}

impl PreparedStatement {
    pub fn new(sql: impl Into<String>, binds: BindParams) -> Self {
        Self { sql: sql.into(), binds }
    }
    pub fn sql(&self) -> &str {
        &self.sql
    }
    pub fn bind_params(&self) -> &BindParams {
        &self.binds
    }
    pub fn is_batch(&self) -> bool {
        matches!(self.binds, BindParams::Batch(_))
    }
    /// Placeholders appearing in the final SQL.
    pub fn placeholders(&self) -> Vec<String> {
        template::placeholders(&self.sql)
    }
    pub fn into_parts(self) -> (String, BindParams) {
        (self.sql, self.binds)
    }
}

impl From<Rendered> for PreparedStatement {
    fn from(rendered: Rendered) -> Self {
        Self::new(rendered.sql, BindParams::Single(rendered.binds))
    }
}

impl fmt::Display for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        for params in self.binds.as_slice() {
            let binds: Vec<String> = params.iter().map(|(n, v)| format!(":{} = {}", n, v)).collect();
            write!(f, "\n  -- {}", binds.join(", "))?;
        }
        Ok(())
    }
}

// ------------- StatementBuilder -------------
pub trait StatementBuilder: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn bind(&self, builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement> {
        match builder.render(context)? {
            Some(rendered) => Ok(rendered.into()),
            None => self.synthesize(builder, context),
        }
    }

    /// Builds the statement when the context names no SQL.
    fn synthesize(&self, builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement>;
}

pub struct SelectBuilder;
pub struct InsertBuilder;
pub struct UpdateBuilder;
pub struct DeleteBuilder;
pub struct ExecuteBuilder;

pub fn builder_for(kind: OperationKind) -> &'static dyn StatementBuilder {
    match kind {
        OperationKind::Select => &SelectBuilder,
        OperationKind::Insert => &InsertBuilder,
        OperationKind::Update => &UpdateBuilder,
        OperationKind::Delete => &DeleteBuilder,
        OperationKind::Execute => &ExecuteBuilder,
    }
}

/// Binds `context` with the builder matching its operation kind.
pub fn bind(builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement> {
    builder_for(context.kind).bind(builder, context)
}

impl StatementBuilder for SelectBuilder {
    fn kind(&self) -> OperationKind {
        OperationKind::Select
    }
    fn synthesize(&self, _: &SqlBuilder, _: &OperationContext) -> Result<PreparedStatement> {
        Err(TwinsqlaError::NoQueryArgument { kind: self.kind() })
    }
}

impl StatementBuilder for ExecuteBuilder {
    fn kind(&self) -> OperationKind {
        OperationKind::Execute
    }
    fn synthesize(&self, _: &SqlBuilder, _: &OperationContext) -> Result<PreparedStatement> {
        Err(TwinsqlaError::NoQueryArgument { kind: self.kind() })
    }
}

impl StatementBuilder for InsertBuilder {
    fn kind(&self) -> OperationKind {
        OperationKind::Insert
    }
    fn synthesize(&self, builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement> {
        let target = Target::find(self.kind(), builder, context)?;
        let columns = target.columns(|_| true);
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", target.table)
        } else {
            let placeholders: Vec<String> = columns.iter().map(|c| format!(":{}", c)).collect();
            format!(
                "INSERT INTO {}({}) VALUES ({})",
                target.table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        target.prepare(sql, &columns, &[])
    }
}

impl StatementBuilder for UpdateBuilder {
    fn kind(&self) -> OperationKind {
        OperationKind::Update
    }
    fn synthesize(&self, builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement> {
        let target = Target::find(self.kind(), builder, context)?;
        let columns = target.columns(|c| !context.is_condition_column(c));
        if columns.is_empty() {
            return Err(TwinsqlaError::NothingToUpdate {
                table: target.table.to_string(),
            });
        }
        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = :{}", c, c)).collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            target.table,
            assignments.join(", "),
            where_clause(context.condition_columns)
        );
        target.prepare(sql, &columns, context.condition_columns)
    }
}

impl StatementBuilder for DeleteBuilder {
    fn kind(&self) -> OperationKind {
        OperationKind::Delete
    }
    fn synthesize(&self, builder: &SqlBuilder, context: &OperationContext) -> Result<PreparedStatement> {
        let target = Target::find(self.kind(), builder, context)?;
        let sql = format!("DELETE FROM {}{}", target.table, where_clause(context.condition_columns));
        target.prepare(sql, &[], context.condition_columns)
    }
}

fn where_clause(condition_columns: &[String]) -> String {
    if condition_columns.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = condition_columns.iter().map(|c| format!("{} = :{}", c, c)).collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

// ------------- Target -------------

// The entities a synthesized statement is built from, and the table they go to.
struct Target<'c> {
    kind: OperationKind,
    table: &'c str,
    entities: Vec<&'c EntityValue>,
    batch: bool,
}

impl<'c> Target<'c> {
    // Candidates in order: `entities`, `entity`, then the first parameter.
    fn find(kind: OperationKind, builder: &SqlBuilder, context: &'c OperationContext) -> Result<Self> {
        let named = ["entities", "entity"].into_iter().filter_map(|n| context.params.get(n));
        let first = context.params.first().map(|(_, v)| v);
        let (entities, batch) = named
            .chain(first)
            .find_map(|v| v.as_entities().map(|e| (e, matches!(v, Value::List(_)))))
            .ok_or(TwinsqlaError::NoSpecifiedEntity { kind })?;
        let head: &'c EntityValue = entities[0];
        let table = context
            .table_name
            .or_else(|| head.table_name())
            .ok_or(TwinsqlaError::NotFoundTableName)?;
        if builder.validate_table_names() {
            validate_table_name(table)?;
            let conditions = context.condition_columns.iter().map(String::as_str);
            for column in head.present_columns().map(|(c, _)| c).chain(conditions) {
                validate_column_name(column)?;
            }
        }
        Ok(Self { kind, table, entities, batch })
    }

    // Non-null columns of the first entity; the rest of a batch follows it.
    fn columns(&self, keep: impl Fn(&str) -> bool) -> Vec<&'c str> {
        let head: &'c EntityValue = self.entities[0];
        head.present_columns()
            .map(|(c, _)| c)
            .filter(|c| keep(c))
            .collect()
    }

    fn prepare(&self, sql: String, columns: &[&str], condition_columns: &[String]) -> Result<PreparedStatement> {
        let expected: Vec<&str> = self.entities[0].present_columns().map(|(c, _)| c).collect();
        let mut batch = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            let present: Vec<&str> = entity.present_columns().map(|(c, _)| c).collect();
            if present != expected {
                warn!(table = self.table, expected = ?expected, found = ?present, "heterogeneous entity batch, using the first entity's columns");
            }
            let mut params = Params::new();
            for column in columns {
                params.insert(*column, entity.get(column).cloned().unwrap_or(Value::Null));
            }
            for column in condition_columns {
                match entity.get(column) {
                    Some(value) if !value.is_null() => {
                        params.insert(column.as_str(), value.clone());
                    }
                    _ => {
                        return Err(TwinsqlaError::MissingBindParameter { name: column.clone() });
                    }
                }
            }
            batch.push(params);
        }
        debug!(kind = %self.kind, table = self.table, rows = batch.len(), sql = %sql, "synthesized statement");
        let binds = if self.batch {
            BindParams::Batch(batch)
        } else {
            BindParams::Single(batch.pop().unwrap_or_default())
        };
        Ok(PreparedStatement::new(sql, binds))
    }
}
