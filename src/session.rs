//! The [`Twinsqla`] facade: bind, execute and decode in one call.
//!
//! A session owns an executor, the template cache and the result-type cache.
//! Caches are per session; two sessions never share entries.

use tracing::debug;

use crate::bind::{self, PreparedStatement};
use crate::context::Operation;
use crate::error::Result;
use crate::executor::Executor;
use crate::result::{Decode, FromRow, ResultIter, ResultTypeBuilder, RowSet};
use crate::settings::Settings;
use crate::source::SqlBuilder;
use crate::value::{Entity, Params, Value};

pub struct Twinsqla<E: Executor> {
    executor: E,
    sql_builder: SqlBuilder,
    result_types: ResultTypeBuilder,
}

impl<E: Executor> Twinsqla<E> {
    pub fn new(executor: E, settings: &Settings) -> Result<Self> {
        Ok(Self {
            executor,
            sql_builder: SqlBuilder::new(settings)?,
            result_types: ResultTypeBuilder::new(settings.cache_size),
        })
    }
    pub fn executor(&self) -> &E {
        &self.executor
    }
    pub fn sql_builder(&self) -> &SqlBuilder {
        &self.sql_builder
    }
    pub fn result_types(&self) -> &ResultTypeBuilder {
        &self.result_types
    }

    /// Builds the statement for `operation` without running it.
    pub fn bind(&self, operation: &Operation, params: Params) -> Result<PreparedStatement> {
        bind::bind(&self.sql_builder, &operation.context(params))
    }

    /// Binds and executes, handing back what the executor reported.
    pub fn fetch(&self, operation: &Operation, params: Params) -> Result<RowSet> {
        let statement = self.bind(operation, params)?;
        debug!(kind = %operation.kind(), sql = statement.sql(), batch = statement.is_batch(), "running statement");
        self.executor.execute(&statement)
    }

    /// Binds, executes and decodes into the declared type `D`.
    pub fn run<D: Decode>(&self, operation: &Operation, params: Params) -> Result<D> {
        let rows = self.fetch(operation, params)?;
        self.result_types.decode(rows)
    }

    /// Like [`Twinsqla::run`] for sequences, decoding one row per iteration.
    pub fn iterate<T: FromRow>(&self, operation: &Operation, params: Params) -> Result<ResultIter<T>> {
        Ok(ResultIter::new(self.fetch(operation, params)?))
    }

    pub fn select<D: Decode>(&self, query: &str, params: Params) -> Result<D> {
        self.run(&Operation::select(query), params)
    }

    /// Runs a statement and returns the number of rows it changed.
    pub fn execute(&self, query: &str, params: Params) -> Result<usize> {
        Ok(self.fetch(&Operation::execute(query), params)?.rows_affected())
    }

    pub fn insert<T: Entity>(&self, entity: &T) -> Result<usize> {
        let params = Params::new().with("entity", Value::entity(entity));
        Ok(self.fetch(&Operation::insert(), params)?.rows_affected())
    }

    pub fn insert_all<T: Entity>(&self, entities: &[T]) -> Result<usize> {
        let params = Params::new().with("entities", Value::entities(entities));
        Ok(self.fetch(&Operation::insert(), params)?.rows_affected())
    }

    /// Updates the entity's row; `condition_columns` select it and are left
    /// out of the `SET` clause.
    pub fn update<T: Entity>(&self, entity: &T, condition_columns: &[&str]) -> Result<usize> {
        let operation = Operation::update().condition_columns(condition_columns.iter().copied());
        let params = Params::new().with("entity", Value::entity(entity));
        Ok(self.fetch(&operation, params)?.rows_affected())
    }

    /// Deletes the rows matching the entity on `condition_columns`, or every
    /// row of the table when none are given.
    pub fn delete<T: Entity>(&self, entity: &T, condition_columns: &[&str]) -> Result<usize> {
        let operation = Operation::delete().condition_columns(condition_columns.iter().copied());
        let params = Params::new().with("entity", Value::entity(entity));
        Ok(self.fetch(&operation, params)?.rows_affected())
    }
}
