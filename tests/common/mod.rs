#![allow(dead_code)]

use twinsqla::{Entity, FromRow, Params, Row, Settings, SqliteExecutor, Twinsqla, Value};

pub const SCHEMA: &str = "create table staff (id integer primary key, name text not null, age integer)";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Staff {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub age: Option<i64>,
}

impl Staff {
    pub fn new(id: i64, name: &str, age: i64) -> Self {
        Self {
            id: Some(id),
            name: Some(name.to_string()),
            age: Some(age),
        }
    }
    pub fn blank() -> Self {
        Self { id: None, name: None, age: None }
    }
}

impl Entity for Staff {
    fn table_name(&self) -> Option<&str> {
        Some("staff")
    }
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("age", self.age.into()),
        ]
    }
}

impl FromRow for Staff {
    fn from_row(row: &Row) -> twinsqla::Result<Self> {
        Ok(Self {
            id: row.get_as("id")?,
            name: row.get_as("name")?,
            age: row.get_as("age")?,
        })
    }
}

/// An entity that does not know its table.
pub struct Untabled {
    pub id: i64,
}

impl Entity for Untabled {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into())]
    }
}

pub fn session_with(settings: &Settings) -> Twinsqla<SqliteExecutor> {
    init_tracing();
    let executor = SqliteExecutor::open_in_memory().expect("in-memory database");
    executor.execute_batch(SCHEMA).expect("schema created");
    Twinsqla::new(executor, settings).expect("session created")
}

pub fn session() -> Twinsqla<SqliteExecutor> {
    session_with(&Settings::default())
}

pub fn staff_count(db: &Twinsqla<SqliteExecutor>) -> i64 {
    let row: Option<Row> = db
        .select("SELECT COUNT(*) AS n FROM staff", Params::new())
        .expect("count query");
    row.expect("count row").get_as("n").expect("count value")
}
