//! Twinsqla – two-way SQL templates, statement binding and typed results.
//!
//! A *two-way* SQL template is plain SQL that stays executable as written:
//! dynamic parts hide inside block comments and are only interpreted when the
//! template is rendered with bound parameters.
//!
//! ```sql
//! SELECT * FROM staff
//! WHERE 1 = 1
//! /*%if name */ AND name = /* :name */'alice' /*%end*/
//! /*%if ids */ AND id IN /* :ids */(1, 2) /*%end*/
//! ```
//!
//! Binding a call yields a [`bind::PreparedStatement`]: final SQL with named
//! placeholders plus one bind mapping (or one per entity, for batches). When an
//! INSERT, UPDATE or DELETE names no SQL at all, the statement is synthesized
//! from the bound [`value::Entity`].
//!
//! ## Modules
//! * [`value`] – Bind values, the [`value::Entity`] trait and [`value::Params`].
//! * [`template`] – The directive grammar (`twoway.pest`), parsing and rendering.
//! * [`source`] – Inline or file SQL sources and the template cache.
//! * [`context`] – Operation declarations and the per-call context.
//! * [`bind`] – Statement builders and synthesis.
//! * [`result`] – Rows, result sets and decoding into declared types.
//! * [`executor`] – The executor capability, with a SQLite implementation.
//! * [`session`] – The [`session::Twinsqla`] facade.
//! * [`cache`] – Bounded LRU keepers backing both caches.
//! * [`settings`] – Configuration file and `TWINSQLA_*` environment.
//!
//! ## Caching
//! Parsed templates are kept per (source, parameter names) pair, so a SQL file
//! is read once and a template is parsed once per distinct set of names. The
//! decoding strategy of each declared result type is kept as well. Both caches
//! are owned by the session and bounded by `cache_size` (unbounded when unset).
//!
//! ## Quick Start
//! ```
//! use twinsqla::{bind_params, Entity, Row, Settings, SqliteExecutor, Twinsqla, Value};
//!
//! struct Staff { id: i64, name: String }
//! impl Entity for Staff {
//!     fn table_name(&self) -> Option<&str> { Some("staff") }
//!     fn columns(&self) -> Vec<(&'static str, Value)> {
//!         vec![("id", self.id.into()), ("name", self.name.as_str().into())]
//!     }
//! }
//!
//! let executor = SqliteExecutor::open_in_memory().unwrap();
//! executor.execute_batch("create table staff (id integer primary key, name text)").unwrap();
//! let db = Twinsqla::new(executor, &Settings::default()).unwrap();
//! db.insert(&Staff { id: 1, name: "alice".into() }).unwrap();
//! let rows: Vec<Row> = db
//!     .select("SELECT * FROM staff WHERE id IN /* :ids */(0)", bind_params! { "ids" => vec![1, 2] })
//!     .unwrap();
//! assert_eq!(rows[0].get("name"), Some(&Value::from("alice")));
//! ```

pub mod bind;
pub mod cache;
pub mod context;
pub mod error;
pub mod executor;
pub mod result;
pub mod session;
pub mod settings;
pub mod source;
pub mod template;
pub mod value;

pub use bind::{BindParams, PreparedStatement, StatementBuilder};
pub use context::{Operation, OperationContext, OperationKind};
pub use error::{Result, TwinsqlaError};
pub use executor::{Executor, SqliteExecutor};
pub use result::{Decode, FromRow, FromValue, ResultIter, Row, RowSet};
pub use session::Twinsqla;
pub use settings::Settings;
pub use source::{SqlBuilder, SqlSource};
pub use template::Template;
pub use value::{Entity, EntityValue, Params, Value};
