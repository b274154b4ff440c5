use std::fs;
use std::path::Path;
use std::sync::Arc;

use twinsqla::cache::Keeper;
use twinsqla::source::dedent;
use twinsqla::{Settings, SqlBuilder, SqlSource, TwinsqlaError, bind_params};

mod common;

#[test]
fn inline_template_is_parsed_once_per_name_set() {
    common::init_tracing();
    let builder = SqlBuilder::new(&Settings::default()).expect("builder");
    let source = SqlSource::Inline("SELECT * FROM staff WHERE id = :id /*%if name */AND name = :name/*%end*/");

    let first = builder.template(source, &bind_params! { "id" => 1 }).expect("first");
    let again = builder.template(source, &bind_params! { "id" => 2 }).expect("again");
    assert!(Arc::ptr_eq(&first, &again), "same text and names must give the same template");

    let wider = builder
        .template(source, &bind_params! { "name" => "bob", "id" => 1 })
        .expect("wider");
    assert!(!Arc::ptr_eq(&first, &wider), "a different name set is a different entry");
    let reordered = builder
        .template(source, &bind_params! { "id" => 3, "name" => "ann" })
        .expect("reordered");
    assert!(Arc::ptr_eq(&wider, &reordered), "name order does not matter");
    assert_eq!(builder.cached_templates().expect("len"), 2);
}

#[test]
fn sql_file_is_read_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let file = dir.path().join("by_id.sql");
    fs::write(&file, "SELECT * FROM staff WHERE id = :id").expect("write sql");
    let builder = SqlBuilder::new(&Settings::default().with_sql_file_root(dir.path())).expect("builder");
    let params = bind_params! { "id" => 1 };

    let first = builder.template(SqlSource::File(Path::new("by_id.sql")), &params).expect("first");
    fs::write(&file, "SELECT 1").expect("rewrite sql");
    let second = builder.template(SqlSource::File(Path::new("by_id.sql")), &params).expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.source(), "SELECT * FROM staff WHERE id = :id", "the file must not be read again");

    let absolute = builder.template(SqlSource::File(&file), &params).expect("absolute");
    assert!(Arc::ptr_eq(&first, &absolute), "relative and absolute paths share the entry");
}

#[test]
fn missing_sql_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let builder = SqlBuilder::new(&Settings::default().with_sql_file_root(dir.path())).expect("builder");
    let result = builder.template(SqlSource::File(Path::new("absent.sql")), &bind_params! {});
    assert!(matches!(result, Err(TwinsqlaError::Io(_))));
}

#[test]
fn bounded_cache_evicts_and_zero_keeps_nothing() {
    let builder = SqlBuilder::new(&Settings::default().with_cache_size(Some(1))).expect("builder");
    let params = bind_params! {};
    let a = builder.template(SqlSource::Inline("SELECT 1"), &params).expect("a");
    builder.template(SqlSource::Inline("SELECT 2"), &params).expect("b");
    let a_again = builder.template(SqlSource::Inline("SELECT 1"), &params).expect("a again");
    assert!(!Arc::ptr_eq(&a, &a_again), "the first entry was evicted");
    assert_eq!(builder.cached_templates().expect("len"), 1);

    let uncached = SqlBuilder::new(&Settings::default().with_cache_size(Some(0))).expect("builder");
    let x = uncached.template(SqlSource::Inline("SELECT 1"), &params).expect("x");
    let y = uncached.template(SqlSource::Inline("SELECT 1"), &params).expect("y");
    assert!(!Arc::ptr_eq(&x, &y));
    assert_eq!(uncached.cached_templates().expect("len"), 0);
}

#[test]
fn inline_text_is_dedented() {
    assert_eq!(dedent("\n    SELECT *\n      FROM staff\n"), "\nSELECT *\n  FROM staff\n");
    assert_eq!(dedent("\t  SELECT *\n  \n\t    FROM staff"), "SELECT *\n\n  FROM staff");
    assert_eq!(dedent("\tSELECT *\n    FROM staff\n"), "\tSELECT *\n    FROM staff\n", "tabs and spaces share no margin");
    let builder = SqlBuilder::new(&Settings::default()).expect("builder");
    let template = builder
        .template(SqlSource::Inline("    SELECT *\n    FROM staff"), &bind_params! {})
        .expect("template");
    assert_eq!(template.source(), "SELECT *\nFROM staff");
}

#[test]
fn both_sources_are_rejected() {
    let result = SqlSource::from_parts(Some("SELECT 1"), Some(Path::new("q.sql")));
    assert!(matches!(result, Err(TwinsqlaError::DuplicatedQueryArgument)));
    assert_eq!(SqlSource::from_parts(None, None).expect("neither is fine"), None);
}

#[test]
fn keeper_evicts_least_recently_used() {
    let mut keeper: Keeper<&str, i32> = Keeper::new(Some(2));
    let (_, kept_before) = keeper.keep("a", 1);
    assert!(!kept_before);
    keeper.keep("b", 2);
    assert_eq!(keeper.get(&"a").map(|v| *v), Some(1));
    keeper.keep("c", 3);
    assert!(keeper.get(&"b").is_none(), "b was used least recently");
    let (value, kept_before) = keeper.keep("a", 10);
    assert!(kept_before);
    assert_eq!(*value, 1, "an existing entry is never replaced");
    assert_eq!(keeper.len(), 2);
}

#[test]
fn concurrent_callers_share_one_template() {
    common::init_tracing();
    let builder = SqlBuilder::new(&Settings::default()).expect("builder");
    let source = SqlSource::Inline("SELECT * FROM staff WHERE 1 = 1 /*%if id */AND id = :id/*%end*/");
    let found: Vec<Arc<twinsqla::Template>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8i64)
            .map(|i| {
                let builder = &builder;
                scope.spawn(move || builder.template(source, &bind_params! { "id" => i }).expect("template"))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread")).collect()
    });
    assert!(found.iter().all(|t| Arc::ptr_eq(t, &found[0])), "racing callers must agree on the kept template");
    assert_eq!(builder.cached_templates().expect("len"), 1);
}
