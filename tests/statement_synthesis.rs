use twinsqla::bind;
use twinsqla::{
    BindParams, EntityValue, Operation, OperationKind, Params, PreparedStatement, Settings, SqlBuilder, TwinsqlaError,
    Value, bind_params,
};

mod common;
use common::{Staff, Untabled};

fn builder() -> SqlBuilder {
    common::init_tracing();
    SqlBuilder::new(&Settings::default()).expect("builder")
}

fn bind_with(operation: &Operation, params: Params) -> twinsqla::Result<PreparedStatement> {
    bind::bind(&builder(), &operation.context(params))
}

fn pair(id: i64, name: &str) -> Value {
    EntityValue::new(None, vec![("id", Value::from(id)), ("name", Value::from(name))]).into()
}

#[test]
fn insert_lists_columns_in_declaration_order() {
    let statement = bind_with(&Operation::insert().table("t"), bind_params! { "entity" => pair(1, "a") })
        .expect("insert synthesized");
    assert_eq!(statement.sql(), "INSERT INTO t(id, name) VALUES (:id, :name)");
    assert_eq!(statement.bind_params(), &BindParams::Single(bind_params! { "id" => 1, "name" => "a" }));
    assert_eq!(statement.placeholders(), vec!["id", "name"]);
}

#[test]
fn insert_skips_null_columns_and_uses_entity_table() {
    let staff = Staff {
        id: None,
        name: Some("ann".to_string()),
        age: Some(41),
    };
    let statement = bind_with(&Operation::insert(), bind_params! { "entity" => Value::entity(&staff) })
        .expect("insert synthesized");
    assert_eq!(statement.sql(), "INSERT INTO staff(name, age) VALUES (:name, :age)");

    let statement = bind_with(&Operation::insert(), bind_params! { "entity" => Value::entity(&Staff::blank()) })
        .expect("insert synthesized");
    assert_eq!(statement.sql(), "INSERT INTO staff DEFAULT VALUES");
}

#[test]
fn update_excludes_condition_columns_from_set() {
    let operation = Operation::update().table("t").condition_columns(["id"]);
    let statement = bind_with(&operation, bind_params! { "entity" => pair(1, "b") }).expect("update synthesized");
    assert_eq!(statement.sql(), "UPDATE t SET name = :name WHERE id = :id");
    assert_eq!(statement.bind_params(), &BindParams::Single(bind_params! { "name" => "b", "id" => 1 }));
}

#[test]
fn delete_without_condition_columns_has_no_where() {
    let statement = bind_with(&Operation::delete().table("t"), bind_params! { "entity" => pair(1, "a") })
        .expect("delete synthesized");
    assert_eq!(statement.sql(), "DELETE FROM t");
    assert_eq!(statement.bind_params(), &BindParams::Single(Params::new()));

    let operation = Operation::delete().table("t").condition_columns(["id", "name"]);
    let statement = bind_with(&operation, bind_params! { "entity" => pair(1, "a") }).expect("delete synthesized");
    assert_eq!(statement.sql(), "DELETE FROM t WHERE id = :id AND name = :name");
}

#[test]
fn batch_insert_gives_one_mapping_per_entity() {
    let staff = vec![Staff::new(1, "ann", 30), Staff::new(2, "ben", 40)];
    let statement = bind_with(&Operation::insert(), bind_params! { "entities" => Value::entities(&staff) })
        .expect("batch synthesized");
    assert_eq!(statement.sql(), "INSERT INTO staff(id, name, age) VALUES (:id, :name, :age)");
    assert!(statement.is_batch());
    match statement.bind_params() {
        BindParams::Batch(batch) => {
            assert_eq!(batch.len(), 2);
            assert_eq!(batch[1], bind_params! { "id" => 2, "name" => "ben", "age" => 40 });
        }
        other => panic!("expected a batch, got {:?}", other),
    }
}

#[test]
fn heterogeneous_batch_follows_the_first_entity() {
    let partial = Staff {
        id: Some(2),
        name: None,
        age: Some(40),
    };
    let staff = vec![Staff::new(1, "ann", 30), partial];
    let statement = bind_with(&Operation::insert(), bind_params! { "entities" => Value::entities(&staff) })
        .expect("batch synthesized");
    let batch = statement.bind_params().as_slice();
    assert_eq!(batch[1], bind_params! { "id" => 2, "name" => Value::Null, "age" => 40 });
}

#[test]
fn entity_is_found_by_name_then_position() {
    let params = bind_params! { "note" => "x", "entity" => pair(1, "a") };
    let statement = bind_with(&Operation::insert().table("t"), params).expect("named entity");
    assert_eq!(statement.sql(), "INSERT INTO t(id, name) VALUES (:id, :name)");

    let params = bind_params! { "row" => pair(2, "b"), "note" => "x" };
    let statement = bind_with(&Operation::insert().table("t"), params).expect("first parameter");
    assert_eq!(statement.bind_params().as_slice()[0].get("id"), Some(&Value::Integer(2)));
}

#[test]
fn template_wins_over_synthesis() {
    let operation = Operation::insert().query("INSERT INTO t(id) VALUES (:id)");
    let statement = bind_with(&operation, bind_params! { "id" => 5 }).expect("rendered");
    assert_eq!(statement.sql(), "INSERT INTO t(id) VALUES (:id)");
    assert!(!statement.is_batch());
}

#[test]
fn both_query_and_path_are_rejected_for_every_kind() {
    for kind in [
        OperationKind::Select,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Execute,
    ] {
        let operation = Operation::new(kind).query("SELECT 1").sql_path("q.sql");
        let result = bind_with(&operation, Params::new());
        assert!(
            matches!(result, Err(TwinsqlaError::DuplicatedQueryArgument)),
            "{} must reject two sources",
            kind
        );
    }
}

#[test]
fn select_and_execute_need_a_query() {
    for kind in [OperationKind::Select, OperationKind::Execute] {
        let result = bind_with(&Operation::new(kind), bind_params! { "entity" => pair(1, "a") });
        assert!(matches!(result, Err(TwinsqlaError::NoQueryArgument { kind: k }) if k == kind));
    }
}

#[test]
fn synthesis_errors() {
    let no_entity = bind_with(&Operation::insert().table("t"), bind_params! { "id" => 1 });
    assert!(matches!(no_entity, Err(TwinsqlaError::NoSpecifiedEntity { kind: OperationKind::Insert })));

    let empty = bind_with(&Operation::delete().table("t"), Params::new());
    assert!(matches!(empty, Err(TwinsqlaError::NoSpecifiedEntity { .. })));

    let untabled = bind_with(
        &Operation::insert(),
        bind_params! { "entity" => Value::entity(&Untabled { id: 1 }) },
    );
    assert!(matches!(untabled, Err(TwinsqlaError::NotFoundTableName)));

    let invalid = bind_with(
        &Operation::insert().table("staff; drop table staff"),
        bind_params! { "entity" => pair(1, "a") },
    );
    assert!(matches!(invalid, Err(TwinsqlaError::InvalidTableName { .. })));

    let missing_condition = bind_with(
        &Operation::delete().condition_columns(["id"]),
        bind_params! { "entity" => Value::entity(&Staff::blank()) },
    );
    assert!(matches!(missing_condition, Err(TwinsqlaError::MissingBindParameter { name }) if name == "id"));

    let nothing = bind_with(
        &Operation::update().table("t").condition_columns(["id", "name"]),
        bind_params! { "entity" => pair(1, "a") },
    );
    assert!(matches!(nothing, Err(TwinsqlaError::NothingToUpdate { .. })));
}

#[test]
fn table_names_are_not_checked_when_validation_is_off() {
    let settings = Settings {
        validate_table_names: false,
        ..Settings::default()
    };
    let builder = SqlBuilder::new(&settings).expect("builder");
    let operation = Operation::delete().table("\"odd table\"");
    let statement = bind::bind(&builder, &operation.context(bind_params! { "entity" => pair(1, "a") }))
        .expect("unchecked table name");
    assert_eq!(statement.sql(), "DELETE FROM \"odd table\"");
}

#[test]
fn contexts_can_be_built_without_a_declaration() {
    let columns = vec!["id".to_string()];
    let context = twinsqla::OperationContext::new(OperationKind::Update, bind_params! { "entity" => pair(3, "c") })
        .with_table("t")
        .with_condition_columns(&columns);
    assert!(context.is_condition_column("id"));
    let statement = bind::bind(&builder(), &context).expect("update synthesized");
    assert_eq!(statement.sql(), "UPDATE t SET name = :name WHERE id = :id");

    let query = twinsqla::OperationContext::new(OperationKind::Select, bind_params! { "id" => 3 })
        .with_query("SELECT * FROM t WHERE id = :id");
    let (sql, binds) = bind::bind(&builder(), &query).expect("rendered").into_parts();
    assert_eq!(sql, "SELECT * FROM t WHERE id = :id");
    assert_eq!(binds, BindParams::Single(bind_params! { "id" => 3 }));
}

#[test]
fn column_names_must_be_identifiers() {
    let params = Params::try_from(serde_json::json!({ "entity": { "id": 1, "name) SELECT 1; --": "x" } }))
        .expect("json params");
    let injected = bind_with(&Operation::insert().table("t"), params.clone());
    assert!(matches!(injected, Err(TwinsqlaError::InvalidColumnName { name, .. }) if name == "name) SELECT 1; --"));

    let condition = Operation::delete().table("t").condition_columns(["id = 1 OR 1"]);
    let injected = bind_with(&condition, bind_params! { "entity" => pair(1, "a") });
    assert!(matches!(injected, Err(TwinsqlaError::InvalidColumnName { .. })));

    let settings = Settings {
        validate_table_names: false,
        ..Settings::default()
    };
    let unchecked = SqlBuilder::new(&settings).expect("builder");
    let operation = Operation::insert().table("t");
    let statement = bind::bind(&unchecked, &operation.context(params)).expect("unchecked columns");
    assert!(statement.sql().starts_with("INSERT INTO t(id, name) SELECT 1; --)"));
}
