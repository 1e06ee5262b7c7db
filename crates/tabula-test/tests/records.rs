//! Record operations against the SQLite driver.

use tabula_core::{DatabaseSettings, DbError};
use tabula_db::query::builder::{Condition, Operator, QueryBuilder, SortCriteria};
use tabula_db::record::{Query, Record};
use tabula_db::value::Value;
use tabula_test::fixtures::{cascade_tables, employee_table, sqlite_db, sqlite_db_with};

fn employee(name: &str, department: &str, age: i64) -> Record {
    Record::new()
        .with("name", name)
        .with("department", department)
        .with("age", age)
}

#[tokio::test]
async fn test_employee_query_by_department() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    db.insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();
    db.insert("employee", employee("Bob", "Engineering", 41))
        .await
        .unwrap();
    db.insert("employee", employee("Carol", "Cake Factory", 25))
        .await
        .unwrap();

    let found = db
        .query("employee", Query::field("department", "Cake Factory"))
        .await
        .unwrap();
    let names: Vec<&str> = found
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, ["Alice", "Carol"]);
}

#[tokio::test]
async fn test_insert_returns_persisted_record() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    let inserted = db
        .insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();
    let id = inserted.id().unwrap().to_string();
    assert_eq!(id.len(), 32);

    let stored = db.get("employee", Query::field("id", id.as_str())).await.unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("Alice")));
    assert_eq!(stored.get("age"), Some(&Value::Int(30)));
    assert!(matches!(stored.get("created"), Some(Value::DateTimeTz(_))));
    assert_eq!(stored.get("created"), inserted.get("created"));
}

#[tokio::test]
async fn test_update_by_id_and_by_query() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    let alice = db
        .insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();
    db.insert("employee", employee("Bob", "Cake Factory", 41))
        .await
        .unwrap();

    let change = Record::new()
        .with("id", alice.id().unwrap())
        .with("age", 31);
    assert_eq!(db.update("employee", change, None).await.unwrap(), 1);
    let stored = db
        .get("employee", Query::field("name", "Alice"))
        .await
        .unwrap();
    assert_eq!(stored.get("age"), Some(&Value::Int(31)));
    assert!(matches!(stored.get("updated"), Some(Value::DateTimeTz(_))));

    let moved = db
        .update(
            "employee",
            Record::new().with("department", "Bakery"),
            Some(Query::field("department", "Cake Factory")),
        )
        .await
        .unwrap();
    assert_eq!(moved, 2);
    let count = db
        .get_row_count("employee", Query::field("department", "Bakery"))
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_query_builder_with_sort_and_range() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    for (name, age) in [("Alice", 30), ("Bob", 41), ("Carol", 25), ("Dan", 52)] {
        db.insert("employee", employee(name, "Cake Factory", age))
            .await
            .unwrap();
    }

    let mut query = QueryBuilder::new("employee");
    query
        .condition(Condition::new("age", Operator::Gte, 30))
        .unwrap()
        .sort(SortCriteria::desc("age"))
        .unwrap();
    let found = db.query("employee", query).await.unwrap();
    let names: Vec<&str> = found
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, ["Dan", "Bob", "Alice"]);
}

#[tokio::test]
async fn test_null_equality_matches_missing_values() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    db.insert("employee", Record::new().with("name", "Nobody"))
        .await
        .unwrap();
    db.insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();

    let found = db
        .query("employee", Query::field("department", Value::Null))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name"), Some(&Value::from("Nobody")));
}

#[tokio::test]
async fn test_empty_in_list_matches_nothing() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    db.insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();

    let mut query = QueryBuilder::new("employee");
    query.condition(Condition::is_in("name", Vec::new())).unwrap();
    assert!(db.query("employee", query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_errors() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();

    let err = db
        .insert("employee", employee("Alice", "Cake Factory", 30).with("salary", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = db
        .insert("employee", Record::new().with("department", "Cake Factory"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("required"));

    let err = db.insert("payroll", Record::new()).await.unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = db
        .get("employee", Query::field("name", "Nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DoesNotExist(_)));
}

#[tokio::test]
async fn test_delete_returns_affected_rows() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    db.insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();
    db.insert("employee", employee("Bob", "Engineering", 41))
        .await
        .unwrap();

    let deleted = db
        .delete("employee", Query::field("department", "Cake Factory"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(db.delete("employee", Query::field("name", "Alice")).await.unwrap(), 0);
    assert_eq!(
        db.get_row_count("employee", Record::new()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_named_parameter_crud_cycle() {
    let settings = DatabaseSettings {
        named_parameters: true,
        ..DatabaseSettings::default()
    };
    let mut tables = cascade_tables().unwrap();
    tables.push(employee_table().unwrap());
    let (_driver, db) = sqlite_db_with(&settings, tables).await.unwrap();

    let alice = db
        .insert("employee", employee("Alice", "Cake Factory", 30))
        .await
        .unwrap();
    db.insert("employee", employee("Bob", "Engineering", 41))
        .await
        .unwrap();
    let found = db
        .query("employee", Query::field("department", "Cake Factory"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let change = Record::new().with("id", alice.id().unwrap()).with("age", 31);
    assert_eq!(db.update("employee", change, None).await.unwrap(), 1);
    let mut query = QueryBuilder::new("employee");
    query
        .condition(Condition::is_in(
            "name",
            vec![Value::from("Alice"), Value::from("Bob")],
        ))
        .unwrap();
    assert_eq!(db.query("employee", query).await.unwrap().len(), 2);

    let deleted = db
        .delete("employee", Query::field("department", "Cake Factory"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(db.get_row_count("employee", Record::new()).await.unwrap(), 1);

    let member = db
        .insert("member", Record::new().with("name", "Carol"))
        .await
        .unwrap();
    let member_id = member.id().unwrap();
    db.insert("membership", Record::new().with("member", member_id))
        .await
        .unwrap();
    db.insert(
        "badge",
        Record::new().with("member", member_id).with("label", "gold"),
    )
    .await
    .unwrap();
    db.delete("membership", Record::new()).await.unwrap();
    assert_eq!(db.get_row_count("member", Record::new()).await.unwrap(), 0);
    assert_eq!(db.get_row_count("badge", Record::new()).await.unwrap(), 0);
}
