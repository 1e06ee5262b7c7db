//! Table watchers around real mutations.

use std::sync::{Arc, Mutex};

use tabula_core::{DbError, DbResult};
use tabula_db::query::builder::QueryBuilder;
use tabula_db::record::{Query, Record};
use tabula_db::value::Value;
use tabula_db::watchers::TableWatcher;
use tabula_test::fixtures::{employee_table, sqlite_db};

/// Upper-cases names on the way in and logs every hook it sees.
#[derive(Default)]
struct Audit {
    events: Mutex<Vec<String>>,
}

impl Audit {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TableWatcher for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    fn table(&self) -> &str {
        "employee"
    }

    async fn before_insert(&self, mut record: Record) -> DbResult<Record> {
        if let Some(name) = record.get("name").and_then(Value::as_str) {
            let upper = name.to_uppercase();
            record.set("name", upper);
        }
        self.push("before_insert".into());
        Ok(record)
    }

    async fn after_insert(&self, record: &Record) -> DbResult<()> {
        self.push(format!("after_insert {}", record.get("name").unwrap_or(&Value::Null)));
        Ok(())
    }

    async fn after_update(
        &self,
        affected: u64,
        _record: &Record,
        _query: &QueryBuilder,
    ) -> DbResult<()> {
        self.push(format!("after_update {affected}"));
        Ok(())
    }

    async fn before_delete(&self, records: &[Record], _query: &QueryBuilder) -> DbResult<()> {
        if records
            .iter()
            .any(|record| record.get("department") == Some(&Value::from("Board")))
        {
            return Err(DbError::validation("Board members cannot be deleted"));
        }
        self.push(format!("before_delete {}", records.len()));
        Ok(())
    }

    async fn after_delete(
        &self,
        affected: u64,
        _records: &[Record],
        _query: &QueryBuilder,
    ) -> DbResult<()> {
        self.push(format!("after_delete {affected}"));
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_run_around_mutations() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    let audit = Arc::new(Audit::default());
    db.watchers().register(audit.clone());

    let alice = db
        .insert("employee", Record::new().with("name", "alice"))
        .await
        .unwrap();
    assert_eq!(alice.get("name"), Some(&Value::from("ALICE")));

    db.update(
        "employee",
        Record::new().with("id", alice.id().unwrap()).with("age", 30),
        None,
    )
    .await
    .unwrap();
    db.delete("employee", Query::field("name", "ALICE")).await.unwrap();

    assert_eq!(
        audit.events(),
        [
            "before_insert",
            "after_insert ALICE",
            "after_update 1",
            "before_delete 1",
            "after_delete 1",
        ]
    );
}

#[tokio::test]
async fn test_before_delete_can_abort() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    db.watchers().register(Arc::new(Audit::default()));
    db.insert(
        "employee",
        Record::new().with("name", "Carol").with("department", "Board"),
    )
    .await
    .unwrap();

    let err = db
        .delete("employee", Query::field("department", "Board"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    assert_eq!(db.get_row_count("employee", Record::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unregistered_watcher_stops_firing() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    let audit = Arc::new(Audit::default());
    db.watchers().register(audit.clone());
    assert!(db.watchers().unregister("employee", "audit"));

    db.insert("employee", Record::new().with("name", "dan"))
        .await
        .unwrap();
    assert!(audit.events().is_empty());
    let stored = db.get("employee", Query::field("name", "dan")).await.unwrap();
    assert_eq!(stored.id().map(str::len), Some(32));
}
