//! Transaction contexts over the SQLite driver.

use tabula_core::DbError;
use tabula_db::record::{Query, Record};
use tabula_test::fixtures::{employee_table, sqlite_db};

fn alice() -> Record {
    Record::new()
        .with("name", "Alice")
        .with("department", "Cake Factory")
}

#[tokio::test]
async fn test_isolation_before_commit_visibility_after() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();
    let outside = db.clone();

    db.run_transaction(|tx| async move {
        assert!(tx.in_transaction());
        tx.insert("employee", alice()).await?;
        assert_eq!(tx.get_row_count("employee", Record::new()).await?, 1);
        assert_eq!(outside.get_row_count("employee", Record::new()).await?, 0);
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(db.get_row_count("employee", Record::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_error_rolls_back_and_is_returned() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();

    let err = db
        .run_transaction(|tx| async move {
            tx.insert("employee", alice()).await?;
            tx.get("employee", Query::field("name", "Bob")).await?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DoesNotExist(_)));
    assert_eq!(db.get_row_count("employee", Record::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nested_transaction_rejected() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();

    let err = db
        .run_transaction(|tx| async move {
            tx.run_transaction(|inner| async move {
                inner.insert("employee", alice()).await?;
                Ok(())
            })
            .await
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn test_value_returned_from_transaction() {
    let (_driver, db) = sqlite_db(vec![employee_table().unwrap()]).await.unwrap();

    let id = db
        .run_transaction(|tx| async move {
            let record = tx.insert("employee", alice()).await?;
            Ok(record.id().map(str::to_string))
        })
        .await
        .unwrap()
        .unwrap();
    let stored = db.get("employee", Query::field("id", id.as_str())).await.unwrap();
    assert_eq!(stored.id(), Some(id.as_str()));
}
