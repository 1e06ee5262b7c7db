//! The pure schema diff.
//!
//! [`diff_table`] compares a declared [`Table`] against a [`LiveTableSchema`]
//! and reports what must change. It performs no I/O, so every rule here can
//! be exercised without a backend.

use std::sync::LazyLock;

use regex::Regex;
use tabula_db::columns::Column;
use tabula_db::table::{Index, Table};

use crate::changes::{ColumnNullableChange, ColumnRename, ColumnTypeChange, TableChanges};
use crate::metadata::{ColumnMetadata, LiveTableSchema};
use crate::operations::ColumnTypeMapper;

/// Index names owned by the backend or by constraint DDL.
static RESERVED_INDEX: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^(PRIMARY|PRIMARY_KEY|sqlite_autoindex_.*|IDX_.*|FK_.*|UQ_.*)$")
});

fn is_reserved_index_name(name: &str) -> bool {
    RESERVED_INDEX
        .as_ref()
        .is_ok_and(|pattern| pattern.is_match(name))
}

/// Computes the changes that bring `live` in line with `table`.
///
/// Live columns the table does not declare are left alone.
pub fn diff_table(
    table: &Table,
    live: &LiveTableSchema,
    types: &dyn ColumnTypeMapper,
) -> TableChanges {
    let mut changes = TableChanges::default();

    for (field, column) in table.columns() {
        let existing = match live.column(column.name()) {
            Some(existing) => existing,
            None => match column.old_name().and_then(|old| live.column(old)) {
                Some(previous) => {
                    changes.columns_to_rename.push(ColumnRename {
                        field: field.to_string(),
                        old_name: previous.name.clone(),
                    });
                    changes.alter(field);
                    previous
                }
                None => {
                    changes.columns_to_create.push(field.to_string());
                    continue;
                }
            },
        };
        diff_column(table, field, column.as_ref(), existing, live, types, &mut changes);
    }

    diff_indexes(table, live, &mut changes);
    changes
}

fn diff_column(
    table: &Table,
    field: &str,
    column: &dyn Column,
    existing: &ColumnMetadata,
    live: &LiveTableSchema,
    types: &dyn ColumnTypeMapper,
    changes: &mut TableChanges,
) {
    let options = column.options();
    let is_primary_key = table.is_primary_key(field);

    let declared_type = types.sql_type(&column.column_type());
    if !declared_type.eq_ignore_ascii_case(&existing.data_type) {
        changes.column_type_changes.push(ColumnTypeChange {
            field: field.to_string(),
            from: existing.data_type.clone(),
            to: declared_type,
        });
        changes.alter(field);
    }

    let nullable = options.nullable && !is_primary_key;
    if nullable != existing.nullable {
        changes.column_nullable_changes.push(ColumnNullableChange {
            field: field.to_string(),
            nullable,
        });
        changes.alter(field);
    }

    if !is_primary_key {
        let live_unique = live.is_unique(&existing.name);
        if options.unique && !live_unique {
            changes.unique_columns_to_create.push(field.to_string());
            changes.alter(field);
        } else if !options.unique && live_unique {
            changes.unique_columns_to_drop.push(existing.name.clone());
            changes.alter(field);
        }
    }

    match (&options.references, live.foreign_key(&existing.name)) {
        (Some(declared), Some(current)) => {
            if declared.table != current.referenced_table
                || declared.column != current.referenced_column
            {
                changes.foreign_keys_to_drop.push(current.clone());
                changes.foreign_keys_to_create.push(field.to_string());
                changes.alter(field);
            }
        }
        (Some(_), None) => {
            changes.foreign_keys_to_create.push(field.to_string());
            changes.alter(field);
        }
        (None, Some(current)) => {
            changes.foreign_keys_to_drop.push(current.clone());
            changes.alter(field);
        }
        (None, None) => {}
    }
}

fn diff_indexes(table: &Table, live: &LiveTableSchema, changes: &mut TableChanges) {
    let declared: Vec<(Vec<String>, &Index)> = table
        .indexes()
        .iter()
        .map(|index| {
            let columns = index
                .columns
                .iter()
                .map(|field| table.physical_name(field).unwrap_or(field).to_string())
                .collect();
            (columns, index)
        })
        .collect();

    for (columns, index) in &declared {
        if !live.indexes.iter().any(|existing| existing.columns == *columns) {
            changes.indexes_to_create.push((*index).clone());
        }
    }

    for existing in &live.indexes {
        if declared.iter().any(|(columns, _)| *columns == existing.columns) {
            continue;
        }
        if is_reserved_index_name(&existing.name) {
            continue;
        }
        if let [column] = existing.columns.as_slice() {
            if live.is_unique(column) || live.foreign_key(column).is_some() {
                continue;
            }
        }
        changes.indexes_to_drop.push(existing.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ForeignKeyMetadata, IndexMetadata};
    use tabula_db::columns::{
        ColumnType, ConfigureColumn, ForeignKeyReference, IntegerColumn, StringColumn,
    };

    fn sql_type(column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::Boolean => "INTEGER",
            ColumnType::Float => "REAL",
            _ => "TEXT",
        }
        .to_string()
    }

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
        }
    }

    fn employee() -> Table {
        Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["department", "age"])
            .build()
            .unwrap()
    }

    fn live_employee() -> LiveTableSchema {
        LiveTableSchema {
            columns: vec![
                column("id", "TEXT", false),
                column("created", "TEXT", true),
                column("updated", "TEXT", true),
                column("name", "TEXT", false),
                column("dept", "TEXT", true),
                column("age", "INTEGER", true),
            ],
            unique_columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: vec![
                IndexMetadata {
                    name: "sqlite_autoindex_employee_1".into(),
                    columns: vec!["id".into()],
                    unique: true,
                },
                IndexMetadata {
                    name: "ix_employee_dept_age".into(),
                    columns: vec!["dept".into(), "age".into()],
                    unique: false,
                },
            ],
        }
    }

    #[test]
    fn test_matching_schema_has_no_changes() {
        let changes = diff_table(&employee(), &live_employee(), &sql_type);
        assert!(changes.is_empty(), "{changes:?}");
    }

    #[test]
    fn test_type_comparison_ignores_case() {
        let mut live = live_employee();
        live.columns[5].data_type = "integer".into();
        assert!(diff_table(&employee(), &live, &sql_type).is_empty());
    }

    #[test]
    fn test_one_new_column() {
        let table = Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .column("title", StringColumn::new("title"))
            .index(["department", "age"])
            .build()
            .unwrap();
        let changes = diff_table(&table, &live_employee(), &sql_type);
        assert_eq!(
            changes,
            TableChanges {
                columns_to_create: vec!["title".into()],
                ..TableChanges::default()
            }
        );
    }

    #[test]
    fn test_type_and_nullability_changes() {
        let mut live = live_employee();
        live.columns[5] = column("age", "TEXT", false);
        let changes = diff_table(&employee(), &live, &sql_type);
        assert_eq!(
            changes.column_type_changes,
            [ColumnTypeChange {
                field: "age".into(),
                from: "TEXT".into(),
                to: "INTEGER".into(),
            }]
        );
        assert_eq!(
            changes.column_nullable_changes,
            [ColumnNullableChange {
                field: "age".into(),
                nullable: true,
            }]
        );
        assert_eq!(changes.columns_to_alter, ["age"]);
    }

    #[test]
    fn test_rename_via_old_name() {
        let table = Table::builder("employee")
            .column("name", StringColumn::new("full_name").not_null().renamed_from("name"))
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["department", "age"])
            .build()
            .unwrap();
        let changes = diff_table(&table, &live_employee(), &sql_type);
        assert_eq!(
            changes.columns_to_rename,
            [ColumnRename {
                field: "name".into(),
                old_name: "name".into(),
            }]
        );
        assert!(changes.columns_to_create.is_empty());
        assert!(changes.column_type_changes.is_empty());
        assert_eq!(changes.columns_to_alter, ["name"]);
    }

    #[test]
    fn test_unique_add_and_drop() {
        let table = Table::builder("employee")
            .column("name", StringColumn::new("name").not_null().unique())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["department", "age"])
            .build()
            .unwrap();
        let mut live = live_employee();
        live.unique_columns = vec!["dept".into()];
        let changes = diff_table(&table, &live, &sql_type);
        assert_eq!(changes.unique_columns_to_create, ["name"]);
        assert_eq!(changes.unique_columns_to_drop, ["dept"]);
        assert_eq!(changes.columns_to_alter, ["name", "department"]);
    }

    #[test]
    fn test_foreign_key_retarget() {
        let table = Table::builder("employee")
            .column(
                "department",
                StringColumn::new("dept").references(ForeignKeyReference::to_id("department")),
            )
            .build()
            .unwrap();
        let mut live = LiveTableSchema {
            columns: vec![
                column("id", "TEXT", false),
                column("created", "TEXT", true),
                column("updated", "TEXT", true),
                column("dept", "TEXT", true),
            ],
            ..LiveTableSchema::default()
        };

        let changes = diff_table(&table, &live, &sql_type);
        assert_eq!(changes.foreign_keys_to_create, ["department"]);
        assert!(changes.foreign_keys_to_drop.is_empty());

        let stale = ForeignKeyMetadata {
            column: "dept".into(),
            referenced_table: "division".into(),
            referenced_column: "id".into(),
            constraint_name: None,
        };
        live.foreign_keys = vec![stale.clone()];
        let changes = diff_table(&table, &live, &sql_type);
        assert_eq!(changes.foreign_keys_to_create, ["department"]);
        assert_eq!(changes.foreign_keys_to_drop, [stale]);
    }

    #[test]
    fn test_undeclared_foreign_key_dropped() {
        let mut live = live_employee();
        live.foreign_keys = vec![ForeignKeyMetadata {
            column: "dept".into(),
            referenced_table: "department".into(),
            referenced_column: "id".into(),
            constraint_name: Some("FK_employee_dept".into()),
        }];
        let changes = diff_table(&employee(), &live, &sql_type);
        assert_eq!(changes.foreign_keys_to_drop.len(), 1);
        assert_eq!(changes.columns_to_alter, ["department"]);
    }

    #[test]
    fn test_index_created_and_dropped() {
        let table = Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["age", "department"])
            .build()
            .unwrap();
        let changes = diff_table(&table, &live_employee(), &sql_type);
        assert_eq!(changes.indexes_to_create, [Index::new(["age", "department"])]);
        assert_eq!(changes.indexes_to_drop.len(), 1);
        assert_eq!(changes.indexes_to_drop[0].name, "ix_employee_dept_age");
    }

    #[test]
    fn test_reserved_indexes_kept() {
        let mut live = live_employee();
        for name in ["PRIMARY", "IDX_1234", "FK_abc", "UQ_employee_name"] {
            live.indexes.push(IndexMetadata {
                name: name.into(),
                columns: vec!["created".into()],
                unique: false,
            });
        }
        live.unique_columns = vec!["name".into()];
        live.indexes.push(IndexMetadata {
            name: "name_unique".into(),
            columns: vec!["name".into()],
            unique: true,
        });
        let table = Table::builder("employee")
            .column("name", StringColumn::new("name").not_null().unique())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["department", "age"])
            .build()
            .unwrap();
        let changes = diff_table(&table, &live, &sql_type);
        assert!(changes.indexes_to_drop.is_empty(), "{changes:?}");
    }

    #[test]
    fn test_primary_key_is_never_nullable_or_unique() {
        let table = Table::builder("code")
            .without_record_columns()
            .column("code", StringColumn::new("code").unique())
            .primary_key(["code"])
            .build()
            .unwrap();
        let live = LiveTableSchema {
            columns: vec![column("code", "TEXT", false)],
            ..LiveTableSchema::default()
        };
        assert!(diff_table(&table, &live, &sql_type).is_empty());
    }
}
