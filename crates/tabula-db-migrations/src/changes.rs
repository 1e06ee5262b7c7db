//! The result of diffing a declared table against its live counterpart.

use tabula_db::table::Index;

use crate::metadata::{ForeignKeyMetadata, IndexMetadata};

/// A column whose physical name changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRename {
    pub field: String,
    /// The live physical name.
    pub old_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeChange {
    pub field: String,
    /// The live type.
    pub from: String,
    /// The declared type, as mapped by the driver.
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNullableChange {
    pub field: String,
    pub nullable: bool,
}

/// Structural changes needed to bring a live table in line with its
/// declaration.
///
/// Columns are named by logical field, except where the live side is the
/// only one that knows them (`unique_columns_to_drop`, the dropped foreign
/// keys and indexes), which carry physical names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChanges {
    pub columns_to_create: Vec<String>,
    pub columns_to_rename: Vec<ColumnRename>,
    /// Every existing column with at least one change below.
    pub columns_to_alter: Vec<String>,
    pub column_type_changes: Vec<ColumnTypeChange>,
    pub column_nullable_changes: Vec<ColumnNullableChange>,
    pub foreign_keys_to_create: Vec<String>,
    pub foreign_keys_to_drop: Vec<ForeignKeyMetadata>,
    pub unique_columns_to_create: Vec<String>,
    pub unique_columns_to_drop: Vec<String>,
    pub indexes_to_create: Vec<Index>,
    pub indexes_to_drop: Vec<IndexMetadata>,
}

impl TableChanges {
    pub fn is_empty(&self) -> bool {
        self.columns_to_create.is_empty()
            && self.columns_to_rename.is_empty()
            && self.columns_to_alter.is_empty()
            && self.column_type_changes.is_empty()
            && self.column_nullable_changes.is_empty()
            && self.foreign_keys_to_create.is_empty()
            && self.foreign_keys_to_drop.is_empty()
            && self.unique_columns_to_create.is_empty()
            && self.unique_columns_to_drop.is_empty()
            && self.indexes_to_create.is_empty()
            && self.indexes_to_drop.is_empty()
    }

    /// Marks a field as altered, once.
    pub(crate) fn alter(&mut self, field: &str) {
        if !self.columns_to_alter.iter().any(|altered| altered == field) {
            self.columns_to_alter.push(field.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        assert!(TableChanges::default().is_empty());
    }

    #[test]
    fn test_any_list_makes_it_non_empty() {
        let changes = TableChanges {
            unique_columns_to_drop: vec!["email".into()],
            ..TableChanges::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_alter_dedupes() {
        let mut changes = TableChanges::default();
        changes.alter("name");
        changes.alter("name");
        assert_eq!(changes.columns_to_alter, ["name"]);
    }
}
