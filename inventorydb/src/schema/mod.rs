// Table contract for the products table: column names, storage types, DDL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the single table backing the store.
pub const TABLE_NAME: &str = "products";

/// Path segment under the authority that addresses the products table.
pub const PATH_PRODUCTS: &str = "products";

/// Bumped whenever the table layout changes. Stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Default authority used when no configuration overrides it.
pub const DEFAULT_AUTHORITY: &str = "com.example.android.inventoryapp";

/// Storage affinity of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    /// The type name used in DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A column of the products table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Name,
    Price,
    Quantity,
    SupplierName,
    SupplierPhone,
}

impl Column {
    /// Every column, in table order.
    pub const ALL: [Column; 6] = [
        Column::Id,
        Column::Name,
        Column::Price,
        Column::Quantity,
        Column::SupplierName,
        Column::SupplierPhone,
    ];

    /// The columns a caller may write. `_id` is assigned by the store.
    pub const WRITABLE: [Column; 5] = [
        Column::Name,
        Column::Price,
        Column::Quantity,
        Column::SupplierName,
        Column::SupplierPhone,
    ];

    /// The column name as persisted in SQLite.
    pub fn sql_name(self) -> &'static str {
        match self {
            Column::Id => "_id",
            Column::Name => "Product_Name",
            Column::Price => "Price",
            Column::Quantity => "Quantity",
            Column::SupplierName => "Supplier_Name",
            Column::SupplierPhone => "Supplier_Phone_Number",
        }
    }

    /// The snake_case field name used in JSON and on the command line.
    pub fn field_name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Name => "name",
            Column::Price => "price",
            Column::Quantity => "quantity",
            Column::SupplierName => "supplier_name",
            Column::SupplierPhone => "supplier_phone",
        }
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Column::Name | Column::SupplierName => ColumnType::Text,
            _ => ColumnType::Integer,
        }
    }

    /// Look a column up by either its SQL name or its field name.
    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL
            .into_iter()
            .find(|c| c.sql_name().eq_ignore_ascii_case(name) || c.field_name() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// DDL for the products table at `SCHEMA_VERSION`.
///
/// The mediator enforces non-empty text and non-negative numbers; the table
/// only rejects NULL in the mandatory columns, so a lenient-mode write that
/// skips a required field is refused here instead.
pub fn create_table_sql() -> String {
    let columns: Vec<String> = Column::ALL
        .iter()
        .map(|c| format!("{} {}{}", c.sql_name(), c.column_type().sql_type(), constraint(*c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (\n    {}\n);",
        columns.join(",\n    ")
    )
}

fn constraint(column: Column) -> &'static str {
    match column {
        Column::Id => " PRIMARY KEY AUTOINCREMENT",
        Column::Price | Column::Quantity => " NOT NULL DEFAULT 0",
        Column::Name | Column::SupplierName | Column::SupplierPhone => " NOT NULL",
    }
}

pub fn drop_table_sql() -> String {
    format!("DROP TABLE IF EXISTS {TABLE_NAME};")
}

/// Content-type descriptor for the whole products collection.
pub fn collection_content_type(authority: &str) -> String {
    format!("vnd.inventory.dir/{authority}/{PATH_PRODUCTS}")
}

/// Content-type descriptor for a single product.
pub fn item_content_type(authority: &str) -> String {
    format!("vnd.inventory.item/{authority}/{PATH_PRODUCTS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup_by_either_name() {
        assert_eq!(Column::from_name("Supplier_Phone_Number"), Some(Column::SupplierPhone));
        assert_eq!(Column::from_name("supplier_phone"), Some(Column::SupplierPhone));
        assert_eq!(Column::from_name("product_name"), Some(Column::Name));
        assert_eq!(Column::from_name("_id"), Some(Column::Id));
        assert_eq!(Column::from_name("colour"), None);
    }

    #[test]
    fn test_content_types_differ_per_kind() {
        let dir = collection_content_type(DEFAULT_AUTHORITY);
        let item = item_content_type(DEFAULT_AUTHORITY);
        assert_ne!(dir, item);
        assert!(dir.ends_with("/products"));
        assert!(item.ends_with("/products"));
    }

    #[test]
    fn test_ddl_names_every_column() {
        let ddl = create_table_sql();
        for column in Column::ALL {
            assert!(ddl.contains(column.sql_name()), "missing {column}");
        }
        assert!(ddl.contains("_id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(ddl.contains("Product_Name TEXT NOT NULL,"));
        assert!(ddl.contains("Quantity INTEGER NOT NULL DEFAULT 0"));
        assert!(ddl.contains("Supplier_Phone_Number INTEGER NOT NULL\n"));
    }
}
