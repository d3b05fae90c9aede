use crate::error::{InventoryError, Result};
use crate::product::ProductValues;
use crate::schema::{self, Column, SCHEMA_VERSION, TABLE_NAME};
use crate::selection::{Selection, SortOrder};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The relational backend: one SQLite connection holding the products table.
///
/// The connection sits behind a mutex so concurrent callers are serialized;
/// every statement sees either the state before or after another caller's
/// write, never a partial row.
pub struct ProductDb {
    conn: Mutex<Connection>,
}

/// Rows returned by a query, in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// What a bulk write touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows the backend reported as changed.
    pub rows: usize,
    /// Ids of the rows matched by the filter, captured in the same transaction.
    pub ids: Vec<i64>,
}

impl ProductDb {
    /// Open or create the product database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Journal mode {mode} for {}", path.display());
        Self::with_connection(conn)
    }

    /// Open an in-memory product database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        initialize_schema(&conn)?;
        Ok(ProductDb {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic elsewhere while holding the lock leaves SQLite itself intact.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The schema version recorded in the database file.
    pub fn schema_version(&self) -> Result<i32> {
        let version = self
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Run a projection/filter/sort against the products table.
    pub fn query(
        &self,
        projection: &[Column],
        selection: Option<&Selection>,
        sort: Option<&SortOrder>,
    ) -> Result<RowSet> {
        let columns: Vec<Column> = if projection.is_empty() {
            Column::ALL.to_vec()
        } else {
            projection.to_vec()
        };
        let column_list: Vec<&str> = columns.iter().map(|c| c.sql_name()).collect();

        let mut sql = format!("SELECT {} FROM {TABLE_NAME}", column_list.join(", "));
        push_where(&mut sql, selection);
        if let Some(sort) = sort {
            sql.push_str(" ORDER BY ");
            sql.push_str(sort.as_str());
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let width = columns.len();
        let rows = stmt.query_map(params_from_iter(selection_args(selection)), |row| {
            (0..width).map(|i| row.get::<_, SqlValue>(i)).collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut result = RowSet {
            columns,
            rows: Vec::new(),
        };
        for row in rows {
            result.rows.push(row?);
        }
        Ok(result)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert a row built from the present fields. Returns the assigned id.
    pub fn insert(&self, values: &ProductValues) -> Result<i64> {
        let pairs = values.to_sql_pairs();
        let conn = self.conn();

        if pairs.is_empty() {
            conn.execute(&format!("INSERT INTO {TABLE_NAME} DEFAULT VALUES"), [])?;
        } else {
            let names: Vec<&str> = pairs.iter().map(|(c, _)| c.sql_name()).collect();
            let marks = vec!["?"; pairs.len()].join(", ");
            let sql = format!(
                "INSERT INTO {TABLE_NAME} ({}) VALUES ({marks})",
                names.join(", ")
            );
            conn.execute(&sql, params_from_iter(pairs.iter().map(|(_, v)| v)))?;
        }

        Ok(conn.last_insert_rowid())
    }

    /// Write the present fields to every row matching `selection` (all rows
    /// when `None`).
    pub fn update(&self, values: &ProductValues, selection: Option<&Selection>) -> Result<WriteOutcome> {
        let pairs = values.to_sql_pairs();
        if pairs.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let assignments: Vec<String> = pairs
            .iter()
            .map(|(c, _)| format!("{} = ?", c.sql_name()))
            .collect();
        let mut sql = format!("UPDATE {TABLE_NAME} SET {}", assignments.join(", "));
        push_where(&mut sql, selection);

        let params: Vec<&SqlValue> = pairs
            .iter()
            .map(|(_, v)| v)
            .chain(selection_args(selection))
            .collect();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ids = matching_ids(&tx, selection)?;
        let rows = tx.execute(&sql, params_from_iter(params))?;
        tx.commit()?;

        Ok(WriteOutcome { rows, ids })
    }

    /// Delete every row matching `selection` (all rows when `None`).
    pub fn delete(&self, selection: Option<&Selection>) -> Result<WriteOutcome> {
        let mut sql = format!("DELETE FROM {TABLE_NAME}");
        push_where(&mut sql, selection);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ids = matching_ids(&tx, selection)?;
        let rows = tx.execute(&sql, params_from_iter(selection_args(selection)))?;
        tx.commit()?;

        Ok(WriteOutcome { rows, ids })
    }
}

/// Create the table on a fresh database, rebuild it when the file predates
/// the current layout, and refuse files written by a newer version.
fn initialize_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(InventoryError::Config(format!(
            "Database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    if version != 0 && version < SCHEMA_VERSION {
        log::info!("Upgrading products table from schema version {version} to {SCHEMA_VERSION}");
        conn.execute_batch(&schema::drop_table_sql())?;
    }

    conn.execute_batch(&schema::create_table_sql())?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn push_where(sql: &mut String, selection: Option<&Selection>) {
    if let Some(selection) = selection {
        sql.push_str(" WHERE (");
        sql.push_str(selection.clause());
        sql.push(')');
    }
}

fn selection_args(selection: Option<&Selection>) -> impl Iterator<Item = &SqlValue> {
    selection.map(|s| s.args()).unwrap_or(&[]).iter()
}

fn matching_ids(conn: &Connection, selection: Option<&Selection>) -> Result<Vec<i64>> {
    let mut sql = format!("SELECT {} FROM {TABLE_NAME}", Column::Id.sql_name());
    push_where(&mut sql, selection);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(selection_args(selection)), |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(name: &str, quantity: i64) -> ProductValues {
        ProductValues::new()
            .name(name)
            .price(10)
            .quantity(quantity)
            .supplier_name("Acme")
            .supplier_phone(5551234)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let db = ProductDb::open_in_memory().unwrap();
        let a = db.insert(&widget("A", 1)).unwrap();
        let b = db.insert(&widget("B", 2)).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = ProductDb::open_in_memory().unwrap();
        let a = db.insert(&widget("A", 1)).unwrap();
        db.delete(Some(&Selection::by_id(a))).unwrap();
        let b = db.insert(&widget("B", 1)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_query_projection_filter_sort() {
        let db = ProductDb::open_in_memory().unwrap();
        db.insert(&widget("A", 5)).unwrap();
        db.insert(&widget("B", 0)).unwrap();
        db.insert(&widget("C", 9)).unwrap();

        let rows = db
            .query(
                &[Column::Name, Column::Quantity],
                Some(&Selection::new("Quantity > ?").arg(0i64)),
                Some(&SortOrder::new("Quantity DESC")),
            )
            .unwrap();

        assert_eq!(rows.columns, vec![Column::Name, Column::Quantity]);
        assert_eq!(
            rows.rows,
            vec![
                vec![SqlValue::Text("C".into()), SqlValue::Integer(9)],
                vec![SqlValue::Text("A".into()), SqlValue::Integer(5)],
            ]
        );
    }

    #[test]
    fn test_empty_projection_means_all_columns() {
        let db = ProductDb::open_in_memory().unwrap();
        db.insert(&widget("A", 5)).unwrap();
        let rows = db.query(&[], None, None).unwrap();
        assert_eq!(rows.columns, Column::ALL.to_vec());
        assert_eq!(rows.rows[0].len(), 6);
    }

    #[test]
    fn test_missing_required_column_rejected_by_table() {
        let db = ProductDb::open_in_memory().unwrap();
        let result = db.insert(&ProductValues::new().name("No supplier"));
        assert!(matches!(result, Err(InventoryError::Sqlite(_))));
    }

    #[test]
    fn test_bulk_update_reports_matched_ids() {
        let db = ProductDb::open_in_memory().unwrap();
        db.insert(&widget("A", 0)).unwrap();
        db.insert(&widget("B", 3)).unwrap();
        db.insert(&widget("C", 0)).unwrap();

        let outcome = db
            .update(&ProductValues::new().quantity(10), Some(&Selection::new("Quantity = 0")))
            .unwrap();
        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.ids, vec![1, 3]);
    }

    #[test]
    fn test_update_without_fields_is_noop() {
        let db = ProductDb::open_in_memory().unwrap();
        db.insert(&widget("A", 1)).unwrap();
        let outcome = db.update(&ProductValues::new(), None).unwrap();
        assert_eq!(outcome, WriteOutcome::default());
    }

    #[test]
    fn test_delete_all_rows() {
        let db = ProductDb::open_in_memory().unwrap();
        db.insert(&widget("A", 1)).unwrap();
        db.insert(&widget("B", 1)).unwrap();
        let outcome = db.delete(None).unwrap();
        assert_eq!(outcome.rows, 2);
        assert!(db.query(&[], None, None).unwrap().rows.is_empty());
    }

    #[test]
    fn test_schema_version_recorded() {
        let db = ProductDb::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_existing_rows_survive_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("inventory.db");
        {
            let db = ProductDb::open(&path).unwrap();
            db.insert(&widget("A", 1)).unwrap();
        }
        let db = ProductDb::open(&path).unwrap();
        assert_eq!(db.query(&[], None, None).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_newer_schema_version_refused() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("inventory.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        }
        assert!(matches!(ProductDb::open(&path), Err(InventoryError::Config(_))));
    }
}
