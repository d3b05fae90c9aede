use crate::error::{InventoryError, Result};
use crate::observer::{ChangeEvent, Subscription};
use crate::product::Product;
use crate::product_db::RowSet;
use crate::schema::Column;
use rusqlite::types::Value as SqlValue;
use std::time::Duration;

/// Query result rows plus a live subscription to the queried address.
///
/// The rows are a snapshot. When [`Cursor::has_changed`] reports a change the
/// caller should run the query again.
pub struct Cursor {
    rows: RowSet,
    subscription: Subscription,
}

impl Cursor {
    pub(crate) fn new(rows: RowSet, subscription: Subscription) -> Self {
        Cursor { rows, subscription }
    }

    pub fn columns(&self) -> &[Column] {
        &self.rows.columns
    }

    pub fn len(&self) -> usize {
        self.rows.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows.rows
    }

    fn index_of(&self, column: Column) -> Option<usize> {
        self.rows.columns.iter().position(|c| *c == column)
    }

    /// The raw value at `row` for `column`, if both exist.
    pub fn get(&self, row: usize, column: Column) -> Option<&SqlValue> {
        let index = self.index_of(column)?;
        self.rows.rows.get(row)?.get(index)
    }

    pub fn get_i64(&self, row: usize, column: Column) -> Option<i64> {
        match self.get(row, column)? {
            SqlValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_str(&self, row: usize, column: Column) -> Option<&str> {
        match self.get(row, column)? {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Decode every row into a [`Product`]. The projection must include all
    /// columns.
    pub fn products(&self) -> Result<Vec<Product>> {
        let mut products = Vec::with_capacity(self.len());
        for row in 0..self.len() {
            products.push(Product {
                id: self.require_i64(row, Column::Id)?,
                name: self.require_str(row, Column::Name)?,
                price: self.require_i64(row, Column::Price)?,
                quantity: self.require_i64(row, Column::Quantity)?,
                supplier_name: self.require_str(row, Column::SupplierName)?,
                supplier_phone: self.require_i64(row, Column::SupplierPhone)?,
            });
        }
        Ok(products)
    }

    fn require_i64(&self, row: usize, column: Column) -> Result<i64> {
        self.get_i64(row, column).ok_or_else(|| self.decode_error(row, column))
    }

    fn require_str(&self, row: usize, column: Column) -> Result<String> {
        self.get_str(row, column)
            .map(str::to_string)
            .ok_or_else(|| self.decode_error(row, column))
    }

    fn decode_error(&self, row: usize, column: Column) -> InventoryError {
        if self.index_of(column).is_none() {
            InventoryError::Decode(format!("projection does not include {column}"))
        } else {
            InventoryError::Decode(format!("row {row} has no usable value for {column}"))
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let items = self
            .rows
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (column, value) in self.rows.columns.iter().zip(row) {
                    obj.insert(column.field_name().to_string(), sql_to_json(value));
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(items)
    }

    /// True if a change has been published for the queried address since
    /// the last call. Pending notifications are consumed.
    pub fn has_changed(&self) -> bool {
        !self.subscription.drain().is_empty()
    }

    /// Block up to `timeout` for the next change notification.
    pub fn wait_for_change(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.subscription.next_timeout(timeout)
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

fn sql_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(n) => serde_json::Value::Number((*n).into()),
        SqlValue::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::String(s.clone()),
        SqlValue::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into()),
    }
}
