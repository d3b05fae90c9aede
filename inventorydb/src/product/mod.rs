// Product records and the partial field bag used for insert/update payloads.

use crate::error::{InventoryError, Result};
use crate::schema::Column;
use crate::validation::{FieldIssue, Problem, ValidationReport};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

/// One slot of a write payload. `Absent` leaves the column alone, `Null`
/// explicitly clears it, `Set` writes the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Field::Absent)
    }
}

/// A typed, partial set of product columns.
///
/// Used both for inserts (where the store fills in the id) and for partial
/// updates (where only present fields are written).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductValues {
    pub name: Field<String>,
    pub price: Field<i64>,
    pub quantity: Field<i64>,
    pub supplier_name: Field<String>,
    pub supplier_phone: Field<i64>,
}

impl ProductValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Field::Set(name.into());
        self
    }

    pub fn price(mut self, price: i64) -> Self {
        self.price = Field::Set(price);
        self
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Field::Set(quantity);
        self
    }

    pub fn supplier_name(mut self, supplier: impl Into<String>) -> Self {
        self.supplier_name = Field::Set(supplier.into());
        self
    }

    pub fn supplier_phone(mut self, phone: i64) -> Self {
        self.supplier_phone = Field::Set(phone);
        self
    }

    /// Mark a column as explicitly cleared.
    pub fn clear(mut self, column: Column) -> Self {
        match column {
            Column::Name => self.name = Field::Null,
            Column::Price => self.price = Field::Null,
            Column::Quantity => self.quantity = Field::Null,
            Column::SupplierName => self.supplier_name = Field::Null,
            Column::SupplierPhone => self.supplier_phone = Field::Null,
            Column::Id => {}
        }
        self
    }

    /// True when no column is present at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of present columns.
    pub fn len(&self) -> usize {
        [
            self.name.is_present(),
            self.price.is_present(),
            self.quantity.is_present(),
            self.supplier_name.is_present(),
            self.supplier_phone.is_present(),
        ]
        .iter()
        .filter(|p| **p)
        .count()
    }

    /// The present columns paired with their SQL values, in table order.
    pub fn to_sql_pairs(&self) -> Vec<(Column, SqlValue)> {
        Column::WRITABLE
            .into_iter()
            .filter_map(|column| self.sql_value(column).map(|v| (column, v)))
            .collect()
    }

    /// The SQL value for one column, or `None` when the field is absent.
    fn sql_value(&self, column: Column) -> Option<SqlValue> {
        fn text(field: &Field<String>) -> Option<SqlValue> {
            match field {
                Field::Absent => None,
                Field::Null => Some(SqlValue::Null),
                Field::Set(s) => Some(SqlValue::Text(s.clone())),
            }
        }
        fn int(field: &Field<i64>) -> Option<SqlValue> {
            match field {
                Field::Absent => None,
                Field::Null => Some(SqlValue::Null),
                Field::Set(n) => Some(SqlValue::Integer(*n)),
            }
        }

        match column {
            Column::Id => None,
            Column::Name => text(&self.name),
            Column::Price => int(&self.price),
            Column::Quantity => int(&self.quantity),
            Column::SupplierName => text(&self.supplier_name),
            Column::SupplierPhone => int(&self.supplier_phone),
        }
    }

    /// Build a payload from a JSON object. Keys may be SQL column names or
    /// snake_case field names; a missing key is `Absent`, `null` is `Null`.
    /// Numbers given as numeric strings are accepted. Anything else that has
    /// the wrong type is reported as a validation failure.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let map = json.as_object().ok_or_else(|| {
            InventoryError::ValidationFailed(ValidationReport::single(
                Column::Id,
                Problem::WrongType("payload must be a JSON object"),
            ))
        })?;

        let mut values = ProductValues::new();
        let mut report = ValidationReport::default();

        for (key, raw) in map {
            let Some(column) = Column::from_name(key) else {
                report.push(FieldIssue::new(Column::Id, Problem::UnknownField(key.clone())));
                continue;
            };
            match column {
                Column::Id => report.push(FieldIssue::new(Column::Id, Problem::NotWritable)),
                Column::Name => values.name = json_text(column, raw, &mut report),
                Column::SupplierName => values.supplier_name = json_text(column, raw, &mut report),
                Column::Price => values.price = json_int(column, raw, &mut report),
                Column::Quantity => values.quantity = json_int(column, raw, &mut report),
                Column::SupplierPhone => values.supplier_phone = json_int(column, raw, &mut report),
            }
        }

        if report.is_ok() {
            Ok(values)
        } else {
            Err(InventoryError::ValidationFailed(report))
        }
    }
}

fn json_text(column: Column, raw: &serde_json::Value, report: &mut ValidationReport) -> Field<String> {
    match raw {
        serde_json::Value::Null => Field::Null,
        serde_json::Value::String(s) => Field::Set(s.clone()),
        _ => {
            report.push(FieldIssue::new(column, Problem::WrongType("expected text")));
            Field::Absent
        }
    }
}

fn json_int(column: Column, raw: &serde_json::Value, report: &mut ValidationReport) -> Field<i64> {
    match raw {
        serde_json::Value::Null => Field::Null,
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Field::Set(v),
            None => {
                report.push(FieldIssue::new(column, Problem::WrongType("expected integer")));
                Field::Absent
            }
        },
        serde_json::Value::String(s) => match s.trim().parse::<i64>() {
            Ok(v) => Field::Set(v),
            Err(_) => {
                report.push(FieldIssue::new(column, Problem::WrongType("expected integer")));
                Field::Absent
            }
        },
        _ => {
            report.push(FieldIssue::new(column, Problem::WrongType("expected integer")));
            Field::Absent
        }
    }
}

/// A fully materialised product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
    pub supplier_name: String,
    pub supplier_phone: i64,
}

impl Product {
    /// The payload that would recreate this product (without its id).
    pub fn to_values(&self) -> ProductValues {
        ProductValues::new()
            .name(self.name.clone())
            .price(self.price)
            .quantity(self.quantity)
            .supplier_name(self.supplier_name.clone())
            .supplier_phone(self.supplier_phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_and_len() {
        let values = ProductValues::new().name("Widget").quantity(5);
        assert_eq!(values.len(), 2);
        assert!(!values.is_empty());
        assert!(ProductValues::new().is_empty());
    }

    #[test]
    fn test_absent_and_null_are_distinct() {
        let values = ProductValues::new().clear(Column::Price);
        let pairs = values.to_sql_pairs();
        assert_eq!(pairs, vec![(Column::Price, SqlValue::Null)]);
        assert_eq!(values.quantity, Field::Absent);
    }

    #[test]
    fn test_sql_pairs_follow_writable_column_order() {
        let values = ProductValues::new()
            .supplier_phone(5551234)
            .quantity(5)
            .name("Widget");
        let columns: Vec<Column> = values.to_sql_pairs().into_iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec![Column::Name, Column::Quantity, Column::SupplierPhone]);
    }

    #[test]
    fn test_from_json_accepts_both_key_styles() {
        let json = serde_json::json!({
            "Product_Name": "Widget",
            "price": 10,
            "quantity": "5",
            "supplier_name": "Acme",
            "Supplier_Phone_Number": 5551234,
        });
        let values = ProductValues::from_json(&json).unwrap();
        assert_eq!(
            values,
            ProductValues::new()
                .name("Widget")
                .price(10)
                .quantity(5)
                .supplier_name("Acme")
                .supplier_phone(5551234)
        );
    }

    #[test]
    fn test_from_json_null_clears() {
        let values = ProductValues::from_json(&serde_json::json!({ "price": null })).unwrap();
        assert_eq!(values.price, Field::Null);
        assert_eq!(values.name, Field::Absent);
    }

    #[test]
    fn test_from_json_reports_bad_types() {
        let err = ProductValues::from_json(&serde_json::json!({
            "supplier_phone": "call me",
            "colour": "red",
            "id": 4,
        }))
        .unwrap_err();
        match err {
            InventoryError::ValidationFailed(report) => assert_eq!(report.issues().len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_product_to_values_round_trip() {
        let product = Product {
            id: 1,
            name: "Widget".into(),
            price: 10,
            quantity: 5,
            supplier_name: "Acme".into(),
            supplier_phone: 5551234,
        };
        assert_eq!(product.to_values().len(), 5);
    }
}
