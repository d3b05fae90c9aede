use crate::error::{InventoryError, Result};
use crate::schema::{Column, TABLE_NAME};
use rusqlite::types::Value as SqlValue;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

/// A caller-supplied row filter: a SQL boolean expression with `?`
/// placeholders, plus the values bound to them in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    clause: String,
    args: Vec<SqlValue>,
}

impl Selection {
    pub fn new(clause: impl Into<String>) -> Self {
        Selection {
            clause: clause.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(clause: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Selection {
            clause: clause.into(),
            args,
        }
    }

    /// `_id = ?` bound to `id`. Item addresses always use this.
    pub fn by_id(id: i64) -> Self {
        Selection::with_args(format!("{} = ?", Column::Id.sql_name()), vec![SqlValue::Integer(id)])
    }

    /// Bind one more argument.
    pub fn arg(mut self, value: impl Into<SqlValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    /// Check the clause is a single well-formed expression and that the
    /// placeholder count matches the bound arguments.
    pub fn validate(&self) -> Result<()> {
        let sql = format!("SELECT {} FROM {TABLE_NAME} WHERE ({})", Column::Id.sql_name(), self.clause);
        let query = parse_single_query(&sql, &self.clause)?;
        if !matches!(*query.body, SetExpr::Select(_)) || !query.order_by.is_empty() || query.limit.is_some() {
            return Err(InventoryError::InvalidSelection(format!(
                "'{}' must be a plain filter expression",
                self.clause
            )));
        }

        let placeholders = count_placeholders(&self.clause)?;
        if placeholders != self.args.len() {
            return Err(InventoryError::InvalidSelection(format!(
                "'{}' has {placeholders} placeholder(s) but {} argument(s) were bound",
                self.clause,
                self.args.len()
            )));
        }
        Ok(())
    }
}

/// A caller-supplied `ORDER BY` list, e.g. `Price DESC, Product_Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder(String);

impl SortOrder {
    pub fn new(order: impl Into<String>) -> Self {
        SortOrder(order.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<()> {
        let sql = format!("SELECT {} FROM {TABLE_NAME} ORDER BY {}", Column::Id.sql_name(), self.0);
        let query = parse_single_query(&sql, &self.0)?;
        if !matches!(*query.body, SetExpr::Select(_)) {
            return Err(InventoryError::InvalidSelection(format!(
                "'{}' must be a plain ordering list",
                self.0
            )));
        }
        if count_placeholders(&self.0)? > 0 {
            return Err(InventoryError::InvalidSelection(format!(
                "sort order '{}' cannot take arguments",
                self.0
            )));
        }
        Ok(())
    }
}

fn parse_single_query(sql: &str, fragment: &str) -> Result<Box<Query>> {
    let mut statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| InventoryError::InvalidSelection(format!("'{fragment}': {e}")))?;

    match (statements.pop(), statements.is_empty()) {
        (Some(Statement::Query(query)), true) => Ok(query),
        _ => Err(InventoryError::InvalidSelection(format!(
            "'{fragment}' must not contain more than one statement"
        ))),
    }
}

/// Count anonymous `?` placeholders. Numbered or named placeholders would
/// collide with the parameters the backend binds ahead of the filter.
fn count_placeholders(fragment: &str) -> Result<usize> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, fragment)
        .tokenize()
        .map_err(|e| InventoryError::InvalidSelection(format!("'{fragment}': {e}")))?;

    let mut count = 0;
    for token in &tokens {
        if let Token::Placeholder(p) = token {
            if p != "?" {
                return Err(InventoryError::InvalidSelection(format!(
                    "'{fragment}': only anonymous '?' placeholders are supported, found '{p}'"
                )));
            }
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_filters() {
        Selection::new("Quantity = 0").validate().unwrap();
        Selection::new("Price > ? AND Supplier_Name = ?")
            .arg(5i64)
            .arg("Acme".to_string())
            .validate()
            .unwrap();
        Selection::by_id(3).validate().unwrap();
    }

    #[test]
    fn test_rejects_stacked_statements() {
        let err = Selection::new("1 = 1; DROP TABLE products").validate().unwrap_err();
        assert!(matches!(err, InventoryError::InvalidSelection(_)));
    }

    #[test]
    fn test_rejects_unbalanced_clause() {
        assert!(Selection::new("1 = 1) UNION SELECT (1").validate().is_err());
        assert!(Selection::new("Price >").validate().is_err());
    }

    #[test]
    fn test_placeholder_count_must_match() {
        let err = Selection::new("Price > ?").validate().unwrap_err();
        assert!(err.to_string().contains("placeholder"));
        assert!(Selection::new("Price > 1").arg(2i64).validate().is_err());
    }

    #[test]
    fn test_numbered_placeholders_rejected() {
        let err = Selection::new("Price > ?1").arg(2i64).validate().unwrap_err();
        assert!(err.to_string().contains("anonymous"));
    }

    #[test]
    fn test_sort_orders() {
        SortOrder::new("Price DESC, Product_Name").validate().unwrap();
        assert!(SortOrder::new("Price; DELETE FROM products").validate().is_err());
        assert!(SortOrder::new("Price = ?").validate().is_err());
    }
}
