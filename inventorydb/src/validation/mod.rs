use crate::error::{InventoryError, Result};
use crate::product::{Field, ProductValues};
use crate::schema::Column;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// Required on insert but absent or null.
    Missing,
    /// Text that is empty or only whitespace.
    Empty,
    /// A count or amount below zero.
    Negative(i64),
    /// An amount that must be at least one.
    NotPositive(i64),
    /// A numeric column explicitly set to null.
    Cleared,
    WrongType(&'static str),
    UnknownField(String),
    /// The caller tried to supply the store-assigned id.
    NotWritable,
}

/// A problem attached to the column it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub column: Column,
    pub problem: Problem,
}

impl FieldIssue {
    pub fn new(column: Column, problem: Problem) -> Self {
        FieldIssue { column, problem }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.column.field_name();
        match &self.problem {
            Problem::Missing => write!(f, "Product requires a value for '{field}'"),
            Problem::Empty => write!(f, "Field '{field}' must not be empty"),
            Problem::Negative(n) => write!(f, "Field '{field}' must be >= 0, got {n}"),
            Problem::NotPositive(n) => write!(f, "Field '{field}' must be > 0, got {n}"),
            Problem::Cleared => write!(f, "Field '{field}' cannot be cleared"),
            Problem::WrongType(expected) => write!(f, "Field '{field}': {expected}"),
            Problem::UnknownField(name) => write!(f, "Unknown field '{name}'"),
            Problem::NotWritable => write!(f, "Field '{field}' is assigned by the store"),
        }
    }
}

/// Result of validating a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn single(column: Column, problem: Problem) -> Self {
        ValidationReport {
            issues: vec![FieldIssue::new(column, problem)],
        }
    }

    pub fn push(&mut self, issue: FieldIssue) {
        self.issues.push(issue);
    }

    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    /// True if any issue is recorded against `column`.
    pub fn mentions(&self, column: Column) -> bool {
        self.issues.iter().any(|i| i.column == column)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Which write a payload is headed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
}

/// How validation failures affect the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Any issue rejects the write with `ValidationFailed`.
    #[default]
    Strict,
    /// Issues are reported but the write is still attempted.
    Lenient,
}

impl std::str::FromStr for ValidationMode {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(InventoryError::Config(format!(
                "Unknown validation mode '{other}' (expected strict or lenient)"
            ))),
        }
    }
}

/// Validate a payload.
///
/// Only present fields are checked on update. On insert the name, supplier
/// name and supplier phone are mandatory; price and quantity may be left out
/// and fall back to the column defaults.
pub fn validate_product(values: &ProductValues, kind: WriteKind) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_text(Column::Name, &values.name, kind, &mut report);
    check_count(Column::Price, &values.price, &mut report);
    check_count(Column::Quantity, &values.quantity, &mut report);
    check_text(Column::SupplierName, &values.supplier_name, kind, &mut report);

    match &values.supplier_phone {
        Field::Absent if kind == WriteKind::Insert => {
            report.push(FieldIssue::new(Column::SupplierPhone, Problem::Missing));
        }
        Field::Null => report.push(FieldIssue::new(Column::SupplierPhone, Problem::Missing)),
        _ => {}
    }

    report
}

/// Validate and apply the mode: strict turns any issue into an error,
/// lenient hands the report back for the caller to surface.
pub fn enforce(values: &ProductValues, kind: WriteKind, mode: ValidationMode) -> Result<ValidationReport> {
    let report = validate_product(values, kind);
    if !report.is_ok() && mode == ValidationMode::Strict {
        return Err(InventoryError::ValidationFailed(report));
    }
    Ok(report)
}

fn check_text(column: Column, field: &Field<String>, kind: WriteKind, report: &mut ValidationReport) {
    match field {
        Field::Absent if kind == WriteKind::Insert => {
            report.push(FieldIssue::new(column, Problem::Missing));
        }
        Field::Absent => {}
        Field::Null => report.push(FieldIssue::new(column, Problem::Missing)),
        Field::Set(s) if s.trim().is_empty() => {
            report.push(FieldIssue::new(column, Problem::Empty));
        }
        Field::Set(_) => {}
    }
}

fn check_count(column: Column, field: &Field<i64>, report: &mut ValidationReport) {
    match field {
        Field::Set(n) if *n < 0 => report.push(FieldIssue::new(column, Problem::Negative(*n))),
        Field::Null => report.push(FieldIssue::new(column, Problem::Cleared)),
        _ => {}
    }
}
