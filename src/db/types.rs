//! Query result types for sqldocx.
//!
//! Defines the structures used to represent statement results from the database.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::time::Duration;

/// Rows and metadata produced by a successfully executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata for the first result set, in server order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data, each aligned with `columns`.
    pub rows: Vec<Row>,

    /// Rows affected as reported by the server (commands only).
    pub rows_affected: u64,

    /// Time taken to execute the statement.
    pub execution_time: Duration,
}

impl ResultSet {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result set with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Creates a row-less result for a command that touched `count` rows.
    pub fn affected(count: u64) -> Self {
        Self {
            rows_affected: count,
            ..Default::default()
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of one statement: rows, or the error the server reported.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success(ResultSet),
    Failure { message: String },
}

impl QueryResult {
    /// Creates a failure result carrying the message verbatim.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Returns true for a successful result.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value (`bit`).
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Exact numeric, kept as its decimal text.
    Decimal(String),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date.
    Date(NaiveDate),

    /// Date and time without offset.
    DateTime(NaiveDateTime),

    /// Date and time normalised to UTC.
    DateTimeUtc(DateTime<Utc>),

    /// Time of day.
    Time(NaiveTime),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the calendar date for date-typed values.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::DateTimeUtc(dt) => Some(dt.date_naive()),
            _ => None,
        }
    }

    /// Returns the value in its default string form.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.clone(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => {
                let mut hex = String::with_capacity(2 + b.len() * 2);
                hex.push_str("0x");
                for byte in b {
                    hex.push_str(&format!("{byte:02X}"));
                }
                hex
            }
            Value::Date(d) => d.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::DateTimeUtc(dt) => dt.to_rfc3339(),
            Value::Time(t) => t.to_string(),
        }
    }
}

/// Lets drivers map `Option<Value>` columns with `.into()`.
impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.5).to_display_string(), "2.5");
        assert_eq!(Value::Decimal("10.50".into()).to_display_string(), "10.50");
        assert_eq!(Value::Bytes(vec![0x0A, 0xFF]).to_display_string(), "0x0AFF");
        assert_eq!(
            Value::Time(NaiveTime::from_hms_opt(13, 5, 0).unwrap()).to_display_string(),
            "13:05:00"
        );
    }

    #[test]
    fn test_value_as_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let dt = date.and_hms_opt(23, 59, 59).unwrap();

        assert_eq!(Value::Date(date).as_date(), Some(date));
        assert_eq!(Value::DateTime(dt).as_date(), Some(date));
        assert_eq!(Value::DateTimeUtc(dt.and_utc()).as_date(), Some(date));
        assert_eq!(Value::String("2024-02-29".into()).as_date(), None);
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<Value>), Value::Null);
        assert_eq!(Value::from(Some(Value::Int(42))), Value::Int(42));
    }

    #[test]
    fn test_result_set_constructors() {
        let result = ResultSet::with_data(
            vec![ColumnInfo::new("id", "int")],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        assert_eq!(result.row_count(), 2);
        assert!(!result.is_empty());

        let affected = ResultSet::affected(3);
        assert!(affected.is_empty());
        assert_eq!(affected.rows_affected, 3);
    }

    #[test]
    fn test_query_result_failure() {
        let result = QueryResult::failure("Invalid column name 'x'.");
        assert!(!result.is_success());
        assert_eq!(
            result,
            QueryResult::Failure {
                message: "Invalid column name 'x'.".to_string()
            }
        );
    }
}
