//! Typed, column-oriented result table.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ReportError;

/// Rendering of timestamp cells in JSON output.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Timestamp(Vec<NaiveDateTime>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Cell<'_>> {
        match self {
            ColumnData::Integer(v) => v.get(index).copied().map(Cell::Integer),
            ColumnData::Float(v) => v.get(index).copied().map(Cell::Float),
            ColumnData::Timestamp(v) => v.get(index).copied().map(Cell::Timestamp),
            ColumnData::Text(v) => v.get(index).map(|s| Cell::Text(s.as_str())),
        }
    }

    /// Append `other`, which must hold the same type.
    fn extend(&mut self, other: ColumnData) -> Result<(), ColumnData> {
        match (self, other) {
            (ColumnData::Integer(a), ColumnData::Integer(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            (_, other) => return Err(other),
        }
        Ok(())
    }
}

/// Borrowed view of a single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Integer(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(&'a str),
}

impl Cell<'_> {
    pub fn to_json(self) -> Value {
        match self {
            Cell::Integer(v) => json!(v),
            // NaN/inf have no JSON representation and become null
            Cell::Float(v) => json!(v),
            Cell::Timestamp(v) => Value::String(v.format(TIMESTAMP_FORMAT).to_string()),
            Cell::Text(v) => Value::String(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }
}

/// Name and type of a column, independent of its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Ordered set of equally long typed columns. Rows are addressed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table; every column must have the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self, ReportError> {
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != expected) {
                return Err(ReportError::ProtocolViolation(format!(
                    "column '{}' has {} values, expected {}",
                    bad.name,
                    bad.data.len(),
                    expected
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.clone(),
                column_type: c.column_type(),
            })
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Values of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<Cell<'_>>> {
        self.columns.iter().map(|c| c.data.get(index)).collect()
    }

    /// Append the rows of `other` after the rows of `self`.
    ///
    /// Both tables must declare the same columns, in the same order and with the same types.
    pub fn append(&mut self, other: Table) -> Result<(), ReportError> {
        if self.schema() != other.schema() {
            return Err(ReportError::ProtocolViolation(format!(
                "page columns {:?} differ from previous pages {:?}",
                other.column_names(),
                self.column_names()
            )));
        }
        for (column, incoming) in self.columns.iter_mut().zip(other.columns) {
            if let Err(data) = column.data.extend(incoming.data) {
                return Err(ReportError::ProtocolViolation(format!(
                    "column '{}' changed type to {}",
                    column.name,
                    data.column_type()
                )));
            }
        }
        Ok(())
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.num_rows())
            .filter_map(|index| self.row(index))
            .map(|cells| {
                self.columns
                    .iter()
                    .zip(cells)
                    .map(|(c, cell)| (c.name.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Schema, row count and records as one JSON document.
    pub fn to_json(&self) -> Value {
        json!({
            "columns": self.schema(),
            "row_count": self.num_rows(),
            "rows": self.to_records(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn users(values: Vec<i64>) -> Table {
        Table::new(vec![Column::new("ga:users", ColumnData::Integer(values))]).unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::new("a", ColumnData::Integer(vec![1, 2])),
            Column::new("b", ColumnData::Text(vec!["x".into()])),
        ])
        .unwrap_err();
        assert!(matches!(err, ReportError::ProtocolViolation(_)));
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let table = Table::new(vec![Column::new(
            "ga:users",
            ColumnData::Integer(Vec::new()),
        )])
        .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["ga:users"]);
        assert_eq!(table.schema()[0].column_type, ColumnType::Integer);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut table = users(vec![1, 2]);
        table.append(users(vec![3, 4])).unwrap();
        table.append(users(vec![5, 6])).unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(
            table.column("ga:users").unwrap().data,
            ColumnData::Integer(vec![1, 2, 3, 4, 5, 6])
        );
        assert_eq!(table.row(5), Some(vec![Cell::Integer(6)]));
        assert_eq!(table.row(6), None);
    }

    #[test]
    fn test_append_rejects_different_columns() {
        let mut table = users(vec![1]);
        let other = Table::new(vec![Column::new("ga:users", ColumnData::Float(vec![1.0]))]).unwrap();
        assert!(matches!(
            table.append(other),
            Err(ReportError::ProtocolViolation(_))
        ));
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_to_json_renders_records() {
        let table = Table::new(vec![
            Column::new("ga:date", ColumnData::Timestamp(vec![ts(2020, 3, 19)])),
            Column::new("ga:userType", ColumnData::Text(vec!["New Visitor".into()])),
            Column::new("ga:bounceRate", ColumnData::Float(vec![12.5])),
        ])
        .unwrap();

        assert_eq!(
            table.to_json(),
            json!({
                "columns": [
                    {"name": "ga:date", "type": "timestamp"},
                    {"name": "ga:userType", "type": "text"},
                    {"name": "ga:bounceRate", "type": "float"}
                ],
                "row_count": 1,
                "rows": [{
                    "ga:date": "2020-03-19T00:00:00",
                    "ga:userType": "New Visitor",
                    "ga:bounceRate": 12.5
                }]
            })
        );
    }
}
