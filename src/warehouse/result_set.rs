//! Result Set - tabular rows returned by the warehouse and their typed decoding
//!
//! Cells stay as JSON values at the boundary. Records are pulled out of a row by column
//! name through an index built once per result set, so callers never pass untyped rows
//! further than the module that issued the query.

use crate::error::{InsightsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Convenience constructor for fixtures and stubs.
    pub fn from_columns(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Map every row to `T`, failing on the first row that does not decode.
    pub fn decode<T: FromRow>(&self) -> Result<Vec<T>> {
        let index = ColumnIndex::new(&self.columns);
        self.rows
            .iter()
            .enumerate()
            .map(|(i, values)| {
                T::from_row(&Row {
                    index: &index,
                    values,
                })
                .map_err(|e| InsightsError::Decode(format!("row {}: {}", i, e)))
            })
            .collect()
    }

    /// First cell of the first row, if any.
    pub fn first_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Case-insensitive column name to position lookup.
#[derive(Debug)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(columns: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            // first occurrence wins for duplicate names
            positions.entry(name.to_uppercase()).or_insert(i);
        }
        Self { positions }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&name.to_uppercase()).copied()
    }
}

/// A borrowed row with name-based accessors.
pub struct Row<'a> {
    index: &'a ColumnIndex,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Raw cell for `name`; `None` when the column is absent.
    pub fn value(&self, name: &str) -> Option<&'a Value> {
        self.index.position(name).and_then(|i| self.values.get(i))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.position(name).is_some()
    }

    pub fn opt_string(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn string(&self, name: &str) -> Result<String> {
        self.opt_string(name)
            .ok_or_else(|| InsightsError::Decode(format!("column {} is missing or null", name)))
    }

    /// Numeric cell; the HTTP API sends numbers as decimal strings, local frames as numbers.
    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                InsightsError::Decode(format!("column {} is not numeric: '{}'", name, s))
            }),
            Some(other) => Err(InsightsError::Decode(format!(
                "column {} is not numeric: {}",
                name, other
            ))),
        }
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.opt_f64(name)?
            .ok_or_else(|| InsightsError::Decode(format!("column {} is missing or null", name)))
    }

    pub fn opt_u64(&self, name: &str) -> Result<Option<u64>> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_u64().or_else(|| n.as_f64().map(|f| f as u64))),
            Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| {
                InsightsError::Decode(format!("column {} is not a count: '{}'", name, s))
            }),
            Some(other) => Err(InsightsError::Decode(format!(
                "column {} is not a count: {}",
                name, other
            ))),
        }
    }
}

/// Builds a record from one warehouse row.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Pair {
        name: String,
        amount: Option<f64>,
    }

    impl FromRow for Pair {
        fn from_row(row: &Row<'_>) -> Result<Self> {
            Ok(Pair {
                name: row.string("name")?,
                amount: row.opt_f64("AMOUNT")?,
            })
        }
    }

    #[test]
    fn test_decode_by_name_ignores_position_and_case() {
        let rs = ResultSet::from_columns(
            &["AMOUNT", "NAME"],
            vec![vec![json!("12.5"), json!("Apple")], vec![json!(null), json!("Acme")]],
        );
        let pairs: Vec<Pair> = rs.decode().unwrap();
        assert_eq!(pairs[0].name, "Apple");
        assert_eq!(pairs[0].amount, Some(12.5));
        assert_eq!(pairs[1].amount, None);
    }

    #[test]
    fn test_decode_reports_bad_cells() {
        let rs = ResultSet::from_columns(&["NAME", "AMOUNT"], vec![vec![json!("x"), json!("n/a")]]);
        let err = rs.decode::<Pair>().err().unwrap();
        assert!(matches!(err, InsightsError::Decode(_)));
    }
}
