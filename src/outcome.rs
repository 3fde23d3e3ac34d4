//! View Outcome - success / empty / failure result of a dashboard operation
//!
//! Every section of the dashboard reports one of three states. An empty result set is a
//! normal state ("no anomalies found") and is never conflated with a failed query.

use crate::error::InsightsError;
use serde::{Serialize, Serializer};

#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation produced data
    Data(T),
    /// The operation succeeded but there was nothing to show
    Empty,
    /// The operation failed; the error is reported inline for this section only
    Failed(InsightsError),
}

impl<T> Outcome<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, Outcome::Data(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&InsightsError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Data(d) => Outcome::Data(f(d)),
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(e) => Outcome::Failed(e),
        }
    }
}

impl<T> Outcome<Vec<T>> {
    /// Classifies a list-producing result: an empty list becomes [`Outcome::Empty`].
    pub fn from_rows(result: crate::error::Result<Vec<T>>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => Outcome::Empty,
            Ok(rows) => Outcome::Data(rows),
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Number of rows, zero when empty or failed.
    pub fn count(&self) -> usize {
        self.data().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Tagged<'a, T> {
    Data { data: &'a T },
    Empty,
    Failed { error: String },
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tagged = match self {
            Outcome::Data(data) => Tagged::Data { data },
            Outcome::Empty => Tagged::Empty,
            Outcome::Failed(e) => Tagged::Failed {
                error: e.to_string(),
            },
        };
        tagged.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_distinguishes_empty_from_failure() {
        let empty: Outcome<Vec<u32>> = Outcome::from_rows(Ok(vec![]));
        assert!(empty.is_empty());

        let failed: Outcome<Vec<u32>> =
            Outcome::from_rows(Err(InsightsError::Load("boom".to_string())));
        assert!(failed.is_failed());
        assert_eq!(failed.count(), 0);

        let data = Outcome::from_rows(Ok(vec![1, 2, 3]));
        assert_eq!(data.count(), 3);
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let data: Outcome<Vec<u32>> = Outcome::Data(vec![7]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["status"], "data");
        assert_eq!(json["data"][0], 7);

        let failed: Outcome<Vec<u32>> = Outcome::Failed(InsightsError::Load("x".to_string()));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Load error: x");
    }
}
