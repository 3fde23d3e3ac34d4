//! Data Access Gateway
//!
//! The only component that talks to the tabular store. Everything else in the crate takes
//! an explicitly passed `&dyn Warehouse`, which lets the pipeline and the analytics engine
//! run against the managed warehouse, the in-process [`local::LocalWarehouse`], or a
//! test stub.

pub mod local;
pub mod result_set;
pub mod snowflake;
pub mod sql;

use crate::config::TableRef;
use crate::error::{InsightsError, Result};
use crate::vector::{parse_embedding, Embedding};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

pub use result_set::{ColumnIndex, FromRow, ResultSet, Row};

/// A bind parameter passed alongside a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bind {
    Text(String),
    Number(f64),
}

/// Store-side computation requested through [`Warehouse::run_query`].
///
/// Each variant documents the columns of the result set it yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// `COMPANY_NAME, MAX_REVENUE`: highest non-null revenue per company, descending
    TopRevenue { table: TableRef, limit: usize },
    /// `COMPANY_NAME, MIN_NET_INCOME`: lowest non-null net income per company, ascending
    BiggestLosses { table: TableRef, limit: usize },
    /// `PERIOD, REVENUE`: non-null revenue of one company by period ascending
    RevenueTrend { table: TableRef, company: String },
    /// `COMPANY_NAME, PERIOD, REVENUE, PREV_REVENUE, PCT_CHANGE`: period-over-period
    /// drops below `threshold`, most severe first
    RevenueAnomalies {
        table: TableRef,
        threshold: f64,
        limit: usize,
    },
    /// `QUESTION_EMBEDDING`: zero or one row holding the vector for `text`
    Embed { model: String, text: String },
    /// `TEXT_CHUNK, SIMILARITY`: chunks ranked by cosine similarity to `embedding`
    SimilarChunks {
        table: TableRef,
        embedding: Embedding,
        k: usize,
    },
    /// `ANSWER`: zero or one row with the completion for `prompt`
    Complete { model: String, prompt: String },
    /// `TABLE_NAME, ROW_COUNT`: one row per table
    RowCounts { tables: Vec<TableRef> },
    /// Arbitrary statement, executed verbatim
    Sql { statement: String, binds: Vec<Bind> },
}

impl Query {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Query::TopRevenue { .. } => "top_revenue",
            Query::BiggestLosses { .. } => "biggest_losses",
            Query::RevenueTrend { .. } => "revenue_trend",
            Query::RevenueAnomalies { .. } => "revenue_anomalies",
            Query::Embed { .. } => "embed",
            Query::SimilarChunks { .. } => "similar_chunks",
            Query::Complete { .. } => "complete",
            Query::RowCounts { .. } => "row_counts",
            Query::Sql { .. } => "sql",
        }
    }
}

/// Acknowledgement of a file placed on the stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAck {
    pub destination: String,
    pub bytes: u64,
    pub replaced_existing: bool,
    pub staged_at: DateTime<Utc>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Backend name (e.g., "snowflake", "local")
    fn name(&self) -> &'static str;

    /// Read a table or view, optionally capped at `limit` rows.
    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<ResultSet>;

    async fn run_query(&self, query: &Query) -> Result<ResultSet>;

    /// Place a local file on the stage at `destination` (relative to the stage root).
    async fn stage_file(
        &self,
        local_path: &Path,
        destination: &str,
        overwrite: bool,
    ) -> Result<StageAck>;

    async fn list_pipelines(&self, schema: &str) -> Result<ResultSet>;

    async fn list_scheduled_jobs(&self, schema: &str) -> Result<ResultSet>;

    /// Embedding for `text`, `None` when the store returned no rows.
    async fn embed(&self, model: &str, text: &str) -> Result<Option<Embedding>> {
        let rows = self
            .run_query(&Query::Embed {
                model: model.to_string(),
                text: text.to_string(),
            })
            .await?;
        match rows.first_cell() {
            None | Some(Value::Null) => Ok(None),
            Some(cell) => decode_vector(cell).map(Some),
        }
    }

    /// Completion for `prompt`, `None` when the store returned no rows.
    async fn complete(&self, model: &str, prompt: &str) -> Result<Option<String>> {
        let rows = self
            .run_query(&Query::Complete {
                model: model.to_string(),
                prompt: prompt.to_string(),
            })
            .await?;
        Ok(match rows.first_cell() {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
    }
}

/// Vectors arrive as JSON arrays from local frames and as text from the HTTP API.
pub fn decode_vector(cell: &Value) -> Result<Embedding> {
    match cell {
        Value::String(s) => parse_embedding(s),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| InsightsError::Decode(format!("non-numeric vector element {}", v)))
            })
            .collect(),
        other => Err(InsightsError::Decode(format!(
            "expected a vector, got {}",
            other
        ))),
    }
}

/// Copy `local_path` to `root/destination`, creating parent directories.
///
/// With `overwrite == false` an existing file at the destination is an error; with
/// `overwrite == true` it is replaced, never versioned.
pub async fn copy_into_stage(
    root: &Path,
    local_path: &Path,
    destination: &str,
    overwrite: bool,
) -> Result<(PathBuf, StageAck)> {
    let relative = Path::new(destination);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(InsightsError::Stage(format!(
            "stage destination '{}' must be a relative path inside the stage",
            destination
        )));
    }

    let target = root.join(relative);
    let replaced_existing = tokio::fs::try_exists(&target).await?;
    if replaced_existing && !overwrite {
        return Err(InsightsError::Stage(format!(
            "{} already exists on the stage and overwrite is disabled",
            destination
        )));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = tokio::fs::copy(local_path, &target).await?;
    info!("Staged {} bytes at {}", bytes, target.display());

    Ok((
        target,
        StageAck {
            destination: destination.to_string(),
            bytes,
            replaced_existing,
            staged_at: Utc::now(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_vector_forms() {
        assert_eq!(decode_vector(&json!([1.0, 2.5])).unwrap(), vec![1.0, 2.5]);
        assert_eq!(decode_vector(&json!("[1, 2.5]")).unwrap(), vec![1.0, 2.5]);
        assert!(decode_vector(&json!(3)).is_err());
    }

    #[tokio::test]
    async fn test_copy_into_stage_overwrites_in_place() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("upload.csv");
        std::fs::write(&source, "a,b\n1,2\n")?;
        let root = dir.path().join("stage");

        let (target, first) = copy_into_stage(&root, &source, "num/upload.csv", true).await?;
        assert!(!first.replaced_existing);
        assert_eq!(first.bytes, 8);

        std::fs::write(&source, "a,b\n3,4\n5,6\n")?;
        let (_, second) = copy_into_stage(&root, &source, "num/upload.csv", true).await?;
        assert!(second.replaced_existing);
        assert_eq!(std::fs::read_to_string(&target)?, "a,b\n3,4\n5,6\n");

        let refused = copy_into_stage(&root, &source, "num/upload.csv", false).await;
        assert!(matches!(refused, Err(InsightsError::Stage(_))));

        let escaped = copy_into_stage(&root, &source, "../outside.csv", true).await;
        assert!(matches!(escaped, Err(InsightsError::Stage(_))));
        Ok(())
    }
}
