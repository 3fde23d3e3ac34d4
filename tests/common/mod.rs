#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use filing_insights::config::TableRef;
use filing_insights::error::{InsightsError, Result};
use filing_insights::vector::EMBEDDING_DIM;
use filing_insights::warehouse::{Query, ResultSet, StageAck, Warehouse};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Scriptable warehouse that records every call it receives.
#[derive(Default)]
pub struct StubWarehouse {
    pub calls: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub staged_paths: Mutex<Vec<PathBuf>>,
    pub tables: HashMap<String, ResultSet>,
    pub failing_tables: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub chunks: Vec<String>,
    pub answer: Option<String>,
    pub stage_error: Option<String>,
    pub pipelines: Option<ResultSet>,
    pub scheduled_jobs: Option<ResultSet>,
    pub row_counts: Option<ResultSet>,
}

impl StubWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embedding of the right size with a single non-zero component.
    pub fn unit_embedding() -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[0] = 1.0;
        v
    }

    pub fn with_table(mut self, name: &str, rows: ResultSet) -> Self {
        self.tables.insert(name.to_uppercase(), rows);
        self
    }

    pub fn with_failing_table(mut self, name: &str) -> Self {
        self.failing_tables.push(name.to_uppercase());
        self
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Local files handed to `stage_file`, in call order.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for StubWarehouse {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<ResultSet> {
        self.record("read_table");
        let key = table.name().to_uppercase();
        if self.failing_tables.contains(&key) {
            return Err(InsightsError::Warehouse(format!(
                "Object '{}' does not exist or not authorized",
                table
            )));
        }
        let mut rows = self.tables.get(&key).cloned().unwrap_or_default();
        if let Some(n) = limit {
            rows.rows.truncate(n);
        }
        Ok(rows)
    }

    async fn run_query(&self, query: &Query) -> Result<ResultSet> {
        self.record(query.label());
        match query {
            Query::Embed { .. } => {
                let rows = match &self.embedding {
                    Some(v) => vec![vec![json!(v)]],
                    None => Vec::new(),
                };
                Ok(ResultSet::from_columns(&["QUESTION_EMBEDDING"], rows))
            }
            Query::SimilarChunks { k, .. } => Ok(ResultSet::from_columns(
                &["TEXT_CHUNK"],
                self.chunks.iter().take(*k).map(|c| vec![json!(c)]).collect(),
            )),
            Query::Complete { prompt, .. } => {
                self.prompts.lock().unwrap().push(prompt.clone());
                let rows = match &self.answer {
                    Some(a) => vec![vec![json!(a)]],
                    None => Vec::new(),
                };
                Ok(ResultSet::from_columns(&["ANSWER"], rows))
            }
            Query::RowCounts { .. } => self
                .row_counts
                .clone()
                .ok_or_else(|| InsightsError::Warehouse("row counts unavailable".to_string())),
            other => Err(InsightsError::Warehouse(format!(
                "stub has no answer for {}",
                other.label()
            ))),
        }
    }

    async fn stage_file(
        &self,
        local_path: &Path,
        destination: &str,
        _overwrite: bool,
    ) -> Result<StageAck> {
        self.record("stage_file");
        self.staged_paths
            .lock()
            .unwrap()
            .push(local_path.to_path_buf());
        if let Some(message) = &self.stage_error {
            return Err(InsightsError::Warehouse(message.clone()));
        }
        let bytes = std::fs::metadata(local_path)?.len();
        Ok(StageAck {
            destination: destination.to_string(),
            bytes,
            replaced_existing: false,
            staged_at: Utc::now(),
        })
    }

    async fn list_pipelines(&self, _schema: &str) -> Result<ResultSet> {
        self.record("list_pipelines");
        self.pipelines
            .clone()
            .ok_or_else(|| InsightsError::Warehouse("SHOW PIPES failed".to_string()))
    }

    async fn list_scheduled_jobs(&self, _schema: &str) -> Result<ResultSet> {
        self.record("list_scheduled_jobs");
        self.scheduled_jobs
            .clone()
            .ok_or_else(|| InsightsError::Warehouse("SHOW TASKS failed".to_string()))
    }
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
    ResultSet::from_columns(columns, rows)
}
