//! Monitoring View
//!
//! Operational metadata in three categories: auto-ingest pipes, scheduled jobs and row
//! counts of the monitored tables. Each category is fetched on its own and carries its own
//! outcome, so a failing `SHOW TASKS` still leaves pipes and row counts visible.

use crate::config::{Catalog, RawTable};
use crate::error::{Result, Stage};
use crate::models::{PipelineStatus, ScheduledJobStatus, TableRowCount};
use crate::outcome::Outcome;
use crate::warehouse::{Query, ResultSet, Warehouse};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct MonitoringSnapshot {
    pub pipelines: Outcome<Vec<PipelineStatus>>,
    pub scheduled_jobs: Outcome<Vec<ScheduledJobStatus>>,
    pub row_counts: Outcome<Vec<TableRowCount>>,
}

pub struct MonitoringView<'a> {
    warehouse: &'a dyn Warehouse,
    catalog: &'a Catalog,
}

impl<'a> MonitoringView<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, catalog: &'a Catalog) -> Self {
        Self { warehouse, catalog }
    }

    /// Pipes loading the raw upload tables. Other pipes in the schema are left out.
    pub async fn pipelines(&self) -> Outcome<Vec<PipelineStatus>> {
        let wanted: Vec<String> = RawTable::ALL.iter().map(|t| t.pipe_name()).collect();
        let pipes = self
            .warehouse
            .list_pipelines(&self.catalog.schema_path())
            .await
            .and_then(|rs| rs.decode::<PipelineStatus>())
            .map(|pipes| {
                pipes
                    .into_iter()
                    .filter(|p| wanted.iter().any(|w| w.eq_ignore_ascii_case(&p.name)))
                    .collect::<Vec<_>>()
            });
        Outcome::from_rows(logged("pipelines", pipes))
    }

    pub async fn scheduled_jobs(&self) -> Outcome<Vec<ScheduledJobStatus>> {
        let jobs = self
            .warehouse
            .list_scheduled_jobs(&self.catalog.schema_path())
            .await
            .and_then(|rs| rs.decode());
        Outcome::from_rows(logged("scheduled jobs", jobs))
    }

    pub async fn row_counts(&self) -> Outcome<Vec<TableRowCount>> {
        let counts = self
            .warehouse
            .run_query(&Query::RowCounts {
                tables: self.catalog.monitored_tables(),
            })
            .await
            .and_then(|rs: ResultSet| rs.decode());
        Outcome::from_rows(logged("row counts", counts))
    }

    pub async fn snapshot(&self) -> MonitoringSnapshot {
        MonitoringSnapshot {
            pipelines: self.pipelines().await,
            scheduled_jobs: self.scheduled_jobs().await,
            row_counts: self.row_counts().await,
        }
    }
}

fn logged<T>(category: &str, result: Result<Vec<T>>) -> Result<Vec<T>> {
    match result {
        Ok(rows) => {
            info!("Monitoring {}: {} rows", category, rows.len());
            Ok(rows)
        }
        Err(e) => {
            warn!("Monitoring {} unavailable: {}", category, e);
            Err(e.at(Stage::Load))
        }
    }
}
