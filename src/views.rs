//! Alert & Summary Views
//!
//! Straight reads of precomputed results. The warehouse owns the logic that flags a filing
//! as non-compliant or high risk; these views only fetch and count.

use crate::config::{Catalog, TableRef};
use crate::error::{Result, Stage};
use crate::models::{FilingFact, FilingSummary};
use crate::outcome::Outcome;
use crate::warehouse::{ResultSet, Warehouse};
use serde::Serialize;
use tracing::{info, warn};

/// Rows shown by the capped views.
pub const VIEW_ROW_CAP: usize = 50;

/// A precomputed alert set, read in full.
#[derive(Debug, Serialize)]
pub struct AlertView {
    pub count: usize,
    pub rows: ResultSet,
}

pub struct Views<'a> {
    warehouse: &'a dyn Warehouse,
    catalog: &'a Catalog,
}

impl<'a> Views<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, catalog: &'a Catalog) -> Self {
        Self { warehouse, catalog }
    }

    async fn read(&self, table: &TableRef, limit: Option<usize>) -> Result<ResultSet> {
        let rows = self
            .warehouse
            .read_table(table, limit)
            .await
            .map_err(|e| e.at(Stage::Load));
        match &rows {
            Ok(rs) => info!("Read {} rows from {}", rs.len(), table),
            Err(e) => warn!("Reading {} failed: {}", table, e),
        }
        rows
    }

    async fn alerts(&self, table: &TableRef) -> Outcome<AlertView> {
        match self.read(table, None).await {
            Ok(rows) if rows.is_empty() => Outcome::Empty,
            Ok(rows) => Outcome::Data(AlertView {
                count: rows.len(),
                rows,
            }),
            Err(e) => Outcome::Failed(e),
        }
    }

    /// First [`VIEW_ROW_CAP`] rows of the filing facts table.
    pub async fn overview(&self) -> Outcome<Vec<FilingFact>> {
        Outcome::from_rows(
            self.read(&self.catalog.filing_facts, Some(VIEW_ROW_CAP))
                .await
                .and_then(|rs| rs.decode())
                .map_err(|e| e.at(Stage::Load)),
        )
    }

    pub async fn compliance_alerts(&self) -> Outcome<AlertView> {
        self.alerts(&self.catalog.non_compliant).await
    }

    pub async fn risk_alerts(&self) -> Outcome<AlertView> {
        self.alerts(&self.catalog.high_risk).await
    }

    /// AI summaries, capped at [`VIEW_ROW_CAP`] and projected to the displayed columns.
    pub async fn summaries(&self) -> Outcome<Vec<FilingSummary>> {
        Outcome::from_rows(
            self.read(&self.catalog.summaries, Some(VIEW_ROW_CAP))
                .await
                .and_then(|rs| rs.decode())
                .map_err(|e| e.at(Stage::Load)),
        )
    }
}
