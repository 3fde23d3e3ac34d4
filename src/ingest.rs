//! Ingestion Trigger
//!
//! Relays an uploaded file to the stage location of one of the raw tables. Loading the
//! file is the job of the warehouse's auto-ingest pipe, which runs on its own schedule; this
//! module neither invokes nor waits for it.
//!
//! After a successful stage, the first rows of the raw table are read back as a
//! convenience preview. A failed preview is reported next to the successful stage and
//! never turns it into a failure.

use crate::config::{Catalog, RawTable};
use crate::error::{InsightsError, Result, Stage};
use crate::outcome::Outcome;
use crate::warehouse::{ResultSet, StageAck, Warehouse};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Rows shown after a successful upload.
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub table: RawTable,
    pub ack: StageAck,
    pub preview: Outcome<ResultSet>,
}

/// Stage path for a raw table. Every upload for the same table lands on the same path, so a
/// new upload replaces the previous file.
pub fn stage_destination(table: RawTable) -> String {
    format!(
        "{}/{}.csv",
        table.stage_prefix(),
        table.table_name().to_lowercase()
    )
}

pub struct IngestionTrigger<'a> {
    warehouse: &'a dyn Warehouse,
    catalog: &'a Catalog,
}

impl<'a> IngestionTrigger<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, catalog: &'a Catalog) -> Self {
        Self { warehouse, catalog }
    }

    /// Stage `bytes` for `table`, then try the preview.
    ///
    /// Returns `Err(Stage)` when the file could not be staged; the preview is then never
    /// attempted.
    pub async fn upload(&self, table: RawTable, bytes: &[u8]) -> Result<UploadReport> {
        let scratch = write_scratch(bytes).map_err(|e| e.at(Stage::Stage))?;
        let destination = stage_destination(table);
        info!(
            "Staging {} bytes for {} at {}",
            bytes.len(),
            table.table_name(),
            destination
        );

        let staged = self
            .warehouse
            .stage_file(scratch.path(), &destination, true)
            .await;

        // scratch file goes away whether or not the stage worked
        if let Err(e) = scratch.close() {
            warn!("Could not remove scratch upload file: {}", e);
        }

        let ack = staged.map_err(|e| {
            let e = e.at(Stage::Stage);
            warn!("Upload for {} failed: {}", table.table_name(), e);
            e
        })?;

        let preview = self.preview(table).await;
        Ok(UploadReport {
            table,
            ack,
            preview,
        })
    }

    /// Read a local file and upload it.
    pub async fn upload_file(&self, table: RawTable, path: &Path) -> Result<UploadReport> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            InsightsError::Stage(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.upload(table, &bytes).await
    }

    /// First [`PREVIEW_ROWS`] rows of the raw table.
    pub async fn preview(&self, table: RawTable) -> Outcome<ResultSet> {
        let target = self.catalog.raw(table);
        match self.warehouse.read_table(&target, Some(PREVIEW_ROWS)).await {
            Ok(rows) if rows.is_empty() => Outcome::Empty,
            Ok(rows) => Outcome::Data(rows),
            Err(e) => {
                warn!("Preview of {} unavailable: {}", target, e);
                Outcome::Failed(e.at(Stage::Preview))
            }
        }
    }
}

fn write_scratch(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut scratch = NamedTempFile::new()?;
    scratch.write_all(bytes)?;
    scratch.flush()?;
    Ok(scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_destination_is_keyed_by_table() {
        assert_eq!(stage_destination(RawTable::Num), "num/num.csv");
        assert_eq!(stage_destination(RawTable::Sub), "sub/sub.csv");
    }

    #[test]
    fn test_write_scratch_round_trips_bytes() {
        let scratch = write_scratch(b"adsh,cik\n1,2\n").unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"adsh,cik\n1,2\n");
        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }
}
