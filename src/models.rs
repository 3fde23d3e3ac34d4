//! Typed records decoded from warehouse result sets

use crate::error::Result;
use crate::warehouse::{FromRow, Row};
use serde::{Deserialize, Serialize};

/// One row of the filing facts table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingFact {
    pub company_name: String,
    pub report_type: Option<String>,
    pub period: Option<String>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub liabilities: Option<f64>,
    pub assets: Option<f64>,
    pub text_chunk: Option<String>,
}

impl FromRow for FilingFact {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            company_name: row.string("COMPANY_NAME")?,
            report_type: row.opt_string("REPORT_TYPE"),
            period: row.opt_string("PERIOD"),
            revenue: row.opt_f64("REVENUE")?,
            net_income: row.opt_f64("NET_INCOME")?,
            liabilities: row.opt_f64("LIABILITIES")?,
            assets: row.opt_f64("ASSETS")?,
            text_chunk: row.opt_string("TEXT_CHUNK"),
        })
    }
}

/// AI-generated filing summary, projected to the four displayed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingSummary {
    pub company_name: String,
    pub report_type: Option<String>,
    pub period: Option<String>,
    pub ai_summary: Option<String>,
}

impl FromRow for FilingSummary {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            company_name: row.string("COMPANY_NAME")?,
            report_type: row.opt_string("REPORT_TYPE"),
            period: row.opt_string("PERIOD"),
            ai_summary: row.opt_string("AI_SUMMARY"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRevenue {
    pub company_name: String,
    pub max_revenue: f64,
}

impl FromRow for CompanyRevenue {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            company_name: row.string("COMPANY_NAME")?,
            max_revenue: row.f64("MAX_REVENUE")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyLoss {
    pub company_name: String,
    pub min_net_income: f64,
}

impl FromRow for CompanyLoss {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            company_name: row.string("COMPANY_NAME")?,
            min_net_income: row.f64("MIN_NET_INCOME")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub revenue: f64,
}

impl FromRow for TrendPoint {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            period: row.string("PERIOD")?,
            revenue: row.f64("REVENUE")?,
        })
    }
}

/// A period whose revenue dropped sharply against the company's previous period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueAnomaly {
    pub company_name: String,
    pub period: String,
    pub revenue: f64,
    pub prev_revenue: f64,
    pub pct_change: f64,
}

impl FromRow for RevenueAnomaly {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            company_name: row.string("COMPANY_NAME")?,
            period: row.string("PERIOD")?,
            revenue: row.f64("REVENUE")?,
            prev_revenue: row.f64("PREV_REVENUE")?,
            pct_change: row.f64("PCT_CHANGE")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Cosine similarity to the question, when the backend reports it
    pub similarity: Option<f64>,
}

impl FromRow for RetrievedChunk {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            text: row.string("TEXT_CHUNK")?,
            similarity: row.opt_f64("SIMILARITY")?,
        })
    }
}

/// Auto-ingest pipe as reported by `SHOW PIPES`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub name: String,
    pub definition: Option<String>,
    pub pattern: Option<String>,
    pub notification_channel: Option<String>,
    pub invalid_reason: Option<String>,
    pub created_on: Option<String>,
}

impl FromRow for PipelineStatus {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            name: row.string("name")?,
            definition: row.opt_string("definition"),
            pattern: row.opt_string("pattern"),
            notification_channel: row.opt_string("notification_channel"),
            invalid_reason: row.opt_string("invalid_reason"),
            created_on: row.opt_string("created_on"),
        })
    }
}

/// Scheduled transformation task as reported by `SHOW TASKS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJobStatus {
    pub name: String,
    pub schedule: Option<String>,
    pub state: Option<String>,
    pub warehouse: Option<String>,
    pub definition: Option<String>,
    pub last_committed_on: Option<String>,
}

impl FromRow for ScheduledJobStatus {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            name: row.string("name")?,
            schedule: row.opt_string("schedule"),
            state: row.opt_string("state"),
            warehouse: row.opt_string("warehouse"),
            definition: row.opt_string("definition"),
            last_committed_on: row.opt_string("last_committed_on"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRowCount {
    pub table_name: String,
    pub row_count: u64,
}

impl FromRow for TableRowCount {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            table_name: row.string("TABLE_NAME")?,
            row_count: row.opt_u64("ROW_COUNT")?.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::ResultSet;
    use serde_json::json;

    #[test]
    fn test_show_pipes_row_maps_by_name() {
        // SHOW output has many more columns, in an order that varies by release
        let rs = ResultSet::from_columns(
            &["created_on", "name", "database_name", "schema_name", "definition", "owner"],
            vec![vec![
                json!("2025-01-01 00:00:00"),
                json!("NUM_PIPE"),
                json!("SEC_DATA"),
                json!("PUBLIC"),
                json!("COPY INTO NUM ..."),
                json!("SYSADMIN"),
            ]],
        );
        let pipes: Vec<PipelineStatus> = rs.decode().unwrap();
        assert_eq!(pipes[0].name, "NUM_PIPE");
        assert_eq!(pipes[0].definition.as_deref(), Some("COPY INTO NUM ..."));
        assert_eq!(pipes[0].invalid_reason, None);
    }

    #[test]
    fn test_filing_fact_tolerates_missing_columns() {
        let rs = ResultSet::from_columns(
            &["COMPANY_NAME", "REVENUE"],
            vec![vec![json!("Apple"), json!("391035000000")]],
        );
        let facts: Vec<FilingFact> = rs.decode().unwrap();
        assert_eq!(facts[0].revenue, Some(391035000000.0));
        assert_eq!(facts[0].net_income, None);
    }
}
