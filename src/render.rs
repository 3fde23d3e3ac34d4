//! Terminal rendering of dashboard outcomes
//!
//! Operations return data; this module turns it into text. Tables are printed through
//! polars' `DataFrame` display so every section looks alike.

use crate::analytics::AnalyticsReport;
use crate::dashboard::TabReport;
use crate::ingest::UploadReport;
use crate::models::{
    CompanyLoss, CompanyRevenue, FilingFact, FilingSummary, PipelineStatus, RevenueAnomaly,
    ScheduledJobStatus, TableRowCount, TrendPoint,
};
use crate::monitoring::MonitoringSnapshot;
use crate::outcome::Outcome;
use crate::rag::AnswerExchange;
use crate::views::AlertView;
use crate::warehouse::ResultSet;
use polars::prelude::*;
use serde_json::Value;
use std::fmt::Write;

/// Anything that can be laid out as a table.
pub trait Tabular {
    fn to_frame(&self) -> PolarsResult<DataFrame>;
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl Tabular for ResultSet {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cells: Vec<Option<String>> = self
                    .rows
                    .iter()
                    .map(|row| row.get(i).and_then(cell_text))
                    .collect();
                Series::new(name, cells)
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl Tabular for Vec<FilingFact> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "COMPANY_NAME" => self.iter().map(|r| r.company_name.as_str()).collect::<Vec<_>>(),
            "REPORT_TYPE" => self.iter().map(|r| r.report_type.as_deref()).collect::<Vec<_>>(),
            "PERIOD" => self.iter().map(|r| r.period.as_deref()).collect::<Vec<_>>(),
            "REVENUE" => self.iter().map(|r| r.revenue).collect::<Vec<_>>(),
            "NET_INCOME" => self.iter().map(|r| r.net_income).collect::<Vec<_>>(),
            "LIABILITIES" => self.iter().map(|r| r.liabilities).collect::<Vec<_>>(),
            "ASSETS" => self.iter().map(|r| r.assets).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<FilingSummary> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "COMPANY_NAME" => self.iter().map(|r| r.company_name.as_str()).collect::<Vec<_>>(),
            "REPORT_TYPE" => self.iter().map(|r| r.report_type.as_deref()).collect::<Vec<_>>(),
            "PERIOD" => self.iter().map(|r| r.period.as_deref()).collect::<Vec<_>>(),
            "AI_SUMMARY" => self.iter().map(|r| r.ai_summary.as_deref()).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<CompanyRevenue> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "COMPANY_NAME" => self.iter().map(|r| r.company_name.as_str()).collect::<Vec<_>>(),
            "MAX_REVENUE" => self.iter().map(|r| r.max_revenue).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<CompanyLoss> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "COMPANY_NAME" => self.iter().map(|r| r.company_name.as_str()).collect::<Vec<_>>(),
            "MIN_NET_INCOME" => self.iter().map(|r| r.min_net_income).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<TrendPoint> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "PERIOD" => self.iter().map(|r| r.period.as_str()).collect::<Vec<_>>(),
            "REVENUE" => self.iter().map(|r| r.revenue).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<RevenueAnomaly> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "COMPANY_NAME" => self.iter().map(|r| r.company_name.as_str()).collect::<Vec<_>>(),
            "PERIOD" => self.iter().map(|r| r.period.as_str()).collect::<Vec<_>>(),
            "REVENUE" => self.iter().map(|r| r.revenue).collect::<Vec<_>>(),
            "PREV_REVENUE" => self.iter().map(|r| r.prev_revenue).collect::<Vec<_>>(),
            "PCT_CHANGE" => self.iter().map(|r| r.pct_change).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<PipelineStatus> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "Pipe Name" => self.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Definition" => self.iter().map(|r| r.definition.as_deref()).collect::<Vec<_>>(),
            "Created On" => self.iter().map(|r| r.created_on.as_deref()).collect::<Vec<_>>(),
            "Notification Channel" => self.iter().map(|r| r.notification_channel.as_deref()).collect::<Vec<_>>(),
            "Invalid Reason" => self.iter().map(|r| r.invalid_reason.as_deref()).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<ScheduledJobStatus> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "Task Name" => self.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Warehouse" => self.iter().map(|r| r.warehouse.as_deref()).collect::<Vec<_>>(),
            "Schedule" => self.iter().map(|r| r.schedule.as_deref()).collect::<Vec<_>>(),
            "State" => self.iter().map(|r| r.state.as_deref()).collect::<Vec<_>>(),
            "Last Committed" => self.iter().map(|r| r.last_committed_on.as_deref()).collect::<Vec<_>>()
        )
    }
}

impl Tabular for Vec<TableRowCount> {
    fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "Table" => self.iter().map(|r| r.table_name.as_str()).collect::<Vec<_>>(),
            "Rows" => self.iter().map(|r| r.row_count).collect::<Vec<_>>()
        )
    }
}

fn table(out: &mut String, rows: &impl Tabular) {
    match rows.to_frame() {
        Ok(df) => {
            let _ = writeln!(out, "{}", df);
        }
        Err(e) => {
            let _ = writeln!(out, "(table could not be laid out: {})", e);
        }
    }
}

/// Render one section: its data, the empty-state message, or the inline error.
fn section<T: Tabular>(out: &mut String, title: &str, outcome: &Outcome<T>, empty: &str) {
    let _ = writeln!(out, "-- {} --", title);
    match outcome {
        Outcome::Data(rows) => table(out, rows),
        Outcome::Empty => {
            let _ = writeln!(out, "{}", empty);
        }
        Outcome::Failed(e) => {
            let _ = writeln!(out, "Failed to load {}: {}", title.to_lowercase(), e);
        }
    }
}

fn alerts(out: &mut String, outcome: &Outcome<AlertView>, noun: &str) {
    match outcome {
        Outcome::Data(view) => {
            table(out, &view.rows);
            let _ = writeln!(out, "Total {} filings: {}", noun, view.count);
        }
        Outcome::Empty => {
            let _ = writeln!(out, "Total {} filings: 0", noun);
        }
        Outcome::Failed(e) => {
            let _ = writeln!(out, "Failed to load {} alerts: {}", noun, e);
        }
    }
}

pub fn render_analytics(report: &AnalyticsReport) -> String {
    let mut out = String::new();
    section(
        &mut out,
        "Top 10 Companies by Revenue",
        &report.top_revenue,
        "No revenue data available.",
    );
    section(
        &mut out,
        "Companies with Largest Losses",
        &report.biggest_losses,
        "No net income data available.",
    );
    let trend_title = match &report.trend.company {
        Some(company) => format!("Revenue Trend for {}", company),
        None => "Revenue Trend".to_string(),
    };
    section(
        &mut out,
        &trend_title,
        &report.trend.points,
        "No revenue trend data for this company.",
    );
    section(
        &mut out,
        "Revenue Anomalies (drops over 50%)",
        &report.anomalies,
        "No major revenue drop anomalies detected.",
    );
    out
}

pub fn render_monitoring(snapshot: &MonitoringSnapshot) -> String {
    let mut out = String::new();
    section(
        &mut out,
        "Pipeline Status",
        &snapshot.pipelines,
        "No ingestion pipelines found.",
    );
    section(
        &mut out,
        "Task Status",
        &snapshot.scheduled_jobs,
        "No scheduled jobs configured.",
    );
    section(
        &mut out,
        "Table Row Counts",
        &snapshot.row_counts,
        "No monitored tables found.",
    );
    out
}

pub fn render_tab(report: &TabReport) -> String {
    let tab = report.tab();
    let mut out = format!("=== {} ===\n", tab.heading());
    match report {
        TabReport::Overview(facts) => {
            section(&mut out, "Filings", facts, "No filings loaded yet.")
        }
        TabReport::ComplianceAlerts(view) => alerts(&mut out, view, "non-compliant"),
        TabReport::RiskAlerts(view) => alerts(&mut out, view, "high-risk"),
        TabReport::AiSummaries(summaries) => {
            section(&mut out, "Summaries", summaries, "No summaries generated yet.");
            if !summaries.is_failed() {
                let _ = writeln!(out, "Total summaries shown: {}", summaries.count());
            }
        }
        TabReport::DataAnalytics(report) => out.push_str(&render_analytics(report)),
        TabReport::Monitoring(snapshot) => out.push_str(&render_monitoring(snapshot)),
    }
    out
}

pub fn render_answer(outcome: &Outcome<AnswerExchange>) -> String {
    let mut out = String::new();
    match outcome {
        Outcome::Data(exchange) => {
            let _ = writeln!(out, "Answer:\n{}\n", exchange.answer.trim());
            let _ = writeln!(out, "Context chunks used:");
            for (rank, chunk) in exchange.chunks.iter().enumerate() {
                match chunk.similarity {
                    Some(score) => {
                        let _ = writeln!(out, "  {}. [{:.3}] {}", rank + 1, score, chunk.text);
                    }
                    None => {
                        let _ = writeln!(out, "  {}. {}", rank + 1, chunk.text);
                    }
                }
            }
        }
        Outcome::Empty => out.push_str("Enter a question to ask about company filings.\n"),
        Outcome::Failed(e) => {
            let _ = writeln!(out, "RAG Q&A failed: {}", e);
        }
    }
    out
}

pub fn render_upload(report: &UploadReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Uploaded {} bytes to {}. The auto-ingest pipe will load it into {}.",
        report.ack.bytes,
        report.ack.destination,
        report.table.table_name()
    );
    let _ = writeln!(out, "Preview of {}:", report.table.table_name());
    match &report.preview {
        Outcome::Data(rows) => table(&mut out, rows),
        Outcome::Empty => out.push_str("No rows ingested yet.\n"),
        Outcome::Failed(e) => {
            let _ = writeln!(out, "Could not preview data: {}", e);
        }
    }
    out
}
