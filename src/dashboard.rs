//! Dashboard Session
//!
//! One warehouse client per session, passed explicitly to every view. A session owns no
//! mutable state of its own; every tab reads the warehouse afresh, so two tabs may reflect
//! different snapshots if the warehouse changes in between.

use crate::analytics::{AnalyticsEngine, AnalyticsReport};
use crate::config::{RawTable, Settings};
use crate::error::Result;
use crate::ingest::{IngestionTrigger, UploadReport};
use crate::models::{FilingFact, FilingSummary};
use crate::monitoring::{MonitoringSnapshot, MonitoringView};
use crate::outcome::Outcome;
use crate::rag::{AnswerExchange, RagPipeline};
use crate::views::{AlertView, Views};
use crate::warehouse::Warehouse;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tab {
    Overview,
    ComplianceAlerts,
    RiskAlerts,
    AiSummaries,
    DataAnalytics,
    Monitoring,
}

impl Tab {
    /// Tabs in display order.
    pub const ALL: [Tab; 6] = [
        Tab::Overview,
        Tab::ComplianceAlerts,
        Tab::RiskAlerts,
        Tab::AiSummaries,
        Tab::DataAnalytics,
        Tab::Monitoring,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::ComplianceAlerts => "Compliance Alerts",
            Tab::RiskAlerts => "Risk Alerts",
            Tab::AiSummaries => "AI Summaries",
            Tab::DataAnalytics => "Data Analytics",
            Tab::Monitoring => "Monitoring",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Tab::Overview => "All Company Filings",
            Tab::ComplianceAlerts => "Compliance Alerts (Missing Key Metrics)",
            Tab::RiskAlerts => "Risk Alerts (Negative Net Income or High Liabilities/Assets)",
            Tab::AiSummaries => "AI-Generated Filing Summaries",
            Tab::DataAnalytics => "Data Analytics & Business Insights",
            Tab::Monitoring => "Monitoring & Observability",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// What a tab produced. Failures are already contained in the inner outcomes.
#[derive(Debug, Serialize)]
#[serde(tag = "tab", content = "report", rename_all = "snake_case")]
pub enum TabReport {
    Overview(Outcome<Vec<FilingFact>>),
    ComplianceAlerts(Outcome<AlertView>),
    RiskAlerts(Outcome<AlertView>),
    AiSummaries(Outcome<Vec<FilingSummary>>),
    DataAnalytics(AnalyticsReport),
    Monitoring(MonitoringSnapshot),
}

impl TabReport {
    pub fn tab(&self) -> Tab {
        match self {
            TabReport::Overview(_) => Tab::Overview,
            TabReport::ComplianceAlerts(_) => Tab::ComplianceAlerts,
            TabReport::RiskAlerts(_) => Tab::RiskAlerts,
            TabReport::AiSummaries(_) => Tab::AiSummaries,
            TabReport::DataAnalytics(_) => Tab::DataAnalytics,
            TabReport::Monitoring(_) => Tab::Monitoring,
        }
    }
}

pub struct Session {
    warehouse: Arc<dyn Warehouse>,
    settings: Settings,
}

impl Session {
    pub fn new(warehouse: Arc<dyn Warehouse>, settings: Settings) -> Self {
        info!("Dashboard session on {} warehouse", warehouse.name());
        Self {
            warehouse,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn warehouse(&self) -> &dyn Warehouse {
        self.warehouse.as_ref()
    }

    pub fn views(&self) -> Views<'_> {
        Views::new(self.warehouse(), &self.settings.catalog)
    }

    pub fn analytics(&self) -> AnalyticsEngine<'_> {
        AnalyticsEngine::new(self.warehouse(), &self.settings.catalog.filing_facts)
    }

    pub fn rag(&self) -> RagPipeline<'_> {
        RagPipeline::new(
            self.warehouse(),
            &self.settings.catalog.doc_chunks,
            &self.settings.models,
        )
    }

    pub fn ingestion(&self) -> IngestionTrigger<'_> {
        IngestionTrigger::new(self.warehouse(), &self.settings.catalog)
    }

    pub fn monitoring(&self) -> MonitoringView<'_> {
        MonitoringView::new(self.warehouse(), &self.settings.catalog)
    }

    pub async fn ask(&self, question: &str) -> Outcome<AnswerExchange> {
        self.rag().ask(question).await
    }

    pub async fn upload(&self, table: RawTable, path: &Path) -> Result<UploadReport> {
        self.ingestion().upload_file(table, path).await
    }

    /// Run one tab. `company` picks the trend drill-down on the analytics tab.
    pub async fn run_tab(&self, tab: Tab, company: Option<&str>) -> TabReport {
        info!("Rendering tab {}", tab);
        match tab {
            Tab::Overview => TabReport::Overview(self.views().overview().await),
            Tab::ComplianceAlerts => {
                TabReport::ComplianceAlerts(self.views().compliance_alerts().await)
            }
            Tab::RiskAlerts => TabReport::RiskAlerts(self.views().risk_alerts().await),
            Tab::AiSummaries => TabReport::AiSummaries(self.views().summaries().await),
            Tab::DataAnalytics => TabReport::DataAnalytics(self.analytics().report(company).await),
            Tab::Monitoring => TabReport::Monitoring(self.monitoring().snapshot().await),
        }
    }

    /// Every tab in display order, one after another.
    pub async fn run_all(&self, company: Option<&str>) -> Vec<TabReport> {
        let mut reports = Vec::with_capacity(Tab::ALL.len());
        for tab in Tab::ALL {
            reports.push(self.run_tab(tab, company).await);
        }
        reports
    }
}
