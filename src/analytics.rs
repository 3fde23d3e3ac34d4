//! Analytics Engine
//!
//! Four independent, read-only aggregations over the filing facts table. Each one is its
//! own section: a failure in one never prevents the others from reporting, and an empty
//! result is reported as [`Outcome::Empty`] rather than as an error.

use crate::config::TableRef;
use crate::error::{InsightsError, Result, Stage};
use crate::models::{CompanyLoss, CompanyRevenue, RevenueAnomaly, TrendPoint};
use crate::outcome::Outcome;
use crate::warehouse::{FromRow, Query, Warehouse};
use serde::Serialize;
use tracing::{info, warn};

/// Rows returned by the ranked aggregations.
pub const TOP_N: usize = 10;

/// Period-over-period change below which a revenue drop is flagged (a fall of more than 50%).
pub const ANOMALY_THRESHOLD: f64 = -0.5;

/// Trend drill-down for one company picked from the top-revenue list.
#[derive(Debug, Serialize)]
pub struct TrendSection {
    pub company: Option<String>,
    pub points: Outcome<Vec<TrendPoint>>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsReport {
    pub top_revenue: Outcome<Vec<CompanyRevenue>>,
    pub biggest_losses: Outcome<Vec<CompanyLoss>>,
    pub trend: TrendSection,
    pub anomalies: Outcome<Vec<RevenueAnomaly>>,
}

pub struct AnalyticsEngine<'a> {
    warehouse: &'a dyn Warehouse,
    facts: &'a TableRef,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, facts: &'a TableRef) -> Self {
        Self { warehouse, facts }
    }

    async fn fetch<T: FromRow>(&self, query: Query) -> Result<Vec<T>> {
        let rows = self
            .warehouse
            .run_query(&query)
            .await
            .and_then(|rs| rs.decode::<T>())
            .map_err(|e| e.at(Stage::Load));
        match &rows {
            Ok(r) => info!("{} returned {} rows", query.label(), r.len()),
            Err(e) => warn!("{} failed: {}", query.label(), e),
        }
        rows
    }

    /// Highest revenue per company, top [`TOP_N`], descending.
    pub async fn top_revenue(&self) -> Outcome<Vec<CompanyRevenue>> {
        Outcome::from_rows(
            self.fetch(Query::TopRevenue {
                table: self.facts.clone(),
                limit: TOP_N,
            })
            .await,
        )
    }

    /// Lowest net income per company, top [`TOP_N`], most negative first.
    pub async fn biggest_losses(&self) -> Outcome<Vec<CompanyLoss>> {
        Outcome::from_rows(
            self.fetch(Query::BiggestLosses {
                table: self.facts.clone(),
                limit: TOP_N,
            })
            .await,
        )
    }

    /// Revenue by period for `company`, period ascending.
    pub async fn revenue_trend(&self, company: &str) -> Outcome<Vec<TrendPoint>> {
        Outcome::from_rows(
            self.fetch(Query::RevenueTrend {
                table: self.facts.clone(),
                company: company.to_string(),
            })
            .await,
        )
    }

    /// Period-over-period revenue drops beyond [`ANOMALY_THRESHOLD`], most severe first.
    pub async fn revenue_anomalies(&self) -> Outcome<Vec<RevenueAnomaly>> {
        Outcome::from_rows(
            self.fetch(Query::RevenueAnomalies {
                table: self.facts.clone(),
                threshold: ANOMALY_THRESHOLD,
                limit: TOP_N,
            })
            .await,
        )
    }

    /// Run every section. The trend company must be one of the top-revenue companies;
    /// without a choice the first of them is used.
    pub async fn report(&self, company: Option<&str>) -> AnalyticsReport {
        let top_revenue = self.top_revenue().await;
        let biggest_losses = self.biggest_losses().await;

        let trend = match select_company(&top_revenue, company) {
            Ok(Some(selected)) => {
                let points = self.revenue_trend(&selected).await;
                TrendSection {
                    company: Some(selected),
                    points,
                }
            }
            Ok(None) => TrendSection {
                company: None,
                points: Outcome::Empty,
            },
            Err(e) => TrendSection {
                company: company.map(str::to_string),
                points: Outcome::Failed(e),
            },
        };

        let anomalies = self.revenue_anomalies().await;

        AnalyticsReport {
            top_revenue,
            biggest_losses,
            trend,
            anomalies,
        }
    }
}

/// Pick the trend company from the top-revenue candidates.
///
/// A failed candidate list fails the selection; an empty one yields `None` when no company
/// was requested.
pub fn select_company(
    candidates: &Outcome<Vec<CompanyRevenue>>,
    requested: Option<&str>,
) -> Result<Option<String>> {
    if let Some(e) = candidates.error() {
        return Err(InsightsError::Load(format!(
            "trend candidates unavailable: {}",
            e
        )));
    }

    let names: Vec<&str> = candidates
        .data()
        .map(|rows| rows.iter().map(|r| r.company_name.as_str()).collect())
        .unwrap_or_default();

    match requested {
        None => Ok(names.first().map(|s| s.to_string())),
        Some(wanted) => names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(wanted))
            .map(|n| Some(n.to_string()))
            .ok_or_else(|| {
                InsightsError::InvalidInput(format!(
                    "'{}' is not among the top revenue companies",
                    wanted
                ))
            }),
    }
}
