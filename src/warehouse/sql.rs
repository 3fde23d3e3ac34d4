//! Statement rendering for the warehouse SQL dialect
//!
//! Identifiers come from validated [`TableRef`]s; every user-supplied value is a bind
//! parameter.

use crate::config::{validate_identifier, TableRef};
use crate::error::{InsightsError, Result};
use crate::vector::{embedding_literal, EMBEDDING_DIM};
use crate::warehouse::{Bind, Query};
use itertools::Itertools;

/// SQL text plus positional binds (`?`).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Statement {
    fn plain(sql: String) -> Self {
        Self {
            sql,
            binds: Vec::new(),
        }
    }
}

pub fn read_table(table: &TableRef, limit: Option<usize>) -> Statement {
    match limit {
        Some(n) => Statement::plain(format!("SELECT * FROM {} LIMIT {}", table.qualified(), n)),
        None => Statement::plain(format!("SELECT * FROM {}", table.qualified())),
    }
}

pub fn show_pipes(schema: &str) -> Result<Statement> {
    Ok(Statement::plain(format!(
        "SHOW PIPES IN SCHEMA {}",
        checked_schema(schema)?
    )))
}

pub fn show_tasks(schema: &str) -> Result<Statement> {
    Ok(Statement::plain(format!(
        "SHOW TASKS IN SCHEMA {}",
        checked_schema(schema)?
    )))
}

fn checked_schema(schema: &str) -> Result<&str> {
    let parts: Vec<&str> = schema.split('.').collect();
    if parts.len() > 2 {
        return Err(InsightsError::Config(format!(
            "schema '{}' must be SCHEMA or DATABASE.SCHEMA",
            schema
        )));
    }
    for part in parts {
        validate_identifier(part)?;
    }
    Ok(schema)
}

pub fn render(query: &Query) -> Result<Statement> {
    let statement = match query {
        Query::TopRevenue { table, limit } => Statement::plain(format!(
            "SELECT company_name, MAX(revenue) AS max_revenue \
             FROM {} \
             WHERE revenue IS NOT NULL \
             GROUP BY company_name \
             ORDER BY max_revenue DESC, company_name ASC \
             LIMIT {}",
            table.qualified(),
            limit
        )),
        Query::BiggestLosses { table, limit } => Statement::plain(format!(
            "SELECT company_name, MIN(net_income) AS min_net_income \
             FROM {} \
             WHERE net_income IS NOT NULL \
             GROUP BY company_name \
             ORDER BY min_net_income ASC, company_name ASC \
             LIMIT {}",
            table.qualified(),
            limit
        )),
        Query::RevenueTrend { table, company } => Statement {
            sql: format!(
                "SELECT period, revenue \
                 FROM {} \
                 WHERE company_name = ? AND revenue IS NOT NULL \
                 ORDER BY period ASC",
                table.qualified()
            ),
            binds: vec![Bind::Text(company.clone())],
        },
        Query::RevenueAnomalies {
            table,
            threshold,
            limit,
        } => Statement {
            sql: format!(
                "WITH revenue_trend AS ( \
                     SELECT company_name, period, revenue, \
                            LAG(revenue) OVER (PARTITION BY company_name ORDER BY period) AS prev_revenue \
                     FROM {} \
                     WHERE revenue IS NOT NULL \
                 ) \
                 SELECT company_name, period, revenue, prev_revenue, \
                        (revenue - prev_revenue) / NULLIF(prev_revenue, 0) AS pct_change \
                 FROM revenue_trend \
                 WHERE prev_revenue IS NOT NULL \
                   AND (revenue - prev_revenue) / NULLIF(prev_revenue, 0) < ? \
                 ORDER BY pct_change ASC, company_name ASC, period ASC \
                 LIMIT {}",
                table.qualified(),
                limit
            ),
            binds: vec![Bind::Number(*threshold)],
        },
        Query::Embed { model, text } => Statement {
            sql: "SELECT SNOWFLAKE.CORTEX.EMBED_TEXT_768(?, ?) AS question_embedding".to_string(),
            binds: vec![Bind::Text(model.clone()), Bind::Text(text.clone())],
        },
        Query::SimilarChunks {
            table,
            embedding,
            k,
        } => Statement {
            sql: format!(
                "SELECT text_chunk, \
                        VECTOR_COSINE_SIMILARITY(embedding, PARSE_JSON(?)::ARRAY::VECTOR(FLOAT, {dim})) AS similarity \
                 FROM {} \
                 ORDER BY similarity DESC, text_chunk ASC \
                 LIMIT {}",
                table.qualified(),
                k,
                dim = EMBEDDING_DIM
            ),
            binds: vec![Bind::Text(embedding_literal(embedding))],
        },
        Query::Complete { model, prompt } => Statement {
            sql: "SELECT SNOWFLAKE.CORTEX.COMPLETE(?, ?) AS answer".to_string(),
            binds: vec![Bind::Text(model.clone()), Bind::Text(prompt.clone())],
        },
        Query::RowCounts { tables } => {
            if tables.is_empty() {
                return Err(InsightsError::InvalidInput(
                    "row count query needs at least one table".to_string(),
                ));
            }
            Statement::plain(
                tables
                    .iter()
                    .map(|t| {
                        format!(
                            "SELECT '{}' AS table_name, COUNT(*) AS row_count FROM {}",
                            t.qualified(),
                            t.qualified()
                        )
                    })
                    .join(" UNION ALL "),
            )
        }
        Query::Sql { statement, binds } => Statement {
            sql: statement.clone(),
            binds: binds.clone(),
        },
    };
    Ok(statement)
}
