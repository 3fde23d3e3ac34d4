//! Snowflake Warehouse
//!
//! Executes statements through the SQL API (`/api/v2/statements`). Long-running statements
//! answer `202 Accepted` with a handle that is polled until the result is ready; large
//! results arrive in partitions that are fetched one by one.
//!
//! No client-side timeout and no retry: a slow statement blocks until the warehouse
//! answers or fails.

use crate::config::{TableRef, WarehouseConnection};
use crate::error::{InsightsError, Result};
use crate::warehouse::sql::{self, Statement};
use crate::warehouse::{copy_into_stage, Bind, Query, ResultSet, StageAck, Warehouse};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    statement_handle: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[allow(dead_code)]
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PartitionResponse {
    data: Option<Vec<Vec<Value>>>,
}

pub struct SnowflakeWarehouse {
    client: Client,
    connection: WarehouseConnection,
}

impl SnowflakeWarehouse {
    pub fn new(connection: WarehouseConnection) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("filing-insights/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, connection })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.connection.token))
            .header(
                "X-Snowflake-Authorization-Token-Type",
                &self.connection.token_type,
            )
            .header("Accept", "application/json")
    }

    fn statements_url(&self) -> String {
        format!("{}/api/v2/statements", self.connection.account_url)
    }

    fn request_body(&self, statement: &Statement) -> Value {
        let mut body = Map::new();
        body.insert("statement".to_string(), json!(statement.sql));
        body.insert("database".to_string(), json!(self.connection.database));
        body.insert("schema".to_string(), json!(self.connection.schema));
        if let Some(warehouse) = &self.connection.warehouse {
            body.insert("warehouse".to_string(), json!(warehouse));
        }
        if let Some(role) = &self.connection.role {
            body.insert("role".to_string(), json!(role));
        }
        if !statement.binds.is_empty() {
            body.insert("bindings".to_string(), bindings(&statement.binds));
        }
        Value::Object(body)
    }

    /// Submit a statement and return its full result set.
    pub async fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        let url = format!("{}?requestId={}", self.statements_url(), Uuid::new_v4());
        debug!("Submitting statement: {}", statement.sql);

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.request_body(statement))
            .send()
            .await?;

        let mut status = response.status();
        let mut body: StatementResponse = decode_body(response, status).await?;

        // 202: still running, poll the handle
        while status == StatusCode::ACCEPTED {
            let handle = body.statement_handle.clone().ok_or_else(|| {
                InsightsError::Warehouse("202 response without a statement handle".to_string())
            })?;
            debug!("Statement {} still running", handle);
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .authorized(
                    self.client
                        .get(format!("{}/{}", self.statements_url(), handle)),
                )
                .send()
                .await?;
            status = response.status();
            body = decode_body(response, status).await?;
        }

        self.collect_partitions(body).await
    }

    async fn collect_partitions(&self, body: StatementResponse) -> Result<ResultSet> {
        let meta = body.result_set_meta_data.ok_or_else(|| {
            InsightsError::Warehouse(format!(
                "statement returned no result metadata: {}",
                body.message.unwrap_or_default()
            ))
        })?;

        let columns: Vec<String> = meta.row_type.into_iter().map(|r| r.name).collect();
        let mut rows = body.data.unwrap_or_default();

        if meta.partition_info.len() > 1 {
            let handle = body.statement_handle.ok_or_else(|| {
                InsightsError::Warehouse("partitioned result without a statement handle".to_string())
            })?;
            for partition in 1..meta.partition_info.len() {
                let url = format!(
                    "{}/{}?partition={}",
                    self.statements_url(),
                    handle,
                    partition
                );
                let response = self.authorized(self.client.get(&url)).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(InsightsError::Warehouse(format!(
                        "fetching partition {} failed with status {}: {}",
                        partition, status, text
                    )));
                }
                let page: PartitionResponse = response.json().await?;
                rows.extend(page.data.unwrap_or_default());
            }
        }

        info!("Statement returned {} rows", rows.len());
        Ok(ResultSet::new(columns, rows))
    }
}

/// Parse a statement response, turning non-2xx answers into warehouse errors.
async fn decode_body(response: reqwest::Response, status: StatusCode) -> Result<StatementResponse> {
    if status == StatusCode::OK || status == StatusCode::ACCEPTED {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StatementResponse>(&text)
        .ok()
        .map(|r| {
            format!(
                "{} (code: {})",
                r.message.unwrap_or_default(),
                r.code.unwrap_or_default()
            )
        })
        .unwrap_or(text);
    warn!("Statement failed with status {}: {}", status, message);
    Err(InsightsError::Warehouse(format!(
        "statement failed with status {}: {}",
        status, message
    )))
}

/// SQL API bindings are keyed by 1-based position with string values.
fn bindings(binds: &[Bind]) -> Value {
    let mut map = Map::new();
    for (i, bind) in binds.iter().enumerate() {
        let value = match bind {
            Bind::Text(s) => json!({ "type": "TEXT", "value": s }),
            Bind::Number(n) => json!({ "type": "REAL", "value": n.to_string() }),
        };
        map.insert((i + 1).to_string(), value);
    }
    Value::Object(map)
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<ResultSet> {
        self.execute(&sql::read_table(table, limit)).await
    }

    async fn run_query(&self, query: &Query) -> Result<ResultSet> {
        info!("Running {} query", query.label());
        self.execute(&sql::render(query)?).await
    }

    /// The stage root is the mounted location of the external stage the pipes read from.
    async fn stage_file(
        &self,
        local_path: &Path,
        destination: &str,
        overwrite: bool,
    ) -> Result<StageAck> {
        let (_, ack) =
            copy_into_stage(&self.connection.stage_root, local_path, destination, overwrite)
                .await?;
        Ok(ack)
    }

    async fn list_pipelines(&self, schema: &str) -> Result<ResultSet> {
        self.execute(&sql::show_pipes(schema)?).await
    }

    async fn list_scheduled_jobs(&self, schema: &str) -> Result<ResultSet> {
        self.execute(&sql::show_tasks(schema)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_are_one_based_strings() {
        let value = bindings(&[Bind::Text("model".to_string()), Bind::Number(-0.5)]);
        assert_eq!(value["1"]["type"], "TEXT");
        assert_eq!(value["1"]["value"], "model");
        assert_eq!(value["2"]["type"], "REAL");
        assert_eq!(value["2"]["value"], "-0.5");
    }

    #[test]
    fn test_statement_response_decodes_metadata() {
        let body = r#"{
            "code": "090001",
            "statementHandle": "01b2-abc",
            "resultSetMetaData": {
                "numRows": 1,
                "rowType": [{"name": "COMPANY_NAME", "type": "text"}, {"name": "MAX_REVENUE", "type": "fixed"}],
                "partitionInfo": [{"rowCount": 1, "uncompressedSize": 40}]
            },
            "data": [["Apple", "383285000000"]]
        }"#;
        let parsed: StatementResponse = serde_json::from_str(body).unwrap();
        let meta = parsed.result_set_meta_data.unwrap();
        assert_eq!(meta.row_type.len(), 2);
        assert_eq!(meta.partition_info.len(), 1);
        assert_eq!(parsed.data.unwrap()[0][1], "383285000000");
    }

    #[test]
    fn test_request_body_carries_context() {
        let warehouse = SnowflakeWarehouse::new(WarehouseConnection {
            account_url: "https://acct.snowflakecomputing.com".to_string(),
            token: "t".to_string(),
            token_type: "KEYPAIR_JWT".to_string(),
            warehouse: Some("COMPUTE_WH".to_string()),
            role: None,
            database: "SEC_DATA".to_string(),
            schema: "PUBLIC".to_string(),
            stage_root: "stage".into(),
        })
        .unwrap();
        let body = warehouse.request_body(&Statement {
            sql: "SELECT 1".to_string(),
            binds: vec![],
        });
        assert_eq!(body["warehouse"], "COMPUTE_WH");
        assert!(body.get("role").is_none());
        assert!(body.get("bindings").is_none());
    }
}
