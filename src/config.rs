//! Settings - warehouse connection, table catalog and model identifiers
//!
//! Everything is read from the environment (optionally seeded from a `.env` file) with
//! defaults matching the SEC filing warehouse layout.

use crate::error::{InsightsError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap();
}

/// Default embedding model (768-dimensional output)
pub const DEFAULT_EMBED_MODEL: &str = "snowflake-arctic-embed-m-v1.5";

/// Default text-completion model
pub const DEFAULT_COMPLETE_MODEL: &str = "snowflake-arctic";

/// Fully-qualified warehouse table or view name (database.schema.name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    database: String,
    schema: String,
    name: String,
}

impl TableRef {
    /// Builds a table reference, rejecting anything that is not a plain identifier.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let table = Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        };
        for part in [&table.database, &table.schema, &table.name] {
            validate_identifier(part)?;
        }
        Ok(table)
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `database.schema` the table lives in.
    pub fn schema_path(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Accepts only identifiers that are safe to splice into SQL text unquoted.
pub fn validate_identifier(ident: &str) -> Result<()> {
    if IDENTIFIER.is_match(ident) {
        Ok(())
    } else {
        Err(InsightsError::Config(format!(
            "'{}' is not a valid warehouse identifier",
            ident
        )))
    }
}

/// Raw upload targets: the four files of the SEC financial statement data sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawTable {
    Sub,
    Num,
    Pre,
    Tag,
}

impl RawTable {
    pub const ALL: [RawTable; 4] = [RawTable::Sub, RawTable::Num, RawTable::Pre, RawTable::Tag];

    /// Name of the warehouse table the auto-ingest pipe loads into.
    pub fn table_name(self) -> &'static str {
        match self {
            RawTable::Sub => "SUB",
            RawTable::Num => "NUM",
            RawTable::Pre => "PRE",
            RawTable::Tag => "TAG",
        }
    }

    /// Stage sub-directory watched by the pipe for this table.
    pub fn stage_prefix(self) -> &'static str {
        match self {
            RawTable::Sub => "sub",
            RawTable::Num => "num",
            RawTable::Pre => "pre",
            RawTable::Tag => "tag",
        }
    }

    /// Auto-ingest pipe loading this table.
    pub fn pipe_name(self) -> String {
        format!("{}_PIPE", self.table_name())
    }
}

impl fmt::Display for RawTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_prefix())
    }
}

impl FromStr for RawTable {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        RawTable::ALL
            .into_iter()
            .find(|t| t.stage_prefix() == lowered || t.table_name().to_lowercase() == lowered)
            .ok_or_else(|| {
                InsightsError::InvalidInput(format!(
                    "unknown upload table '{}' (expected one of sub, num, pre, tag)",
                    s
                ))
            })
    }
}

/// Connection parameters for the warehouse SQL statements API.
#[derive(Debug, Clone)]
pub struct WarehouseConnection {
    pub account_url: String,
    pub token: String,
    pub token_type: String,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub database: String,
    pub schema: String,
    /// Local mount of the external stage the auto-ingest pipes watch
    pub stage_root: PathBuf,
}

/// Logical tables and views this system reads.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub filing_facts: TableRef,
    pub non_compliant: TableRef,
    pub high_risk: TableRef,
    pub summaries: TableRef,
    pub doc_chunks: TableRef,
    database: String,
    schema: String,
}

impl Catalog {
    pub fn new(database: &str, schema: &str) -> Result<Self> {
        Ok(Self {
            filing_facts: TableRef::new(database, schema, "COMPANY_CHUNKS_PROD")?,
            non_compliant: TableRef::new(database, schema, "NON_COMPLIANT_FILINGS")?,
            high_risk: TableRef::new(database, schema, "HIGH_RISK_FILINGS")?,
            summaries: TableRef::new(database, schema, "FILING_SUMMARIES")?,
            doc_chunks: TableRef::new(database, schema, "DOC_CHUNKS")?,
            database: database.to_string(),
            schema: schema.to_string(),
        })
    }

    pub fn raw(&self, table: RawTable) -> TableRef {
        TableRef {
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: table.table_name().to_string(),
        }
    }

    /// `database.schema` holding the pipes and tasks.
    pub fn schema_path(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }

    /// Tables whose row counts the monitoring view reports.
    pub fn monitored_tables(&self) -> Vec<TableRef> {
        let mut tables: Vec<TableRef> = RawTable::ALL.iter().map(|t| self.raw(*t)).collect();
        tables.push(self.filing_facts.clone());
        tables.push(self.doc_chunks.clone());
        tables
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub embed_model: String,
    pub complete_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            complete_model: DEFAULT_COMPLETE_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog: Catalog,
    pub models: ModelSettings,
    pub connection: Option<WarehouseConnection>,
}

impl Settings {
    /// Settings for the default `SEC_DATA.PUBLIC` layout with no remote connection.
    pub fn local() -> Result<Self> {
        Ok(Self {
            catalog: Catalog::new("SEC_DATA", "PUBLIC")?,
            models: ModelSettings::default(),
            connection: None,
        })
    }

    /// Load settings from the environment (and `.env` if present).
    ///
    /// The connection block is only populated when `SNOWFLAKE_ACCOUNT_URL` is set.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database = env_or("SNOWFLAKE_DATABASE", "SEC_DATA");
        let schema = env_or("SNOWFLAKE_SCHEMA", "PUBLIC");
        let catalog = Catalog::new(&database, &schema)?;

        let models = ModelSettings {
            embed_model: env_or("FILING_EMBED_MODEL", DEFAULT_EMBED_MODEL),
            complete_model: env_or("FILING_COMPLETE_MODEL", DEFAULT_COMPLETE_MODEL),
        };

        let connection = match std::env::var("SNOWFLAKE_ACCOUNT_URL") {
            Ok(account_url) => {
                let token = std::env::var("SNOWFLAKE_TOKEN").map_err(|_| {
                    InsightsError::Config(
                        "SNOWFLAKE_TOKEN must be set when SNOWFLAKE_ACCOUNT_URL is".to_string(),
                    )
                })?;
                Some(WarehouseConnection {
                    account_url: account_url.trim_end_matches('/').to_string(),
                    token,
                    token_type: env_or("SNOWFLAKE_TOKEN_TYPE", "KEYPAIR_JWT"),
                    warehouse: std::env::var("SNOWFLAKE_WAREHOUSE").ok(),
                    role: std::env::var("SNOWFLAKE_ROLE").ok(),
                    database,
                    schema,
                    stage_root: PathBuf::from(env_or("FILING_STAGE_ROOT", "stage")),
                })
            }
            Err(_) => None,
        };

        Ok(Self {
            catalog,
            models,
            connection,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_rejects_injection() {
        assert!(TableRef::new("SEC_DATA", "PUBLIC", "DOC_CHUNKS").is_ok());
        assert!(TableRef::new("SEC_DATA", "PUBLIC", "x; DROP TABLE y").is_err());
        assert!(TableRef::new("SEC_DATA", "", "DOC_CHUNKS").is_err());
    }

    #[test]
    fn test_raw_table_parsing() {
        assert_eq!("num".parse::<RawTable>().unwrap(), RawTable::Num);
        assert_eq!("TAG".parse::<RawTable>().unwrap(), RawTable::Tag);
        assert!("facts".parse::<RawTable>().is_err());
    }

    #[test]
    fn test_monitored_tables() {
        let catalog = Catalog::new("SEC_DATA", "PUBLIC").unwrap();
        let names: Vec<String> = catalog
            .monitored_tables()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["SUB", "NUM", "PRE", "TAG", "COMPANY_CHUNKS_PROD", "DOC_CHUNKS"]
        );
        assert_eq!(catalog.filing_facts.qualified(), "SEC_DATA.PUBLIC.COMPANY_CHUNKS_PROD");
    }
}
