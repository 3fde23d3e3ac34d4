pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod models;
pub mod monitoring;
pub mod outcome;
pub mod rag;
pub mod render;
pub mod vector;
pub mod views;
pub mod warehouse;

pub use config::{Catalog, ModelSettings, RawTable, Settings, TableRef};
pub use dashboard::{Session, Tab, TabReport};
pub use error::{InsightsError, Result, Stage};
pub use outcome::Outcome;
pub use warehouse::{Query, ResultSet, Warehouse};
