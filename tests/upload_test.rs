mod common;

use common::{rows, StubWarehouse};
use filing_insights::config::{Catalog, RawTable};
use filing_insights::error::InsightsError;
use filing_insights::ingest::{IngestionTrigger, PREVIEW_ROWS};
use filing_insights::warehouse::local::LocalWarehouse;
use filing_insights::warehouse::Warehouse;
use serde_json::json;

const NUM_CSV: &str = "adsh,tag,version,ddate,qtrs,uom,value\n\
0000320193-24-000123,Revenues,us-gaap/2024,20240930,4,USD,391035000000\n\
0000320193-24-000123,NetIncomeLoss,us-gaap/2024,20240930,4,USD,93736000000\n";

#[tokio::test]
async fn test_preview_failure_keeps_upload_successful() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse::new().with_failing_table("NUM");
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let trigger = IngestionTrigger::new(&stub, &catalog);

    let report = trigger.upload(RawTable::Num, NUM_CSV.as_bytes()).await?;
    assert_eq!(report.ack.destination, "num/num.csv");
    assert_eq!(report.ack.bytes, NUM_CSV.len() as u64);
    assert!(matches!(report.preview.error(), Some(InsightsError::Preview(_))));
    assert_eq!(stub.calls(), vec!["stage_file", "read_table"]);

    let scratch = stub.staged_paths();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists(), "scratch file left behind at {:?}", scratch[0]);
    Ok(())
}

#[tokio::test]
async fn test_stage_failure_skips_preview() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse {
        stage_error: Some("stage is read-only".to_string()),
        ..StubWarehouse::new()
    };
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let trigger = IngestionTrigger::new(&stub, &catalog);

    let err = trigger.upload(RawTable::Sub, b"adsh\n1\n").await.unwrap_err();
    assert!(matches!(err, InsightsError::Stage(_)), "got {:?}", err);
    assert!(err.to_string().contains("stage is read-only"));
    assert_eq!(stub.count("stage_file"), 1);
    assert_eq!(stub.count("read_table"), 0);

    let scratch = stub.staged_paths();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists(), "scratch file left behind at {:?}", scratch[0]);
    Ok(())
}

#[tokio::test]
async fn test_preview_is_capped() -> Result<(), Box<dyn std::error::Error>> {
    let many: Vec<_> = (0..20).map(|i| vec![json!(format!("adsh-{}", i))]).collect();
    let stub = StubWarehouse::new().with_table("SUB", rows(&["ADSH"], many));
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let trigger = IngestionTrigger::new(&stub, &catalog);

    let report = trigger.upload(RawTable::Sub, b"adsh\nx\n").await?;
    let preview = report.preview.into_data().ok_or("no preview")?;
    assert_eq!(preview.len(), PREVIEW_ROWS);
    Ok(())
}

#[tokio::test]
async fn test_local_upload_replaces_staged_file_and_ingests() -> Result<(), Box<dyn std::error::Error>> {
    let stage = tempfile::tempdir()?;
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let warehouse = LocalWarehouse::new(stage.path()).with_catalog_pipelines(&catalog);
    let trigger = IngestionTrigger::new(&warehouse, &catalog);

    let first = trigger.upload(RawTable::Num, NUM_CSV.as_bytes()).await?;
    assert!(!first.ack.replaced_existing);
    assert_eq!(first.preview.data().map(|rs| rs.len()), Some(2));

    let smaller = "adsh,tag,version,ddate,qtrs,uom,value\n\
        0000789019-24-000087,Revenues,us-gaap/2024,20240630,4,USD,245122000000\n";
    let second = trigger.upload(RawTable::Num, smaller.as_bytes()).await?;
    assert!(second.ack.replaced_existing);

    let staged = std::fs::read_to_string(stage.path().join("num/num.csv"))?;
    assert_eq!(staged, smaller);

    let ingested = warehouse.read_table(&catalog.raw(RawTable::Num), None).await?;
    assert_eq!(ingested.len(), 1);
    assert!(ingested.columns.iter().any(|c| c == "ADSH"));
    Ok(())
}
