mod common;

use common::StubWarehouse;
use filing_insights::config::{Catalog, ModelSettings};
use filing_insights::error::InsightsError;
use filing_insights::rag::RagPipeline;
use filing_insights::warehouse::local::LocalWarehouse;

const QUESTION: &str = "What was Apple's net income in 2024?";

fn apple_chunks() -> Vec<String> {
    vec![
        "Apple reported net income of $97B in 2024.".to_string(),
        "Apple's revenue grew 5%.".to_string(),
        "Apple announced a new product.".to_string(),
    ]
}

#[tokio::test]
async fn test_prompt_is_built_from_ranked_chunks() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse {
        embedding: Some(StubWarehouse::unit_embedding()),
        chunks: apple_chunks(),
        answer: Some("Apple's net income in 2024 was $97 billion.".to_string()),
        ..StubWarehouse::new()
    };
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let pipeline = RagPipeline::new(&stub, &catalog.doc_chunks, &models);

    let exchange = pipeline.answer(QUESTION).await?;

    let expected_prompt = "Context:\n\
        Apple reported net income of $97B in 2024.\n\
        Apple's revenue grew 5%.\n\
        Apple announced a new product.\n\
        \n\
        Question: What was Apple's net income in 2024?\n\
        Answer:";
    assert_eq!(exchange.prompt, expected_prompt);
    assert_eq!(stub.prompts(), vec![expected_prompt.to_string()]);
    assert_eq!(exchange.answer, "Apple's net income in 2024 was $97 billion.");
    assert_eq!(exchange.chunks.len(), 3);
    assert_eq!(
        stub.calls(),
        vec!["embed", "similar_chunks", "complete"]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_embedding_stops_the_pipeline() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse {
        embedding: None,
        chunks: apple_chunks(),
        answer: Some("never returned".to_string()),
        ..StubWarehouse::new()
    };
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let pipeline = RagPipeline::new(&stub, &catalog.doc_chunks, &models);

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, InsightsError::Embedding(_)), "got {:?}", err);
    assert_eq!(stub.count("embed"), 1);
    assert_eq!(stub.count("similar_chunks"), 0);
    assert_eq!(stub.count("complete"), 0);

    // the dashboard entry point reports the same failure without a partial answer
    let outcome = pipeline.ask(QUESTION).await;
    assert!(matches!(outcome.error(), Some(InsightsError::Embedding(_))));
    Ok(())
}

#[tokio::test]
async fn test_wrong_dimension_is_an_embedding_error() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse {
        embedding: Some(vec![0.5; 12]),
        chunks: apple_chunks(),
        ..StubWarehouse::new()
    };
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let pipeline = RagPipeline::new(&stub, &catalog.doc_chunks, &models);

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, InsightsError::Embedding(_)));
    assert_eq!(stub.count("similar_chunks"), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_completion_is_a_generation_error() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse {
        embedding: Some(StubWarehouse::unit_embedding()),
        chunks: apple_chunks(),
        answer: None,
        ..StubWarehouse::new()
    };
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let pipeline = RagPipeline::new(&stub, &catalog.doc_chunks, &models);

    let outcome = pipeline.ask(QUESTION).await;
    assert!(matches!(outcome.error(), Some(InsightsError::Generation(_))));
    assert!(outcome.data().is_none());
    assert_eq!(stub.count("complete"), 1);
    Ok(())
}

#[tokio::test]
async fn test_blank_question_asks_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let stub = StubWarehouse::new();
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let pipeline = RagPipeline::new(&stub, &catalog.doc_chunks, &models);

    assert!(pipeline.ask("   ").await.is_empty());
    assert!(stub.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_local_warehouse_retrieves_the_closest_chunk() -> Result<(), Box<dyn std::error::Error>> {
    let stage = tempfile::tempdir()?;
    let catalog = Catalog::new("SEC_DATA", "PUBLIC")?;
    let models = ModelSettings::default();
    let texts = vec![
        "Intel recorded a net loss in 2024.".to_string(),
        "Apple reported net income of $97B in 2024.".to_string(),
        "Moderna revenue fell in 2024.".to_string(),
        "Tesla delivered fewer vehicles.".to_string(),
    ];
    let warehouse =
        LocalWarehouse::new(stage.path()).with_embedded_texts(&catalog.doc_chunks, texts)?;
    let pipeline = RagPipeline::new(&warehouse, &catalog.doc_chunks, &models);

    let exchange = pipeline.answer("Apple net income 2024").await?;
    assert_eq!(exchange.chunks.len(), 3);
    assert_eq!(exchange.chunks[0].text, "Apple reported net income of $97B in 2024.");
    let scores: Vec<f64> = exchange
        .chunks
        .iter()
        .map(|c| c.similarity.unwrap_or_default())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(exchange.prompt.starts_with("Context:\nApple reported net income"));
    assert!(!exchange.answer.is_empty());
    Ok(())
}
