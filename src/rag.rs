//! RAG Q&A Pipeline
//!
//! Answers a free-text question in four strictly ordered steps:
//!
//! 1. **Embed** the question with the warehouse embedding function
//! 2. **Retrieve** the [`TOP_K`] stored chunks most similar to it
//! 3. **Augment**: join the chunks into a context block and build the prompt
//! 4. **Generate** the answer with the warehouse completion function
//!
//! A failing step aborts the request with one error naming that step; later steps are
//! never run and no partial answer is returned. Nothing is cached between questions.

use crate::config::{ModelSettings, TableRef};
use crate::error::{InsightsError, Result, Stage};
use crate::models::RetrievedChunk;
use crate::outcome::Outcome;
use crate::vector::{check_dimension, TOP_K};
use crate::warehouse::{Query, Warehouse};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Everything produced while answering one question. Lives for one request only.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerExchange {
    pub question: String,
    pub chunks: Vec<RetrievedChunk>,
    pub prompt: String,
    pub answer: String,
}

/// Join retrieved chunks, in ranked order, one per line.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}\nAnswer:", context, question)
}

pub struct RagPipeline<'a> {
    warehouse: &'a dyn Warehouse,
    chunks_table: &'a TableRef,
    models: &'a ModelSettings,
}

impl<'a> RagPipeline<'a> {
    pub fn new(
        warehouse: &'a dyn Warehouse,
        chunks_table: &'a TableRef,
        models: &'a ModelSettings,
    ) -> Self {
        Self {
            warehouse,
            chunks_table,
            models,
        }
    }

    /// Run the full pipeline for `question`.
    pub async fn answer(&self, question: &str) -> Result<AnswerExchange> {
        if question.trim().is_empty() {
            return Err(InsightsError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        debug!("Answering question: {}", question);

        let embedding = self
            .warehouse
            .embed(&self.models.embed_model, question)
            .await
            .and_then(|e| {
                e.ok_or_else(|| {
                    InsightsError::Embedding("embedding call returned no rows".to_string())
                })
            })
            .and_then(|e| check_dimension(&e).map(|_| e))
            .map_err(|e| e.at(Stage::Embedding))?;
        info!("Embedded question ({} dimensions)", embedding.len());

        let chunks: Vec<RetrievedChunk> = self
            .warehouse
            .run_query(&Query::SimilarChunks {
                table: self.chunks_table.clone(),
                embedding,
                k: TOP_K,
            })
            .await
            .and_then(|rs| rs.decode())
            .map_err(|e| e.at(Stage::Retrieval))?;
        info!("Retrieved {} context chunks", chunks.len());

        let context = build_context(&chunks);
        let prompt = build_prompt(&context, question);

        let answer = self
            .warehouse
            .complete(&self.models.complete_model, &prompt)
            .await
            .and_then(|a| {
                a.filter(|text| !text.trim().is_empty()).ok_or_else(|| {
                    InsightsError::Generation("completion returned no result".to_string())
                })
            })
            .map_err(|e| e.at(Stage::Generation))?;
        info!("Generated answer ({} chars)", answer.len());

        Ok(AnswerExchange {
            question: question.to_string(),
            chunks,
            prompt,
            answer,
        })
    }

    /// Dashboard entry point: a blank question is simply nothing to show.
    pub async fn ask(&self, question: &str) -> Outcome<AnswerExchange> {
        if question.trim().is_empty() {
            return Outcome::Empty;
        }
        match self.answer(question).await {
            Ok(exchange) => Outcome::Data(exchange),
            Err(e) => {
                warn!("Question could not be answered: {}", e);
                Outcome::Failed(e)
            }
        }
    }
}
