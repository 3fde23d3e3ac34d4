use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Stage error: {0}")]
    Stage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Preview error: {0}")]
    Preview(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for InsightsError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        InsightsError::Polars(e.to_string())
    }
}

/// Which stage of an operation an error surfaced in.
///
/// Lower-level errors (transport, decoding) are folded into the stage variant so that
/// callers only ever see the taxonomy they can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Stage,
    Embedding,
    Retrieval,
    Generation,
    Preview,
}

impl InsightsError {
    /// Re-labels an error as having happened in `stage`. Errors already carrying a
    /// taxonomy variant keep their message but take the new label.
    pub fn at(self, stage: Stage) -> Self {
        let message = match self {
            InsightsError::Load(m)
            | InsightsError::Stage(m)
            | InsightsError::Embedding(m)
            | InsightsError::Retrieval(m)
            | InsightsError::Generation(m)
            | InsightsError::Preview(m) => m,
            other => other.to_string(),
        };
        match stage {
            Stage::Load => InsightsError::Load(message),
            Stage::Stage => InsightsError::Stage(message),
            Stage::Embedding => InsightsError::Embedding(message),
            Stage::Retrieval => InsightsError::Retrieval(message),
            Stage::Generation => InsightsError::Generation(message),
            Stage::Preview => InsightsError::Preview(message),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            InsightsError::Load(_) => Some(Stage::Load),
            InsightsError::Stage(_) => Some(Stage::Stage),
            InsightsError::Embedding(_) => Some(Stage::Embedding),
            InsightsError::Retrieval(_) => Some(Stage::Retrieval),
            InsightsError::Generation(_) => Some(Stage::Generation),
            InsightsError::Preview(_) => Some(Stage::Preview),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_relabels_transport_errors() {
        let err = InsightsError::Warehouse("status 500".to_string()).at(Stage::Retrieval);
        assert_eq!(err.stage(), Some(Stage::Retrieval));
        assert!(err.to_string().contains("status 500"));
    }

    #[test]
    fn test_at_keeps_message_of_taxonomy_errors() {
        let err = InsightsError::Load("no such table".to_string()).at(Stage::Preview);
        assert_eq!(err.to_string(), "Preview error: no such table");
    }
}
