use async_trait::async_trait;
use thiserror::Error;

pub mod flow;
pub mod prompts;
pub mod sanitize;
pub mod table;

pub use flow::{FallbackReason, Outcome, Pipeline, Stage};
pub use prompts::Prompts;
pub use sanitize::sanitize;
pub use table::ResultTable;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured for the generation client")]
    MissingApiKey,
    #[error("nothing to send: instruction and question are both empty")]
    EmptyPrompt,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Execute(String),
}

/// A text-generation model taking a two-part prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, instruction: &str, question: &str) -> Result<String, GenerationError>;
}

/// Something that runs one SQL statement and materializes every row.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultTable, QueryError>;
}
