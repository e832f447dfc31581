use crate::table::ResultTable;
use crate::{Generator, Prompts, QueryRunner, sanitize};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const SQL_GENERATION_FAILED: &str =
    "There was an error generating the SQL query. Please try again.";

/// Where an ask ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    QuestionSubmitted,
    SqlGenerated,
    QueryExecuted,
    ResultParaphrased,
    /// Query failed or matched nothing; the raw question was sent to the model
    /// without any SQL context.
    Degraded,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::QuestionSubmitted => "question_submitted",
            Stage::SqlGenerated => "sql_generated",
            Stage::QueryExecuted => "query_executed",
            Stage::ResultParaphrased => "result_paraphrased",
            Stage::Degraded => "degraded",
            Stage::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    QueryFailed,
    NoRows,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Blank question, nothing was called.
    Idle,
    Answered {
        sql: String,
        table: ResultTable,
        paraphrase: Option<String>,
    },
    Degraded {
        sql: String,
        reason: FallbackReason,
        answer: Option<String>,
    },
    Failed {
        message: String,
    },
}

impl Outcome {
    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Idle => Stage::Idle,
            Outcome::Answered {
                paraphrase: Some(_),
                ..
            } => Stage::ResultParaphrased,
            Outcome::Answered { .. } => Stage::QueryExecuted,
            Outcome::Degraded { .. } => Stage::Degraded,
            Outcome::Failed { .. } => Stage::Error,
        }
    }
}

/// Runs one question through model, database and model again.
///
/// Built once at startup and shared; holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn Generator>,
    runner: Arc<dyn QueryRunner>,
    prompts: Prompts,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        runner: Arc<dyn QueryRunner>,
        prompts: Prompts,
    ) -> Self {
        Self {
            generator,
            runner,
            prompts,
        }
    }

    pub async fn ask(&self, question: &str) -> Outcome {
        if question.trim().is_empty() {
            return Outcome::Idle;
        }
        log::info!("ask: {} chars", question.chars().count());
        transition(Stage::Idle, Stage::QuestionSubmitted);

        let instruction = match self.prompts.sql_instruction(question) {
            Ok(text) => text,
            Err(e) => {
                log::error!("sql prompt: {}", e);
                return failed();
            }
        };
        let raw_sql = match self.generator.generate(&instruction, question).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("error generating sql: {}", e);
                return failed();
            }
        };
        let sql = sanitize(&raw_sql);
        log::debug!("generated sql {:?}, sanitized {:?}", raw_sql, sql);
        transition(Stage::QuestionSubmitted, Stage::SqlGenerated);

        let table = match self.runner.execute(&sql).await {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => return self.degrade(question, sql, FallbackReason::NoRows).await,
            Err(e) => {
                log::error!("query failed: {}", e);
                return self.degrade(question, sql, FallbackReason::QueryFailed).await;
            }
        };
        transition(Stage::SqlGenerated, Stage::QueryExecuted);

        let paraphrase = self.paraphrase(question, &table).await;
        if paraphrase.is_some() {
            transition(Stage::QueryExecuted, Stage::ResultParaphrased);
        }
        Outcome::Answered {
            sql,
            table,
            paraphrase,
        }
    }

    async fn paraphrase(&self, question: &str, table: &ResultTable) -> Option<String> {
        let instruction = match self
            .prompts
            .paraphrase_instruction(question, &table.to_text())
        {
            Ok(text) => text,
            Err(e) => {
                log::error!("paraphrase prompt: {}", e);
                return None;
            }
        };
        match self.generator.generate(&instruction, "").await {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("error generating paraphrase: {}", e);
                None
            }
        }
    }

    async fn degrade(&self, question: &str, sql: String, reason: FallbackReason) -> Outcome {
        log::warn!(
            "degrading to a direct answer ({:?}); sql context is dropped: {:?}",
            reason,
            sql
        );
        transition(Stage::SqlGenerated, Stage::Degraded);
        let answer = match self.generator.generate("", question).await {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("error generating direct answer: {}", e);
                None
            }
        };
        Outcome::Degraded {
            sql,
            reason,
            answer,
        }
    }
}

fn failed() -> Outcome {
    transition(Stage::QuestionSubmitted, Stage::Error);
    Outcome::Failed {
        message: SQL_GENERATION_FAILED.to_string(),
    }
}

fn transition(from: Stage, to: Stage) {
    log::debug!("{} -> {}", from, to);
}
