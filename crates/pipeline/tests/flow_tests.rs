use async_trait::async_trait;
use serde_json::json;
use sqlask_pipeline::flow::SQL_GENERATION_FAILED;
use sqlask_pipeline::{
    FallbackReason, GenerationError, Generator, Outcome, Pipeline, Prompts, QueryError,
    QueryRunner, ResultTable, Stage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replies in order and records every (instruction, question) it was given.
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, instruction: &str, question: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((instruction.to_string(), question.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

struct FixedRunner {
    result: Result<ResultTable, String>,
    seen: Mutex<Vec<String>>,
}

impl FixedRunner {
    fn ok(table: ResultTable) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(table),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl QueryRunner for FixedRunner {
    async fn execute(&self, sql: &str) -> Result<ResultTable, QueryError> {
        self.seen.lock().unwrap().push(sql.to_string());
        self.result.clone().map_err(QueryError::Execute)
    }
}

fn pipeline(generator: Arc<ScriptedGenerator>, runner: Arc<FixedRunner>) -> Pipeline {
    Pipeline::new(generator, runner, Prompts::builtin().unwrap())
}

#[tokio::test]
async fn count_question_is_answered_and_paraphrased() {
    let generator = ScriptedGenerator::new(vec![
        Ok("SELECT COUNT(*) FROM players".to_string()),
        Ok("There are 42 players in the database.".to_string()),
    ]);
    let runner = FixedRunner::ok(ResultTable::new(
        vec!["count".into()],
        vec![vec![json!(42)]],
    ));
    let p = pipeline(generator.clone(), runner.clone());

    let outcome = p.ask("How many players are there?").await;

    assert_eq!(outcome.stage(), Stage::ResultParaphrased);
    match outcome {
        Outcome::Answered {
            sql,
            table,
            paraphrase,
        } => {
            assert_eq!(sql, "SELECT COUNT(*) FROM players");
            assert_eq!(table.row_count(), 1);
            assert!(paraphrase.unwrap().contains("42"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(*runner.seen.lock().unwrap(), vec!["SELECT COUNT(*) FROM players"]);

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].0.contains("converting English questions to SQL"));
    assert_eq!(calls[0].1, "How many players are there?");
    // paraphrase call carries question and flattened table in the instruction
    assert!(calls[1].0.contains("Question: How many players are there?"));
    assert!(calls[1].0.contains("count\n0     42"));
    assert_eq!(calls[1].1, "");
}

#[tokio::test]
async fn generated_sql_is_sanitized_before_execution() {
    let generator = ScriptedGenerator::new(vec![
        Ok("```sql\n SELECT * FROM players WHERE team='Barcelona';\n```".to_string()),
        Ok("Pedri plays for Barcelona.".to_string()),
    ]);
    let runner = FixedRunner::ok(ResultTable::new(
        vec!["first_name".into()],
        vec![vec![json!("Pedri")]],
    ));
    let p = pipeline(generator, runner.clone());

    let _ = p.ask("List all players in the team 'Barcelona'").await;

    assert_eq!(
        *runner.seen.lock().unwrap(),
        vec!["SELECT * FROM players WHERE team='Barcelona'"]
    );
}

#[tokio::test]
async fn empty_result_takes_degrade_branch() {
    let generator = ScriptedGenerator::new(vec![
        Ok("SELECT * FROM players WHERE team='Atlantis';".to_string()),
        Ok("Atlantis is a mythical city and has no football team.".to_string()),
    ]);
    let runner = FixedRunner::ok(ResultTable::new(vec!["player_id".into()], vec![]));
    let p = pipeline(generator.clone(), runner);

    let outcome = p.ask("List players in team 'Atlantis'").await;

    assert_eq!(outcome.stage(), Stage::Degraded);
    assert_eq!(
        outcome,
        Outcome::Degraded {
            sql: "SELECT * FROM players WHERE team='Atlantis'".to_string(),
            reason: FallbackReason::NoRows,
            answer: Some("Atlantis is a mythical city and has no football team.".to_string()),
        }
    );

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    // the fallback asks the raw question with no instruction at all
    assert_eq!(calls[1], (String::new(), "List players in team 'Atlantis'".to_string()));
}

#[tokio::test]
async fn query_failure_takes_degrade_branch() {
    let generator = ScriptedGenerator::new(vec![
        Ok("SELEC * FROM players".to_string()),
        Ok("I am not sure.".to_string()),
    ]);
    let runner = FixedRunner::failing("syntax error at or near \"SELEC\"");
    let p = pipeline(generator, runner);

    match p.ask("Show me everyone").await {
        Outcome::Degraded { reason, answer, .. } => {
            assert_eq!(reason, FallbackReason::QueryFailed);
            assert_eq!(answer.as_deref(), Some("I am not sure."));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn degrade_answer_may_be_missing() {
    let generator = ScriptedGenerator::new(vec![
        Ok("SELECT 1".to_string()),
        Err(GenerationError::Transport("connection reset".into())),
    ]);
    let runner = FixedRunner::failing("relation does not exist");
    let p = pipeline(generator, runner);

    match p.ask("anything").await {
        Outcome::Degraded { answer, .. } => assert_eq!(answer, None),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn sql_generation_failure_short_circuits() {
    let generator = ScriptedGenerator::new(vec![Err(GenerationError::Api {
        status: 400,
        message: "API key not valid".into(),
    })]);
    let runner = FixedRunner::ok(ResultTable::default());
    let p = pipeline(generator.clone(), runner.clone());

    let outcome = p.ask("How many players are there?").await;

    assert_eq!(outcome.stage(), Stage::Error);
    assert_eq!(
        outcome,
        Outcome::Failed {
            message: SQL_GENERATION_FAILED.to_string()
        }
    );
    assert!(runner.seen.lock().unwrap().is_empty());
    assert_eq!(generator.calls().len(), 1);
}

#[tokio::test]
async fn paraphrase_failure_keeps_the_table() {
    let generator = ScriptedGenerator::new(vec![
        Ok("SELECT COUNT(*) FROM players".to_string()),
        Err(GenerationError::EmptyResponse),
    ]);
    let runner = FixedRunner::ok(ResultTable::new(
        vec!["count".into()],
        vec![vec![json!(7)]],
    ));
    let p = pipeline(generator, runner);

    let outcome = p.ask("How many players are there?").await;

    assert_eq!(outcome.stage(), Stage::QueryExecuted);
    match outcome {
        Outcome::Answered { paraphrase, table, .. } => {
            assert_eq!(paraphrase, None);
            assert_eq!(table.rows, vec![vec![json!(7)]]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn blank_question_calls_nothing() {
    let generator = ScriptedGenerator::new(vec![]);
    let runner = FixedRunner::ok(ResultTable::default());
    let p = pipeline(generator.clone(), runner.clone());

    assert_eq!(p.ask("   \n").await, Outcome::Idle);
    assert!(generator.calls().is_empty());
    assert!(runner.seen.lock().unwrap().is_empty());
}

#[test]
fn outcome_serializes_with_type_tag() {
    let outcome = Outcome::Degraded {
        sql: "SELECT 1".into(),
        reason: FallbackReason::NoRows,
        answer: None,
    };
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(
        value,
        json!({"type": "degraded", "sql": "SELECT 1", "reason": "no_rows", "answer": null})
    );
}
