use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::http::HttpServer;
use crate::page::Page;
use crate::postgres::PostgresReader;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use sqlask_pipeline::{Generator, Outcome, Pipeline, Prompts, QueryRunner, Stage};
use sqlask_template::TemplateError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Everything a request needs. Built once, read-only afterwards.
pub struct AppContext {
    pub pipeline: Pipeline,
    pub page: Page,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub stage: Stage,
    pub outcome: Outcome,
}

pub struct Engine {
    config: AppConfig,
    context: Arc<AppContext>,
}

impl Engine {
    pub fn new(config: AppConfig) -> Result<Self, EngineError> {
        if config.generation.api_key.is_none() {
            log::warn!("GOOGLE_API_KEY is not set; every generation call will fail");
        }
        let generator = Arc::new(GeminiClient::new(config.generation.clone()));
        let runner = Arc::new(PostgresReader::new(config.database.clone()));
        Self::with_parts(config, generator, runner)
    }

    /// Same as `new` but with caller-supplied model and database seams.
    pub fn with_parts(
        config: AppConfig,
        generator: Arc<dyn Generator>,
        runner: Arc<dyn QueryRunner>,
    ) -> Result<Self, EngineError> {
        let context = AppContext {
            pipeline: Pipeline::new(generator, runner, Prompts::builtin()?),
            page: Page::builtin()?,
        };
        Ok(Self {
            config,
            context: Arc::new(context),
        })
    }

    pub fn context(&self) -> Arc<AppContext> {
        Arc::clone(&self.context)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index).post(ask))
            .route("/api/ask", post(ask_json))
            .with_state(self.context())
    }

    pub async fn run(self) -> Result<(), EngineError> {
        log::info!(
            "model {} / database {}@{}:{}/{}",
            self.config.generation.model,
            self.config.database.user,
            self.config.database.host,
            self.config.database.port,
            self.config.database.database
        );
        let server = HttpServer::new(self.router(), self.config.addr());
        server.start().await?;
        Ok(())
    }
}

pub async fn index(State(ctx): State<Arc<AppContext>>) -> Response {
    render_page(&ctx, "", &Outcome::Idle)
}

pub async fn ask(State(ctx): State<Arc<AppContext>>, Form(form): Form<AskForm>) -> Response {
    let outcome = ctx.pipeline.ask(&form.question).await;
    log::info!("ask finished in stage {}", outcome.stage());
    render_page(&ctx, &form.question, &outcome)
}

pub async fn ask_json(
    State(ctx): State<Arc<AppContext>>,
    Json(form): Json<AskForm>,
) -> Json<AskResponse> {
    let outcome = ctx.pipeline.ask(&form.question).await;
    log::info!("api ask finished in stage {}", outcome.stage());
    Json(AskResponse {
        stage: outcome.stage(),
        outcome,
    })
}

fn render_page(ctx: &AppContext, question: &str, outcome: &Outcome) -> Response {
    match ctx.page.render(question, outcome) {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            log::error!("rendering page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Page rendering failed").into_response()
        }
    }
}
