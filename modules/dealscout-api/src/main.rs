use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dealscout_common::Config;
use dealscout_research::{Orchestrator, Persistence, SessionRegistry};
use dealscout_scoring::{ScoringEngine, ScoringWeights};
use dealscout_store::{FindingStore, ScoreStore, SessionStore};
use research_client::PerplexityClient;

mod rest;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: ScoringEngine,
    pub scores: ScoreStore,
    pub sessions: SessionStore,
    pub findings: FindingStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dealscout=info".parse()?))
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let mut client = PerplexityClient::new(&config.research_api_key);
    if let Some(base_url) = &config.research_base_url {
        client = client.with_base_url(base_url);
    }

    let sessions = SessionStore::new(pool.clone());
    let findings = FindingStore::new(pool.clone());
    let scores = ScoreStore::new(pool);

    let orchestrator = Arc::new(
        Orchestrator::new(Arc::new(SessionRegistry::new()), Arc::new(client))
            .with_persistence(Persistence {
                sessions: sessions.clone(),
                findings: findings.clone(),
            }),
    );

    let engine = ScoringEngine::new(ScoringWeights::default())?;

    let state = Arc::new(AppState {
        orchestrator,
        engine,
        scores,
        sessions,
        findings,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Research sessions
        .route("/research/sessions", post(rest::start_session))
        .route("/research/sessions/{id}", get(rest::session_progress))
        .route("/research/sessions/{id}/results", get(rest::session_results))
        .route("/research/sessions/{id}/cancel", post(rest::cancel_session))
        // Scoring
        .route("/scores/calculate", post(rest::calculate_scores))
        .route("/scores/{companyId}/history", get(rest::score_history))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(addr = addr.as_str(), "API server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
