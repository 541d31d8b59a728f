use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use dealscout_common::{
    CompanyData, DealScoutError, ErrorKind, QueryOutput, QueryStatus, ResearchFinding,
    ScoreResult, SessionStatus,
};
use dealscout_research::{templates_for_research_type, CompanyRef, SessionConfig};

use crate::AppState;

// Session defaults applied when the caller sends no config block.
const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 3;
const DEFAULT_MAX_COST_USD: f64 = 0.50;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

// --- Envelope ---

fn envelope_ok(status: StatusCode, data: serde_json::Value) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": true,
            "data": data,
            "metadata": { "timestamp": Utc::now() },
        })),
    )
        .into_response()
}

fn envelope_error(status: StatusCode, kind: ErrorKind, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": message,
            "errorKind": kind.as_str(),
            "metadata": { "timestamp": Utc::now() },
        })),
    )
        .into_response()
}

fn envelope_from(err: &DealScoutError) -> Response {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    envelope_error(status, err.kind(), &err.to_string())
}

fn parse_session_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        envelope_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "session id must be a UUID",
        )
    })
}

// --- Request bodies ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    company_id: String,
    owner_id: String,
    #[serde(default)]
    research_type: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    company_description: Option<String>,
    #[serde(default)]
    config: Option<SessionConfigOverrides>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigOverrides {
    template_ids: Option<Vec<u32>>,
    max_concurrent_queries: Option<usize>,
    max_cost_usd: Option<f64>,
    timeout_ms: Option<u64>,
    enable_synthesis: Option<bool>,
    save_to_database: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    company: Option<CompanyData>,
    companies: Option<Vec<CompanyData>>,
    #[serde(default)]
    save_to_database: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    limit: Option<u32>,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
}

// --- Research handlers ---

/// 202-style acceptance: allocates the session and returns without waiting
/// for any query to run.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    let overrides = req.config.unwrap_or_default();
    let template_ids = overrides.template_ids.unwrap_or_else(|| {
        templates_for_research_type(req.research_type.as_deref().unwrap_or(""))
    });

    let config = SessionConfig {
        template_ids,
        max_concurrent_queries: overrides
            .max_concurrent_queries
            .unwrap_or(DEFAULT_MAX_CONCURRENT_QUERIES),
        max_cost_usd: overrides.max_cost_usd.unwrap_or(DEFAULT_MAX_COST_USD),
        timeout_ms: overrides.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        enable_synthesis: overrides.enable_synthesis.unwrap_or(true),
        save_to_database: overrides.save_to_database.unwrap_or(true),
    };

    let company = CompanyRef {
        name: req.company_name.clone().unwrap_or_else(|| req.company_id.clone()),
        id: req.company_id,
        description: req.company_description,
    };

    match state.orchestrator.start_session(company, &req.owner_id, config).await {
        Ok(session_id) => envelope_ok(
            StatusCode::ACCEPTED,
            serde_json::json!({ "sessionId": session_id, "status": "processing" }),
        ),
        Err(e) => envelope_from(&e),
    }
}

pub async fn session_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.orchestrator.get_progress(id).await {
        Ok(session) => match serde_json::to_value(&session) {
            Ok(data) => envelope_ok(StatusCode::OK, data),
            Err(e) => envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal,
                &e.to_string(),
            ),
        },
        Err(e) => envelope_from(&e),
    }
}

/// Findings grouped by category once the session is terminal; 202 while it
/// is still running, never partial data.
pub async fn session_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Some((status, findings, raw)) = state.orchestrator.registry().results(id).await {
        return results_response(status, &findings, &raw);
    }

    // Sessions from an earlier process live only in the store.
    match state.sessions.find_by_id(id).await {
        Ok(Some(session)) if session.status.is_terminal() => {
            match state.findings.list_by_session(id).await {
                Ok(findings) => results_response(session.status, &findings, &[]),
                Err(e) => envelope_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Persistence,
                    &e.to_string(),
                ),
            }
        }
        Ok(Some(session)) => results_response(session.status, &[], &[]),
        Ok(None) => envelope_error(
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound,
            &format!("session {id}"),
        ),
        Err(e) => envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Persistence,
            &e.to_string(),
        ),
    }
}

/// A non-terminal session yields a 202 "not ready" body with no finding data;
/// terminal sessions get their findings grouped by category (raw successful
/// outputs when synthesis was disabled).
fn results_response(
    status: SessionStatus,
    findings: &[ResearchFinding],
    raw: &[QueryOutput],
) -> Response {
    if !status.is_terminal() {
        return envelope_ok(
            StatusCode::ACCEPTED,
            serde_json::json!({ "status": status.to_string() }),
        );
    }
    let grouped = if findings.is_empty() {
        group_raw_outputs(raw)
    } else {
        group_findings(findings)
    };
    envelope_ok(
        StatusCode::OK,
        serde_json::json!({ "status": status.to_string(), "findings": grouped }),
    )
}

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.orchestrator.cancel(id).await {
        Ok(()) => envelope_ok(
            StatusCode::OK,
            serde_json::json!({ "sessionId": id, "status": "cancelling" }),
        ),
        Err(e) => envelope_from(&e),
    }
}

fn group_findings(findings: &[ResearchFinding]) -> BTreeMap<String, Vec<serde_json::Value>> {
    let mut grouped: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for finding in findings {
        grouped
            .entry(finding.finding_type.to_string())
            .or_default()
            .push(serde_json::to_value(finding).unwrap_or_default());
    }
    grouped
}

fn group_raw_outputs(raw: &[QueryOutput]) -> BTreeMap<String, Vec<serde_json::Value>> {
    let mut grouped: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for output in raw {
        if output.status != QueryStatus::Succeeded {
            continue;
        }
        grouped
            .entry(output.finding_type.to_string())
            .or_default()
            .push(serde_json::to_value(output).unwrap_or_default());
    }
    grouped
}

// --- Scoring handlers ---

pub async fn score_history(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Response {
    let limit = params.limit.unwrap_or(50);
    match state
        .scores
        .history(&company_id, limit, params.from_date, params.to_date)
        .await
    {
        Ok(history) => envelope_ok(
            StatusCode::OK,
            serde_json::to_value(&history).unwrap_or_default(),
        ),
        Err(e) => {
            warn!(company_id = company_id.as_str(), error = %e, "Score history lookup failed");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Persistence,
                &e.to_string(),
            )
        }
    }
}

/// Score one company or a batch. Persistence failures degrade to a warning
/// on the result; a computed score is never silently lost.
pub async fn calculate_scores(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CalculateRequest>,
) -> Response {
    match (req.company, req.companies) {
        (Some(company), None) => {
            match score_one(&state, &company, req.save_to_database).await {
                Ok(result) => envelope_ok(
                    StatusCode::OK,
                    serde_json::to_value(&result).unwrap_or_default(),
                ),
                Err(e) => envelope_from(&e),
            }
        }
        (None, Some(companies)) => {
            if companies.is_empty() {
                return envelope_error(
                    StatusCode::BAD_REQUEST,
                    ErrorKind::Validation,
                    "companies must not be empty",
                );
            }
            let mut results = Vec::with_capacity(companies.len());
            for company in &companies {
                match state.engine.score(company) {
                    Ok(result) => results.push(result),
                    Err(e) => return envelope_from(&e),
                }
            }
            if req.save_to_database {
                match state.scores.save_batch(&results).await {
                    Ok(failed) => {
                        for result in results.iter_mut().filter(|r| failed.contains(&r.company_id)) {
                            result.metadata.warnings.push(
                                "score could not be persisted; returned from memory only"
                                    .to_string(),
                            );
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Batch score save failed");
                        for result in results.iter_mut() {
                            result.metadata.warnings.push(
                                "score could not be persisted; returned from memory only"
                                    .to_string(),
                            );
                        }
                    }
                }
            }
            envelope_ok(
                StatusCode::OK,
                serde_json::to_value(&results).unwrap_or_default(),
            )
        }
        _ => envelope_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "provide exactly one of `company` or `companies`",
        ),
    }
}

async fn score_one(
    state: &AppState,
    company: &CompanyData,
    save: bool,
) -> Result<ScoreResult, DealScoutError> {
    let mut result = state.engine.score(company)?;
    if save {
        if let Err(e) = state.scores.save(&result).await {
            warn!(company_id = company.id.as_str(), error = %e, "Score save failed");
            result
                .metadata
                .warnings
                .push("score could not be persisted; returned from memory only".to_string());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_common::{FindingType, PriorityLevel};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn finding(finding_type: FindingType) -> ResearchFinding {
        ResearchFinding {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            finding_type,
            title: "title".to_string(),
            content: "content".to_string(),
            confidence_score: 0.8,
            citations: vec![],
            priority_level: PriorityLevel::High,
            tags: vec![finding_type.to_string()],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn results_before_terminal_state_are_not_ready() {
        for status in [SessionStatus::Pending, SessionStatus::Processing] {
            // Even queued-up findings must not leak out early.
            let response = results_response(status, &[finding(FindingType::Funding)], &[]);
            assert_eq!(response.status(), StatusCode::ACCEPTED);

            let body = body_json(response).await;
            assert_eq!(body["success"], serde_json::json!(true));
            assert_eq!(body["data"]["status"], status.to_string());
            assert!(body["data"].get("findings").is_none());
        }
    }

    #[tokio::test]
    async fn terminal_results_group_findings_by_category() {
        let findings = vec![
            finding(FindingType::Funding),
            finding(FindingType::Funding),
            finding(FindingType::Market),
        ];
        let response = results_response(SessionStatus::Completed, &findings, &[]);
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["findings"]["funding"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["findings"]["market"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_results_without_findings_fall_back_to_raw_outputs() {
        let raw = vec![
            QueryOutput {
                template_id: 1,
                finding_type: FindingType::Hiring,
                title: "Hiring signals".to_string(),
                content: "Hiring two engineers".to_string(),
                citations: vec![],
                confidence: 0.7,
                cost_usd: 0.02,
                tokens_used: 100,
                status: QueryStatus::Succeeded,
            },
            QueryOutput::unresolved(2, FindingType::Market, QueryStatus::BudgetSkipped),
        ];
        let response = results_response(SessionStatus::Completed, &[], &raw);
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["findings"]["hiring"].as_array().unwrap().len(), 1);
        assert!(body["data"]["findings"].get("market").is_none());
    }
}
