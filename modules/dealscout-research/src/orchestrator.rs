use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use dealscout_common::{
    DealScoutError, QueryOutput, QueryStatus, ResearchSession, SessionStatus,
};
use dealscout_store::{FindingStore, SessionStore};
use research_client::QueryExecutor;

use crate::budget::BudgetTracker;
use crate::registry::{SessionEntry, SessionRegistry};
use crate::synthesizer;
use crate::templates::{template_by_id, ResearchTemplate};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// Retries after the first attempt. A single query exhausting its retries
/// never fails the session.
const MAX_QUERY_RETRIES: u32 = 2;

/// The company fields the templates need. Resolved by the caller; the
/// orchestrator never reads the company store itself.
#[derive(Debug, Clone)]
pub struct CompanyRef {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Per-session execution configuration. All fields required, no implicit
/// defaults beyond what the API layer resolves from the research type.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub template_ids: Vec<u32>,
    pub max_concurrent_queries: usize,
    pub max_cost_usd: f64,
    pub timeout_ms: u64,
    pub enable_synthesis: bool,
    pub save_to_database: bool,
}

#[derive(Clone)]
pub struct Persistence {
    pub sessions: SessionStore,
    pub findings: FindingStore,
}

/// Drives research sessions: fan-out with bounded parallelism, budget and
/// deadline enforcement, retry with backoff, synthesis, persistence.
///
/// Fire-and-forget by contract: `start_session` allocates a pending session
/// and returns; a spawned task drives it to a terminal state while callers
/// poll `get_progress`.
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    executor: Arc<dyn QueryExecutor>,
    persistence: Option<Persistence>,
    query_timeout: Duration,
    retry_backoff: Duration,
}

impl Orchestrator {
    pub fn new(registry: Arc<SessionRegistry>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            registry,
            executor,
            persistence: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Shorten the per-query timeout and retry backoff (test runs).
    pub fn with_timings(mut self, query_timeout: Duration, retry_backoff: Duration) -> Self {
        self.query_timeout = query_timeout;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Allocate a session and kick off its driver task. Returns immediately
    /// with the new session id; only configuration errors fail here.
    pub async fn start_session(
        self: &Arc<Self>,
        company: CompanyRef,
        owner_id: &str,
        config: SessionConfig,
    ) -> Result<Uuid, DealScoutError> {
        if company.id.trim().is_empty() {
            return Err(DealScoutError::Validation("company id must not be empty".into()));
        }
        if owner_id.trim().is_empty() {
            return Err(DealScoutError::Validation("owner id must not be empty".into()));
        }
        if config.max_concurrent_queries == 0 {
            return Err(DealScoutError::Validation(
                "max_concurrent_queries must be positive".into(),
            ));
        }
        if config.max_cost_usd <= 0.0 {
            return Err(DealScoutError::Validation("max_cost_usd must be positive".into()));
        }
        if config.timeout_ms == 0 {
            return Err(DealScoutError::Validation("timeout_ms must be positive".into()));
        }
        if config.template_ids.is_empty() {
            return Err(DealScoutError::Validation("template_ids must not be empty".into()));
        }

        // No template id executes twice within one session.
        let mut seen = HashSet::new();
        let mut templates: Vec<&'static ResearchTemplate> = Vec::new();
        for id in &config.template_ids {
            if !seen.insert(*id) {
                continue;
            }
            let template = template_by_id(*id).ok_or_else(|| {
                DealScoutError::Validation(format!("unknown template id {id}"))
            })?;
            templates.push(template);
        }

        let session = ResearchSession {
            id: Uuid::new_v4(),
            company_id: company.id.clone(),
            owner_id: owner_id.to_string(),
            template_ids: templates.iter().map(|t| t.id).collect(),
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            total_cost_usd: 0.0,
            tokens_used: 0,
            completed_query_count: 0,
            total_query_count: templates.len() as u32,
            partial: false,
            error: None,
            warnings: Vec::new(),
        };
        let session_id = session.id;

        let entry = self.registry.create(session.clone()).await;

        if config.save_to_database {
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.sessions.insert(&session).await {
                    // In-memory progress still works; surface the gap.
                    warn!(session_id = %session_id, error = %e, "Session insert failed");
                    entry.add_warning("session row could not be persisted at start").await;
                }
            }
        }

        info!(
            session_id = %session_id,
            company_id = company.id.as_str(),
            queries = templates.len(),
            "Research session started"
        );

        let this = self.clone();
        tokio::spawn(async move {
            this.drive(entry, company, config, templates).await;
        });

        Ok(session_id)
    }

    /// Current snapshot of a session, falling back to the store for sessions
    /// from earlier processes.
    pub async fn get_progress(&self, id: Uuid) -> Result<ResearchSession, DealScoutError> {
        if let Some(snapshot) = self.registry.snapshot(id).await {
            return Ok(snapshot);
        }
        if let Some(persistence) = &self.persistence {
            if let Some(session) = persistence
                .sessions
                .find_by_id(id)
                .await
                .map_err(|e| DealScoutError::Persistence(e.to_string()))?
            {
                return Ok(session);
            }
        }
        Err(DealScoutError::NotFound(format!("session {id}")))
    }

    /// Request cooperative cancellation of a live session.
    pub async fn cancel(&self, id: Uuid) -> Result<(), DealScoutError> {
        if self.registry.request_cancel(id).await {
            info!(session_id = %id, "Session cancellation requested");
            Ok(())
        } else {
            Err(DealScoutError::NotFound(format!("session {id}")))
        }
    }

    // --- Driver ---

    async fn drive(
        self: Arc<Self>,
        entry: Arc<SessionEntry>,
        company: CompanyRef,
        config: SessionConfig,
        templates: Vec<&'static ResearchTemplate>,
    ) {
        entry.mark_processing().await;
        self.persist_session(&entry, &config).await;

        let budget = Arc::new(BudgetTracker::new(config.max_cost_usd));
        let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);

        // Fixed-width worker pool over the template queue. The tasks are
        // built eagerly (a lazy Map adapter inside a spawned future trips the
        // FnOnce higher-ranked lifetime check). collect() is the join
        // barrier: the terminal transition below cannot happen while any
        // query is still in flight.
        let tasks: Vec<_> = templates
            .into_iter()
            .map(|template| {
                let this = self.clone();
                let entry = entry.clone();
                let budget = budget.clone();
                let company = company.clone();
                async move {
                    let output = this
                        .run_query(&entry, &budget, &company, template, deadline)
                        .await;
                    entry.record_resolved(output).await;
                }
            })
            .collect();

        stream::iter(tasks)
            .buffer_unordered(config.max_concurrent_queries)
            .collect::<Vec<()>>()
            .await;

        budget.log_status();
        self.finalize(&entry, &config, deadline).await;
    }

    async fn finalize(
        &self,
        entry: &Arc<SessionEntry>,
        config: &SessionConfig,
        deadline: Instant,
    ) {
        let outputs = entry.raw_outputs().await;
        let snapshot = entry.snapshot().await;

        let failed = outputs.iter().filter(|o| o.status == QueryStatus::Failed).count();
        if failed > 0 {
            entry
                .add_warning(format!("{failed} queries failed after exhausting retries"))
                .await;
        }
        let budget_skipped = outputs
            .iter()
            .filter(|o| o.status == QueryStatus::BudgetSkipped)
            .count();
        if budget_skipped > 0 {
            entry
                .add_warning(format!("{budget_skipped} queries skipped at the cost ceiling"))
                .await;
        }

        let cancelled = entry.cancel_requested();
        let timed_out = Instant::now() >= deadline
            || outputs.iter().any(|o| o.status == QueryStatus::TimeoutSkipped);
        let completed = snapshot.completed_query_count;

        if cancelled {
            entry
                .finish(SessionStatus::Cancelled, false, Some("cancelled by operator".into()))
                .await;
        } else if timed_out && completed == 0 {
            entry
                .finish(
                    SessionStatus::Failed,
                    false,
                    Some("session timed out before any query completed".into()),
                )
                .await;
        } else {
            if config.enable_synthesis {
                let findings = synthesizer::synthesize(snapshot.id, &outputs);
                entry.set_findings(findings).await;
            }
            // Deadline expiry with partial completion is still a success, but
            // partial only means results are actually missing. A deadline that
            // fires after the last query resolved left nothing out.
            let partial = timed_out && completed < snapshot.total_query_count;
            entry.finish(SessionStatus::Completed, partial, None).await;
        }

        let final_snapshot = entry.snapshot().await;
        info!(
            session_id = %final_snapshot.id,
            status = %final_snapshot.status,
            completed = final_snapshot.completed_query_count,
            total = final_snapshot.total_query_count,
            cost_usd = final_snapshot.total_cost_usd,
            partial = final_snapshot.partial,
            "Research session finished"
        );

        // Findings go first: the session row below is the terminal write and
        // the store refuses updates after it, so any persistence warning has
        // to be on the entry before that write.
        if config.save_to_database && final_snapshot.status == SessionStatus::Completed {
            if let Some(persistence) = &self.persistence {
                let findings = entry.findings().await;
                if !findings.is_empty() {
                    if let Err(e) = persistence.findings.insert_batch(&findings).await {
                        warn!(session_id = %final_snapshot.id, error = %e, "Finding persistence failed");
                        entry.add_warning("findings could not be persisted").await;
                    }
                }
            }
        }
        self.persist_session(entry, config).await;
    }

    /// One query: budget reservation, dispatch with per-query timeout, retry
    /// with backoff. Cancellation and the session deadline are observed
    /// between attempts, never mid-flight.
    async fn run_query(
        &self,
        entry: &Arc<SessionEntry>,
        budget: &BudgetTracker,
        company: &CompanyRef,
        template: &'static ResearchTemplate,
        deadline: Instant,
    ) -> QueryOutput {
        if entry.cancel_requested() || Instant::now() >= deadline {
            return QueryOutput::unresolved(
                template.id,
                template.category,
                QueryStatus::TimeoutSkipped,
            );
        }

        if !budget.try_reserve(template.estimated_cost_usd) {
            return QueryOutput::unresolved(
                template.id,
                template.category,
                QueryStatus::BudgetSkipped,
            );
        }

        let request = template.render(&company.name, company.description.as_deref());
        let mut attempt: u32 = 0;

        loop {
            match tokio::time::timeout(self.query_timeout, self.executor.execute(&request)).await {
                Ok(Ok(result)) => {
                    let actual = result.cost_usd.unwrap_or(template.estimated_cost_usd);
                    budget.settle(template.estimated_cost_usd, actual);
                    budget.add_tokens(result.tokens_used);
                    return QueryOutput {
                        template_id: template.id,
                        finding_type: template.category,
                        title: template.title.to_string(),
                        content: result.content,
                        citations: result.citations,
                        confidence: result.confidence,
                        cost_usd: actual,
                        tokens_used: result.tokens_used,
                        status: QueryStatus::Succeeded,
                    };
                }
                Ok(Err(e)) => {
                    warn!(template_id = template.id, attempt, error = %e, "Query failed");
                }
                Err(_) => {
                    warn!(template_id = template.id, attempt, "Query timed out");
                }
            }

            attempt += 1;
            if attempt > MAX_QUERY_RETRIES
                || entry.cancel_requested()
                || Instant::now() >= deadline
            {
                // Release the reservation: a query that produced nothing
                // must not hold budget away from later queries.
                budget.settle(template.estimated_cost_usd, 0.0);
                return QueryOutput::unresolved(
                    template.id,
                    template.category,
                    QueryStatus::Failed,
                );
            }
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }

    async fn persist_session(&self, entry: &Arc<SessionEntry>, config: &SessionConfig) {
        if !config.save_to_database {
            return;
        }
        let Some(persistence) = &self.persistence else {
            return;
        };
        let snapshot = entry.snapshot().await;
        if let Err(e) = persistence.sessions.update(&snapshot).await {
            warn!(session_id = %snapshot.id, error = %e, "Session update failed");
            entry.add_warning("session progress could not be persisted").await;
        }
    }
}
