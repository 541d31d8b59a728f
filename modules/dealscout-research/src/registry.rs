use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use dealscout_common::{QueryOutput, QueryStatus, ResearchFinding, ResearchSession, SessionStatus};

/// In-process progress tracker for research sessions.
///
/// The outer map lock is only held to look entries up; all session mutation
/// happens behind the per-session lock, so reading one session's snapshot
/// never contends with another session's writers.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
}

pub struct SessionEntry {
    state: RwLock<SessionState>,
    cancel: AtomicBool,
}

struct SessionState {
    session: ResearchSession,
    raw_outputs: Vec<QueryOutput>,
    findings: Vec<ResearchFinding>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, session: ResearchSession) -> Arc<SessionEntry> {
        let entry = Arc::new(SessionEntry {
            state: RwLock::new(SessionState {
                session,
                raw_outputs: Vec::new(),
                findings: Vec::new(),
            }),
            cancel: AtomicBool::new(false),
        });
        let id = entry.state.read().await.session.id;
        self.sessions.write().await.insert(id, entry.clone());
        entry
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<ResearchSession> {
        let entry = self.get(id).await?;
        let state = entry.state.read().await;
        Some(state.session.clone())
    }

    /// Findings grouped with the session status, for the results endpoint.
    pub async fn results(
        &self,
        id: Uuid,
    ) -> Option<(SessionStatus, Vec<ResearchFinding>, Vec<QueryOutput>)> {
        let entry = self.get(id).await?;
        let state = entry.state.read().await;
        Some((
            state.session.status,
            state.findings.clone(),
            state.raw_outputs.clone(),
        ))
    }

    /// Request cooperative cancellation. Workers observe the flag between
    /// retry attempts; the driver finalizes the terminal state at the join.
    pub async fn request_cancel(&self, id: Uuid) -> bool {
        match self.get(id).await {
            Some(entry) => {
                entry.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl SessionEntry {
    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> ResearchSession {
        self.state.read().await.session.clone()
    }

    /// pending → processing. Ignored once terminal.
    pub async fn mark_processing(&self) {
        let mut state = self.state.write().await;
        if state.session.status.is_terminal() {
            return;
        }
        state.session.status = SessionStatus::Processing;
    }

    /// Record one fully resolved query. Cost/token totals and the completed
    /// counter are only ever touched here, under the session write lock, so
    /// concurrent workers cannot lose updates.
    pub async fn record_resolved(&self, output: QueryOutput) {
        let mut state = self.state.write().await;
        if output.status == QueryStatus::Succeeded {
            state.session.total_cost_usd += output.cost_usd;
            state.session.tokens_used += output.tokens_used;
            state.session.completed_query_count += 1;
        }
        state.raw_outputs.push(output);
    }

    pub async fn raw_outputs(&self) -> Vec<QueryOutput> {
        self.state.read().await.raw_outputs.clone()
    }

    pub async fn findings(&self) -> Vec<ResearchFinding> {
        self.state.read().await.findings.clone()
    }

    pub async fn set_findings(&self, findings: Vec<ResearchFinding>) {
        let mut state = self.state.write().await;
        state.findings = findings;
    }

    pub async fn add_warning(&self, warning: impl Into<String>) {
        let mut state = self.state.write().await;
        state.session.warnings.push(warning.into());
    }

    /// Transition to a terminal state. Returns false (and changes nothing)
    /// if the session is already terminal; transitions are monotonic.
    pub async fn finish(
        &self,
        status: SessionStatus,
        partial: bool,
        error: Option<String>,
    ) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state.write().await;
        if state.session.status.is_terminal() {
            warn!(
                session_id = %state.session.id,
                current = %state.session.status,
                attempted = %status,
                "Ignoring transition out of terminal state"
            );
            return false;
        }
        state.session.status = status;
        state.session.partial = partial;
        state.session.error = error;
        state.session.completed_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_common::FindingType;

    fn session(id: Uuid) -> ResearchSession {
        ResearchSession {
            id,
            company_id: "c1".to_string(),
            owner_id: "u1".to_string(),
            template_ids: vec![1, 2],
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            total_cost_usd: 0.0,
            tokens_used: 0,
            completed_query_count: 0,
            total_query_count: 2,
            partial: false,
            error: None,
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_progress() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(session(id)).await;

        entry.mark_processing().await;
        entry
            .record_resolved(QueryOutput {
                template_id: 1,
                finding_type: FindingType::Funding,
                title: "Funding".to_string(),
                content: "Raised a seed round".to_string(),
                citations: vec![],
                confidence: 0.8,
                cost_usd: 0.02,
                tokens_used: 500,
                status: QueryStatus::Succeeded,
            })
            .await;

        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, SessionStatus::Processing);
        assert_eq!(snap.completed_query_count, 1);
        assert_eq!(snap.tokens_used, 500);
        assert!((snap.total_cost_usd - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn skipped_queries_do_not_count_as_completed() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(session(id)).await;

        entry
            .record_resolved(QueryOutput::unresolved(
                1,
                FindingType::Funding,
                QueryStatus::BudgetSkipped,
            ))
            .await;

        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.completed_query_count, 0);
    }

    #[tokio::test]
    async fn terminal_states_are_absorbing() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(session(id)).await;

        assert!(entry.finish(SessionStatus::Completed, false, None).await);
        assert!(!entry.finish(SessionStatus::Failed, false, None).await);
        assert!(!entry.finish(SessionStatus::Cancelled, false, None).await);

        // mark_processing after terminal is a no-op.
        entry.mark_processing().await;
        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, SessionStatus::Completed);
        assert!(snap.completed_at.is_some());
    }

    #[tokio::test]
    async fn warnings_recorded_after_finish_appear_in_snapshot() {
        // Late bookkeeping (e.g. a failed findings write) must still surface.
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(session(id)).await;

        assert!(entry.finish(SessionStatus::Completed, false, None).await);
        entry.add_warning("findings could not be persisted").await;

        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.status, SessionStatus::Completed);
        assert_eq!(snap.warnings, vec!["findings could not be persisted".to_string()]);
    }

    #[tokio::test]
    async fn cancel_flag_visible_to_entry() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let entry = registry.create(session(id)).await;
        assert!(!entry.cancel_requested());
        assert!(registry.request_cancel(id).await);
        assert!(entry.cancel_requested());
        assert!(!registry.request_cancel(Uuid::new_v4()).await);
    }
}
