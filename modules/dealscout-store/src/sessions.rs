use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealscout_common::{ResearchSession, SessionStatus};

// ---------------------------------------------------------------------------
// Research session adapter
// ---------------------------------------------------------------------------

/// `research_sessions` rows keyed by session id. Status updates are guarded
/// so a terminal row can never move back to a live state.
#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, session: &ResearchSession) -> Result<()> {
        let template_ids: Vec<i32> = session.template_ids.iter().map(|id| *id as i32).collect();

        sqlx::query(
            r#"
            INSERT INTO research_sessions
                (id, company_id, owner_id, template_ids, status, started_at,
                 completed_at, total_cost_usd, tokens_used,
                 completed_query_count, total_query_count, partial, error, warnings)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(session.id)
        .bind(&session.company_id)
        .bind(&session.owner_id)
        .bind(&template_ids)
        .bind(session.status.to_string())
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(session.total_cost_usd)
        .bind(session.tokens_used as i64)
        .bind(session.completed_query_count as i32)
        .bind(session.total_query_count as i32)
        .bind(session.partial)
        .bind(&session.error)
        .bind(&session.warnings)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrite the mutable state-machine fields. The WHERE guard keeps
    /// terminal rows terminal even if a stale writer races the update.
    pub async fn update(&self, session: &ResearchSession) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_sessions
            SET status = $2, completed_at = $3, total_cost_usd = $4,
                tokens_used = $5, completed_query_count = $6,
                partial = $7, error = $8, warnings = $9
            WHERE id = $1
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(session.id)
        .bind(session.status.to_string())
        .bind(session.completed_at)
        .bind(session.total_cost_usd)
        .bind(session.tokens_used as i64)
        .bind(session.completed_query_count as i32)
        .bind(session.partial)
        .bind(&session.error)
        .bind(&session.warnings)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ResearchSession>> {
        let row = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                String,
                Vec<i32>,
                String,
                DateTime<Utc>,
                Option<DateTime<Utc>>,
                f64,
                i64,
                i32,
                i32,
                bool,
                Option<String>,
                Vec<String>,
            ),
        >(
            r#"
            SELECT id, company_id, owner_id, template_ids, status, started_at,
                   completed_at, total_cost_usd, tokens_used,
                   completed_query_count, total_query_count, partial, error, warnings
            FROM research_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ResearchSession {
            id: r.0,
            company_id: r.1,
            owner_id: r.2,
            template_ids: r.3.into_iter().map(|id| id.max(0) as u32).collect(),
            status: SessionStatus::from_str_loose(&r.4),
            started_at: r.5,
            completed_at: r.6,
            total_cost_usd: r.7,
            tokens_used: r.8.max(0) as u64,
            completed_query_count: r.9.max(0) as u32,
            total_query_count: r.10.max(0) as u32,
            partial: r.11,
            error: r.12,
            warnings: r.13,
        }))
    }
}
