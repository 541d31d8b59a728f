use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealscout_common::{FindingType, PriorityLevel, ResearchFinding};

// ---------------------------------------------------------------------------
// Research finding adapter
// ---------------------------------------------------------------------------

/// `research_findings` rows, foreign-keyed to their session. Immutable after
/// insert.
#[derive(Clone)]
pub struct FindingStore {
    pool: PgPool,
}

impl FindingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_batch(&self, findings: &[ResearchFinding]) -> Result<()> {
        for finding in findings {
            sqlx::query(
                r#"
                INSERT INTO research_findings
                    (id, session_id, finding_type, title, content,
                     confidence_score, citations, priority_level, tags, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(finding.id)
            .bind(finding.session_id)
            .bind(finding.finding_type.to_string())
            .bind(&finding.title)
            .bind(&finding.content)
            .bind(finding.confidence_score)
            .bind(&finding.citations)
            .bind(finding.priority_level.to_string())
            .bind(&finding.tags)
            .bind(finding.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<ResearchFinding>> {
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                String,
                String,
                String,
                f64,
                Vec<String>,
                String,
                Vec<String>,
                DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, session_id, finding_type, title, content,
                   confidence_score, citations, priority_level, tags, created_at
            FROM research_findings
            WHERE session_id = $1
            ORDER BY finding_type, confidence_score DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_finding).collect())
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn row_to_finding(
    r: (
        Uuid,
        Uuid,
        String,
        String,
        String,
        f64,
        Vec<String>,
        String,
        Vec<String>,
        DateTime<Utc>,
    ),
) -> ResearchFinding {
    ResearchFinding {
        id: r.0,
        session_id: r.1,
        finding_type: FindingType::from_str_loose(&r.2),
        title: r.3,
        content: r.4,
        confidence_score: r.5,
        citations: r.6,
        priority_level: match r.7.as_str() {
            "high" => PriorityLevel::High,
            "low" => PriorityLevel::Low,
            _ => PriorityLevel::Medium,
        },
        tags: r.8,
        created_at: r.9,
    }
}
