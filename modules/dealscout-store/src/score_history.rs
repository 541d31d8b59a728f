use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use dealscout_common::ScoreResult;

// ---------------------------------------------------------------------------
// Score history adapter
// ---------------------------------------------------------------------------

/// Append-only `score_history` rows keyed by (company_id, calculated_at),
/// plus the denormalized `companies.current_score` pointer to the latest row.
#[derive(Clone)]
pub struct ScoreStore {
    pool: PgPool,
}

impl ScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one history row and move the company's current-score pointer.
    /// History rows are never edited.
    pub async fn save(&self, result: &ScoreResult) -> Result<()> {
        let breakdown = serde_json::to_value(&result.breakdown)?;
        let metadata = serde_json::to_value(&result.metadata)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO score_history
                (company_id, calculated_at, total_score, normalized_score,
                 breakdown, confidence, algorithm_version, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&result.company_id)
        .bind(result.calculated_at)
        .bind(result.total_score)
        .bind(result.normalized_score as i32)
        .bind(&breakdown)
        .bind(result.confidence)
        .bind(&result.algorithm_version)
        .bind(&metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE companies
            SET current_score = $2, current_score_at = $3
            WHERE id = $1
            "#,
        )
        .bind(&result.company_id)
        .bind(result.total_score)
        .bind(result.calculated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persist a batch of results. Individual failures are logged and
    /// reported back, not fatal for the rest of the batch.
    pub async fn save_batch(&self, results: &[ScoreResult]) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for result in results {
            if let Err(e) = self.save(result).await {
                warn!(company_id = result.company_id.as_str(), error = %e, "Score save failed");
                failed.push(result.company_id.clone());
            }
        }
        Ok(failed)
    }

    /// Score history for one company, most recent first.
    pub async fn history(
        &self,
        company_id: &str,
        limit: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScoreResult>> {
        let limit = limit.min(200) as i64;

        let rows = sqlx::query_as::<
            _,
            (
                String,
                DateTime<Utc>,
                f64,
                i32,
                serde_json::Value,
                f64,
                String,
                serde_json::Value,
            ),
        >(
            r#"
            SELECT company_id, calculated_at, total_score, normalized_score,
                   breakdown, confidence, algorithm_version, metadata
            FROM score_history
            WHERE company_id = $1
              AND ($2::timestamptz IS NULL OR calculated_at >= $2)
              AND ($3::timestamptz IS NULL OR calculated_at <= $3)
            ORDER BY calculated_at DESC
            LIMIT $4
            "#,
        )
        .bind(company_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_score).collect())
    }

    /// Companies whose current score predates `stale_before` or was computed
    /// with a different algorithm version.
    pub async fn companies_needing_recalculation(
        &self,
        algorithm_version: &str,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<String>> {
        let limit = limit.min(500) as i64;

        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT c.id
            FROM companies c
            LEFT JOIN LATERAL (
                SELECT algorithm_version, calculated_at
                FROM score_history
                WHERE company_id = c.id
                ORDER BY calculated_at DESC
                LIMIT 1
            ) latest ON TRUE
            WHERE latest.calculated_at IS NULL
               OR latest.calculated_at < $1
               OR latest.algorithm_version <> $2
            LIMIT $3
            "#,
        )
        .bind(stale_before)
        .bind(algorithm_version)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn row_to_score(
    r: (
        String,
        DateTime<Utc>,
        f64,
        i32,
        serde_json::Value,
        f64,
        String,
        serde_json::Value,
    ),
) -> ScoreResult {
    ScoreResult {
        company_id: r.0,
        calculated_at: r.1,
        total_score: r.2,
        normalized_score: r.3.max(0) as u32,
        breakdown: serde_json::from_value(r.4).unwrap_or_default(),
        confidence: r.5,
        algorithm_version: r.6,
        metadata: serde_json::from_value(r.7).unwrap_or_default(),
    }
}
