use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Request / Result Types
// =============================================================================

/// One rendered research query, ready for the provider.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// System framing for the provider (what role it plays).
    pub system: String,
    /// The rendered query text.
    pub query: String,
}

impl QueryRequest {
    pub fn new(system: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            query: query.into(),
        }
    }
}

/// Provider output for a single query, with usage accounting.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub content: String,
    pub citations: Vec<String>,
    /// Provider self-reported answer confidence, 0.0-1.0.
    pub confidence: f64,
    /// Actual cost if the provider reports usage, otherwise None and the
    /// caller falls back to its estimate.
    pub cost_usd: Option<f64>,
    pub tokens_used: u64,
}

// =============================================================================
// QueryExecutor Trait
// =============================================================================

/// The external query-execution collaborator. The orchestrator only sees
/// this seam, so tests drive it with a scripted stub.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult>;
}
