use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Company Input ---

/// Summary of one linked code repository.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RepoSummary {
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
}

/// Summary of one linked model-hub model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelSummary {
    pub downloads: u64,
    pub likes: u64,
    pub task: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FundingStage {
    Bootstrapped,
    PreSeed,
    Seed,
    SeriesA,
    SeriesBPlus,
}

impl std::fmt::Display for FundingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundingStage::Bootstrapped => write!(f, "bootstrapped"),
            FundingStage::PreSeed => write!(f, "pre_seed"),
            FundingStage::Seed => write!(f, "seed"),
            FundingStage::SeriesA => write!(f, "series_a"),
            FundingStage::SeriesBPlus => write!(f, "series_b_plus"),
        }
    }
}

/// Normalized company snapshot produced by the ingestion jobs.
/// Immutable input to the scorer; never mutated here.
/// Wire format is camelCase end to end, matching the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyData {
    pub id: String,
    pub name: String,
    /// Cohort/batch label as ingested (e.g. "W23" or "Winter 2023").
    pub batch: Option<String>,
    pub launched_at: Option<DateTime<Utc>>,
    pub is_hiring: Option<bool>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    #[serde(default)]
    pub repos: Vec<RepoSummary>,
    #[serde(default)]
    pub models: Vec<ModelSummary>,
    pub funding_stage: Option<FundingStage>,
    pub team_size: Option<u32>,
}

// --- Scoring Output ---

/// One named scoring dimension with its own evaluator and weight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    TargetBatch,
    CompanyAge,
    GithubActivity,
    HuggingfaceActivity,
    DomainFocus,
    HiringStatus,
    FundingStage,
    ConferencePresence,
    NameQuality,
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::TargetBatch => write!(f, "target_batch"),
            Criterion::CompanyAge => write!(f, "company_age"),
            Criterion::GithubActivity => write!(f, "github_activity"),
            Criterion::HuggingfaceActivity => write!(f, "huggingface_activity"),
            Criterion::DomainFocus => write!(f, "domain_focus"),
            Criterion::HiringStatus => write!(f, "hiring_status"),
            Criterion::FundingStage => write!(f, "funding_stage"),
            Criterion::ConferencePresence => write!(f, "conference_presence"),
            Criterion::NameQuality => write!(f, "name_quality"),
        }
    }
}

/// Data-quality notes attached to a score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMetadata {
    /// Raw fields that were absent from the input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_data_points: Vec<String>,
    /// Evaluators that fell back to a default/neutral value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approximations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of one scoring pass. Append-only history per company; the
/// company's "current" score is a pointer to the latest row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub company_id: String,
    /// Confidence-independent weighted sum, 0-10.
    pub total_score: f64,
    /// round(total_score * 10), 0-100.
    pub normalized_score: u32,
    pub breakdown: BTreeMap<Criterion, f64>,
    /// 0.0-1.0, reduced for each missing/approximated input.
    pub confidence: f64,
    pub algorithm_version: String,
    pub metadata: ScoreMetadata,
    pub calculated_at: DateTime<Utc>,
}

// --- Research Session ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states are absorbing: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Processing => write!(f, "processing"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SessionStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Processing,
        }
    }
}

/// One bounded execution of a set of research queries for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSession {
    pub id: Uuid,
    pub company_id: String,
    pub owner_id: String,
    pub template_ids: Vec<u32>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_cost_usd: f64,
    pub tokens_used: u64,
    pub completed_query_count: u32,
    pub total_query_count: u32,
    /// Set when the session timed out but enough queries completed to
    /// synthesize partial findings.
    pub partial: bool,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// --- Research Findings ---

/// Category a research template (and its findings) belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    CompanyOverview,
    Founders,
    Funding,
    Market,
    Competitors,
    Technology,
    Hiring,
    Outreach,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingType::CompanyOverview => write!(f, "company_overview"),
            FindingType::Founders => write!(f, "founders"),
            FindingType::Funding => write!(f, "funding"),
            FindingType::Market => write!(f, "market"),
            FindingType::Competitors => write!(f, "competitors"),
            FindingType::Technology => write!(f, "technology"),
            FindingType::Hiring => write!(f, "hiring"),
            FindingType::Outreach => write!(f, "outreach"),
        }
    }
}

impl FindingType {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "founders" => Self::Founders,
            "funding" => Self::Funding,
            "market" => Self::Market,
            "competitors" => Self::Competitors,
            "technology" => Self::Technology,
            "hiring" => Self::Hiring,
            "outreach" => Self::Outreach,
            _ => Self::CompanyOverview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityLevel::Low => write!(f, "low"),
            PriorityLevel::Medium => write!(f, "medium"),
            PriorityLevel::High => write!(f, "high"),
        }
    }
}

/// A synthesized, deduplicated unit of research output.
/// Owned by exactly one session; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchFinding {
    pub id: Uuid,
    pub session_id: Uuid,
    pub finding_type: FindingType,
    pub title: String,
    pub content: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub citations: Vec<String>,
    pub priority_level: PriorityLevel,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// --- Raw Query Output ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Succeeded,
    Failed,
    /// Skipped before dispatch because the projected spend would exceed the
    /// session budget. Never fails the session.
    BudgetSkipped,
    /// Skipped because the session deadline fired or a cancel was requested
    /// before dispatch.
    TimeoutSkipped,
}

/// Raw output of one research query, before synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub template_id: u32,
    pub finding_type: FindingType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<String>,
    pub confidence: f64,
    pub cost_usd: f64,
    pub tokens_used: u64,
    pub status: QueryStatus,
}

impl QueryOutput {
    /// A placeholder output for a query that never produced content.
    pub fn unresolved(template_id: u32, finding_type: FindingType, status: QueryStatus) -> Self {
        Self {
            template_id,
            finding_type,
            title: String::new(),
            content: String::new(),
            citations: Vec::new(),
            confidence: 0.0,
            cost_usd: 0.0,
            tokens_used: 0,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
    }

    #[test]
    fn session_status_round_trips_through_display() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Processing,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(SessionStatus::from_str_loose(&status.to_string()), status);
        }
    }

    #[test]
    fn finding_type_serializes_snake_case() {
        let json = serde_json::to_string(&FindingType::CompanyOverview).unwrap();
        assert_eq!(json, "\"company_overview\"");
    }

    #[test]
    fn company_data_defaults_empty_collections() {
        let c: CompanyData =
            serde_json::from_str(r#"{"id":"c1","name":"Acme"}"#).unwrap();
        assert!(c.repos.is_empty());
        assert!(c.models.is_empty());
        assert!(c.batch.is_none());
    }

    #[test]
    fn wire_types_use_camel_case_fields() {
        let c: CompanyData = serde_json::from_str(
            r#"{"id":"c1","name":"Acme","isHiring":true,"teamSize":12}"#,
        )
        .unwrap();
        assert_eq!(c.is_hiring, Some(true));
        assert_eq!(c.team_size, Some(12));

        let session = ResearchSession {
            id: Uuid::new_v4(),
            company_id: "c1".to_string(),
            owner_id: "u1".to_string(),
            template_ids: vec![1],
            status: SessionStatus::Processing,
            started_at: Utc::now(),
            completed_at: None,
            total_cost_usd: 0.0,
            tokens_used: 0,
            completed_query_count: 0,
            total_query_count: 1,
            partial: false,
            error: None,
            warnings: vec![],
        };
        let v = serde_json::to_value(&session).unwrap();
        assert!(v.get("completedQueryCount").is_some());
        assert!(v.get("totalCostUsd").is_some());
        assert!(v.get("completed_query_count").is_none());
    }
}
