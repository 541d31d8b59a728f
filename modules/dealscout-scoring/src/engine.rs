use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use dealscout_common::{
    CompanyData, Criterion, DealScoutError, FundingStage, ScoreMetadata, ScoreResult,
};

use crate::cohort;
use crate::weights::{
    ScoringWeights, AGE_DECAY_ABOVE_PER_MONTH, AGE_DECAY_BELOW_PER_MONTH, AGE_NEUTRAL_SCORE,
    AGE_PEAK_MAX_MONTHS, AGE_PEAK_MIN_MONTHS, ALGORITHM_VERSION, CONFIDENCE_PENALTY,
};

const AVG_DAYS_PER_MONTH: f64 = 30.44;

/// Pure multi-criterion scorer. Stateless apart from its injected immutable
/// configuration, so it is safe to share across any number of callers.
///
/// Missing or malformed optional fields never fail a scoring call; they
/// degrade confidence and show up in the result metadata. The only error is a
/// structurally invalid company (empty id).
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Result<Self, DealScoutError> {
        let sum = weights.weight_sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(DealScoutError::Config(format!(
                "criterion weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(Self { weights })
    }

    pub fn algorithm_version(&self) -> &'static str {
        ALGORITHM_VERSION
    }

    pub fn score(&self, company: &CompanyData) -> Result<ScoreResult, DealScoutError> {
        if company.id.trim().is_empty() {
            return Err(DealScoutError::Validation(
                "company id must not be empty".to_string(),
            ));
        }

        let mut meta = ScoreMetadata::default();
        let mut breakdown = BTreeMap::new();

        breakdown.insert(Criterion::TargetBatch, self.eval_target_batch(company, &mut meta));
        breakdown.insert(Criterion::CompanyAge, self.eval_company_age(company, &mut meta));
        breakdown.insert(Criterion::GithubActivity, self.eval_github(company, &mut meta));
        breakdown.insert(
            Criterion::HuggingfaceActivity,
            self.eval_huggingface(company, &mut meta),
        );
        breakdown.insert(Criterion::DomainFocus, self.eval_domain_focus(company, &mut meta));
        breakdown.insert(Criterion::HiringStatus, self.eval_hiring(company, &mut meta));
        breakdown.insert(Criterion::FundingStage, self.eval_funding(company, &mut meta));
        breakdown.insert(
            Criterion::ConferencePresence,
            self.eval_conference(company),
        );
        breakdown.insert(Criterion::NameQuality, self.eval_name_quality(company));

        let total_score: f64 = breakdown
            .iter()
            .map(|(criterion, score)| score * self.weights.weight(*criterion))
            .sum();
        let total_score = total_score.clamp(0.0, 10.0);

        let degraded = meta.missing_data_points.len() + meta.approximations.len();
        let confidence = (1.0 - degraded as f64 * CONFIDENCE_PENALTY).max(0.0);

        debug!(
            company_id = company.id.as_str(),
            total_score,
            confidence,
            "Company scored"
        );

        Ok(ScoreResult {
            company_id: company.id.clone(),
            total_score,
            normalized_score: (total_score * 10.0).round() as u32,
            breakdown,
            confidence,
            algorithm_version: ALGORITHM_VERSION.to_string(),
            metadata: meta,
            calculated_at: Utc::now(),
        })
    }

    // --- Evaluators (each maps raw data to 0..10, independently) ---

    fn eval_target_batch(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        let Some(batch) = company.batch.as_deref().filter(|b| !b.trim().is_empty()) else {
            meta.missing_data_points.push("batch".to_string());
            return 0.0;
        };
        let canonical = cohort::canonicalize(batch);
        if self.weights.target_batches.iter().any(|b| b == &canonical) {
            10.0
        } else {
            0.0
        }
    }

    fn eval_company_age(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        let Some(launched_at) = company.launched_at else {
            meta.missing_data_points.push("launched_at".to_string());
            meta.approximations.push("company_age".to_string());
            return AGE_NEUTRAL_SCORE;
        };
        let months = (Utc::now() - launched_at).num_days() as f64 / AVG_DAYS_PER_MONTH;
        if months < 0.0 {
            // Launch date in the future, treat as unknown.
            meta.approximations.push("company_age".to_string());
            return AGE_NEUTRAL_SCORE;
        }
        if months < AGE_PEAK_MIN_MONTHS {
            (10.0 - (AGE_PEAK_MIN_MONTHS - months) * AGE_DECAY_BELOW_PER_MONTH).max(0.0)
        } else if months > AGE_PEAK_MAX_MONTHS {
            (10.0 - (months - AGE_PEAK_MAX_MONTHS) * AGE_DECAY_ABOVE_PER_MONTH).max(0.0)
        } else {
            10.0
        }
    }

    fn eval_github(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        if company.repos.is_empty() {
            meta.missing_data_points.push("repos".to_string());
        }
        let stars: u64 = company.repos.iter().map(|r| r.stars).sum();
        tier_score(&self.weights.star_tiers, stars)
    }

    fn eval_huggingface(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        if company.models.is_empty() {
            meta.missing_data_points.push("models".to_string());
        }
        let downloads: u64 = company.models.iter().map(|m| m.downloads).sum();
        let base = tier_score(&self.weights.download_tiers, downloads);

        let distinct_tasks = company
            .models
            .iter()
            .filter_map(|m| m.task.as_deref())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let bonus = (distinct_tasks.saturating_sub(1) as f64 * self.weights.task_diversity_bonus)
            .min(self.weights.task_diversity_bonus_cap);

        (base + bonus).min(10.0)
    }

    fn eval_domain_focus(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        let text = description_text(company);
        if text.is_empty() {
            meta.missing_data_points.push("description".to_string());
            return 0.0;
        }
        let hits = self
            .weights
            .domain_keywords
            .iter()
            .filter(|kw| text.contains(*kw))
            .count();
        (hits as f64 * self.weights.domain_hit_increment).min(10.0)
    }

    fn eval_hiring(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        match company.is_hiring {
            Some(true) => 8.0,
            Some(false) => 4.0,
            None => {
                meta.missing_data_points.push("is_hiring".to_string());
                4.0
            }
        }
    }

    fn eval_funding(&self, company: &CompanyData, meta: &mut ScoreMetadata) -> f64 {
        match company.funding_stage {
            Some(FundingStage::PreSeed) => 8.0,
            Some(FundingStage::Seed) => 10.0,
            Some(FundingStage::Bootstrapped) => 6.0,
            Some(FundingStage::SeriesA) => 5.0,
            Some(FundingStage::SeriesBPlus) => 2.0,
            None => {
                meta.missing_data_points.push("funding_stage".to_string());
                meta.approximations.push("funding_stage".to_string());
                5.0
            }
        }
    }

    fn eval_conference(&self, company: &CompanyData) -> f64 {
        let text = description_text(company);
        if text.is_empty() {
            return self.weights.conference_baseline;
        }
        let hits = self
            .weights
            .conference_keywords
            .iter()
            .filter(|kw| text.contains(*kw))
            .count();
        if hits == 0 {
            self.weights.conference_baseline
        } else {
            (hits as f64 * self.weights.conference_hit_increment).min(10.0)
        }
    }

    fn eval_name_quality(&self, company: &CompanyData) -> f64 {
        let name = company.name.trim();
        if name.is_empty() {
            return 0.0;
        }
        let mut score = 0.0;
        if name.len() <= 10 {
            score += 4.0;
        }
        if !name.chars().any(|c| c.is_ascii_digit()) {
            score += 3.0;
        }
        if !name.contains(' ') {
            score += 3.0;
        }
        score
    }
}

/// Walk a (threshold, score) ladder, highest tier first. Zero falls through
/// to the floor score of 1.
fn tier_score(tiers: &[(u64, f64)], value: u64) -> f64 {
    for (threshold, score) in tiers {
        if value >= *threshold {
            return *score;
        }
    }
    1.0
}

/// Lowercased concatenation of short and long description text.
fn description_text(company: &CompanyData) -> String {
    let mut text = String::new();
    if let Some(d) = &company.description {
        text.push_str(d);
        text.push(' ');
    }
    if let Some(d) = &company.long_description {
        text.push_str(d);
    }
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dealscout_common::{ModelSummary, RepoSummary};

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringWeights::default()).unwrap()
    }

    fn company(id: &str) -> CompanyData {
        CompanyData {
            id: id.to_string(),
            name: "Acme".to_string(),
            batch: None,
            launched_at: None,
            is_hiring: None,
            description: None,
            long_description: None,
            repos: vec![],
            models: vec![],
            funding_stage: None,
            team_size: None,
        }
    }

    fn months_ago(months: i64) -> chrono::DateTime<Utc> {
        Utc::now() - Duration::days((months as f64 * AVG_DAYS_PER_MONTH) as i64)
    }

    #[test]
    fn empty_id_is_the_only_error() {
        let engine = engine();
        assert!(engine.score(&company("")).is_err());
        // Everything-missing company still scores.
        assert!(engine.score(&company("c1")).is_ok());
    }

    #[test]
    fn total_score_in_range_and_normalized() {
        let engine = engine();
        let mut c = company("c1");
        c.batch = Some("W23".to_string());
        c.launched_at = Some(months_ago(20));
        c.is_hiring = Some(true);
        c.repos = vec![RepoSummary { stars: 20_000, forks: 500, language: None }];
        let result = engine.score(&c).unwrap();
        assert!(result.total_score >= 0.0 && result.total_score <= 10.0);
        assert_eq!(
            result.normalized_score,
            (result.total_score * 10.0).round() as u32
        );
        for value in result.breakdown.values() {
            assert!(*value >= 0.0 && *value <= 10.0);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = engine();
        let mut c = company("c1");
        c.batch = Some("Winter 2022".to_string());
        c.launched_at = Some(months_ago(30));
        c.description = Some("Enterprise API platform".to_string());
        let a = engine.score(&c).unwrap();
        let b = engine.score(&c).unwrap();
        assert_eq!(a.total_score, b.total_score);
        assert_eq!(a.breakdown, b.breakdown);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.algorithm_version, b.algorithm_version);
    }

    #[test]
    fn repo_stars_are_monotonic() {
        let engine = engine();
        let mut previous = 0.0;
        for stars in [0u64, 50, 500, 2_000, 7_000, 15_000] {
            let mut c = company("c1");
            c.repos = vec![RepoSummary { stars, forks: 0, language: None }];
            let result = engine.score(&c).unwrap();
            let activity = result.breakdown[&Criterion::GithubActivity];
            assert!(
                activity >= previous,
                "stars {stars} scored {activity} below previous {previous}"
            );
            previous = activity;
        }
    }

    // W23 target batch, 20 months old, hiring, no repos/models.
    #[test]
    fn target_batch_scenario() {
        let engine = engine();
        let mut c = company("c1");
        c.batch = Some("W23".to_string());
        c.launched_at = Some(months_ago(20));
        c.is_hiring = Some(true);
        let result = engine.score(&c).unwrap();
        assert_eq!(result.breakdown[&Criterion::TargetBatch], 10.0);
        assert_eq!(result.breakdown[&Criterion::CompanyAge], 10.0);
        assert_eq!(result.breakdown[&Criterion::GithubActivity], 1.0);
        assert_eq!(result.breakdown[&Criterion::HiringStatus], 8.0);
    }

    #[test]
    fn non_target_batch_scores_zero() {
        let engine = engine();
        let mut c = company("c1");
        c.batch = Some("W19".to_string());
        let result = engine.score(&c).unwrap();
        assert_eq!(result.breakdown[&Criterion::TargetBatch], 0.0);
    }

    #[test]
    fn full_name_batch_matches_allow_list() {
        let engine = engine();
        let mut c = company("c1");
        c.batch = Some("Winter 2023".to_string());
        let result = engine.score(&c).unwrap();
        assert_eq!(result.breakdown[&Criterion::TargetBatch], 10.0);
    }

    #[test]
    fn age_decays_linearly_outside_window() {
        let engine = engine();

        let mut young = company("c1");
        young.launched_at = Some(months_ago(12)); // 6 months under the window
        let score = engine.score(&young).unwrap().breakdown[&Criterion::CompanyAge];
        assert!((score - 7.0).abs() < 0.3, "12mo company scored {score}");

        let mut old = company("c2");
        old.launched_at = Some(months_ago(34)); // 10 months over the window
        let score = engine.score(&old).unwrap().breakdown[&Criterion::CompanyAge];
        assert!((score - 7.0).abs() < 0.3, "34mo company scored {score}");

        let mut ancient = company("c3");
        ancient.launched_at = Some(months_ago(120));
        let score = engine.score(&ancient).unwrap().breakdown[&Criterion::CompanyAge];
        assert_eq!(score, 0.0);
    }

    #[test]
    fn missing_launch_date_is_neutral_with_approximation() {
        let engine = engine();
        let result = engine.score(&company("c1")).unwrap();
        assert_eq!(result.breakdown[&Criterion::CompanyAge], AGE_NEUTRAL_SCORE);
        assert!(result.metadata.approximations.contains(&"company_age".to_string()));
        assert!(result.metadata.missing_data_points.contains(&"launched_at".to_string()));
    }

    #[test]
    fn task_diversity_adds_bonus() {
        let engine = engine();
        let model = |task: &str| ModelSummary {
            downloads: 5_000,
            likes: 10,
            task: Some(task.to_string()),
        };

        let mut single = company("c1");
        single.models = vec![model("text-generation"), model("text-generation")];
        let mut diverse = company("c2");
        diverse.models = vec![model("text-generation"), model("embedding")];

        let single_score = engine.score(&single).unwrap().breakdown[&Criterion::HuggingfaceActivity];
        let diverse_score =
            engine.score(&diverse).unwrap().breakdown[&Criterion::HuggingfaceActivity];
        assert!(diverse_score > single_score);
    }

    #[test]
    fn domain_keywords_accumulate_and_cap() {
        let engine = engine();
        let mut c = company("c1");
        c.description = Some("B2B enterprise API platform".to_string());
        let result = engine.score(&c).unwrap();
        assert_eq!(result.breakdown[&Criterion::DomainFocus], 8.0);

        c.long_description = Some(
            "developer infrastructure saas automation platform".to_string(),
        );
        let result = engine.score(&c).unwrap();
        assert_eq!(result.breakdown[&Criterion::DomainFocus], 10.0);
    }

    #[test]
    fn confidence_degrades_with_missing_inputs() {
        let engine = engine();
        let sparse = engine.score(&company("c1")).unwrap();

        let mut full = company("c2");
        full.batch = Some("W23".to_string());
        full.launched_at = Some(months_ago(20));
        full.is_hiring = Some(true);
        full.description = Some("api platform".to_string());
        full.repos = vec![RepoSummary { stars: 10, forks: 1, language: None }];
        full.models = vec![ModelSummary { downloads: 10, likes: 0, task: None }];
        full.funding_stage = Some(FundingStage::Seed);
        let complete = engine.score(&full).unwrap();

        assert!(complete.confidence > sparse.confidence);
        assert_eq!(complete.confidence, 1.0);
        assert!(sparse.confidence >= 0.0);
        assert!(!sparse.metadata.missing_data_points.is_empty());
    }

    #[test]
    fn unbalanced_weights_rejected_at_construction() {
        let mut weights = ScoringWeights::default();
        weights.weights.insert(Criterion::TargetBatch, 0.9);
        assert!(ScoringEngine::new(weights).is_err());
    }
}
