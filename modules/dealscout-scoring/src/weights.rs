use std::collections::BTreeMap;

use dealscout_common::Criterion;

/// Bump whenever the scoring formula changes; historical score_history rows
/// are compared across versions, so a silent formula change would corrupt
/// comparisons. Rotating `target_batches` is a config change, not a formula
/// change, and does not bump this.
pub const ALGORITHM_VERSION: &str = "2.1.0";

/// Confidence deduction per missing or approximated input.
pub const CONFIDENCE_PENALTY: f64 = 0.1;

/// Peak-score age window, in months since launch.
pub const AGE_PEAK_MIN_MONTHS: f64 = 18.0;
pub const AGE_PEAK_MAX_MONTHS: f64 = 24.0;
/// Linear decay per month outside the peak window.
pub const AGE_DECAY_BELOW_PER_MONTH: f64 = 0.5;
pub const AGE_DECAY_ABOVE_PER_MONTH: f64 = 0.3;
/// Score used when the launch date is unknown.
pub const AGE_NEUTRAL_SCORE: f64 = 5.0;

/// Immutable scoring configuration, constructed once and injected into the
/// engine. Weights must sum to 1.0; `ScoringEngine::new` enforces it.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub weights: BTreeMap<Criterion, f64>,
    /// Canonical cohort labels that score 10 on the target-batch criterion.
    pub target_batches: Vec<String>,
    /// (min summed stars, score) ladder, highest tier first.
    pub star_tiers: Vec<(u64, f64)>,
    /// (min summed downloads, score) ladder, highest tier first.
    pub download_tiers: Vec<(u64, f64)>,
    pub domain_keywords: Vec<&'static str>,
    pub domain_hit_increment: f64,
    pub conference_keywords: Vec<&'static str>,
    pub conference_hit_increment: f64,
    pub conference_baseline: f64,
    /// Per-distinct-task bonus on model-hub activity, and its cap.
    pub task_diversity_bonus: f64,
    pub task_diversity_bonus_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        // Target cohort deliberately outweighs both engagement signals
        // combined (0.40 vs 0.12 + 0.08).
        let weights = BTreeMap::from([
            (Criterion::TargetBatch, 0.40),
            (Criterion::CompanyAge, 0.15),
            (Criterion::GithubActivity, 0.12),
            (Criterion::HuggingfaceActivity, 0.08),
            (Criterion::DomainFocus, 0.10),
            (Criterion::HiringStatus, 0.05),
            (Criterion::FundingStage, 0.05),
            (Criterion::ConferencePresence, 0.03),
            (Criterion::NameQuality, 0.02),
        ]);

        Self {
            weights,
            target_batches: vec!["W22".to_string(), "S22".to_string(), "W23".to_string()],
            star_tiers: vec![
                (10_000, 10.0),
                (5_000, 8.0),
                (1_000, 6.0),
                (100, 4.0),
                (1, 2.0),
            ],
            download_tiers: vec![
                (1_000_000, 10.0),
                (100_000, 8.0),
                (10_000, 6.0),
                (1_000, 4.0),
                (1, 2.0),
            ],
            domain_keywords: vec![
                "b2b",
                "enterprise",
                "api",
                "platform",
                "developer",
                "infrastructure",
                "saas",
                "automation",
            ],
            domain_hit_increment: 2.0,
            conference_keywords: vec!["neurips", "icml", "iclr", "kdd", "demo day"],
            conference_hit_increment: 3.0,
            conference_baseline: 2.0,
            task_diversity_bonus: 0.5,
            task_diversity_bonus_cap: 2.0,
        }
    }
}

impl ScoringWeights {
    /// Sum of all criterion weights. Must equal 1.0 within 1e-9.
    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn weight(&self, criterion: Criterion) -> f64 {
        self.weights.get(&criterion).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = ScoringWeights::default();
        assert!((w.weight_sum() - 1.0).abs() < 1e-9, "sum = {}", w.weight_sum());
    }

    #[test]
    fn target_batch_outweighs_engagement_combined() {
        let w = ScoringWeights::default();
        let engagement =
            w.weight(Criterion::GithubActivity) + w.weight(Criterion::HuggingfaceActivity);
        assert!(w.weight(Criterion::TargetBatch) >= 2.0 * engagement);
    }

    #[test]
    fn tier_ladders_are_descending() {
        let w = ScoringWeights::default();
        for tiers in [&w.star_tiers, &w.download_tiers] {
            for pair in tiers.windows(2) {
                assert!(pair[0].0 > pair[1].0);
                assert!(pair[0].1 > pair[1].1);
            }
        }
    }
}
