use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use dealscout_common::{
    FindingType, PriorityLevel, QueryOutput, QueryStatus, ResearchFinding,
};

/// Token-set similarity at or above this is treated as a near-duplicate.
const SIMILARITY_THRESHOLD: f64 = 0.7;

const PRIORITY_HIGH_CONFIDENCE: f64 = 0.75;
const PRIORITY_MEDIUM_CONFIDENCE: f64 = 0.5;

/// Turn raw query outputs into deduplicated, confidence-ranked findings.
/// Pure and synchronous; persistence is the orchestrator's job.
pub fn synthesize(session_id: Uuid, outputs: &[QueryOutput]) -> Vec<ResearchFinding> {
    let mut by_category: BTreeMap<FindingType, Vec<&QueryOutput>> = BTreeMap::new();
    for output in outputs {
        if output.status == QueryStatus::Succeeded && !output.content.trim().is_empty() {
            by_category.entry(output.finding_type).or_default().push(output);
        }
    }

    let now = Utc::now();
    let mut findings = Vec::new();

    for (category, mut group) in by_category {
        // Rank first so dedup keeps the higher-confidence output.
        group.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept: Vec<(HashSet<String>, ResearchFinding)> = Vec::new();
        for output in group {
            let tokens = normalize_tokens(&output.content);

            if let Some((_, existing)) = kept
                .iter_mut()
                .find(|(kept_tokens, _)| jaccard(kept_tokens, &tokens) >= SIMILARITY_THRESHOLD)
            {
                // Near-duplicate: fold citations into the kept finding.
                for citation in &output.citations {
                    if !existing.citations.contains(citation) {
                        existing.citations.push(citation.clone());
                    }
                }
                continue;
            }

            let finding = ResearchFinding {
                id: Uuid::new_v4(),
                session_id,
                finding_type: category,
                title: output.title.clone(),
                content: output.content.clone(),
                confidence_score: output.confidence.clamp(0.0, 1.0),
                citations: output.citations.clone(),
                priority_level: priority_for(output.confidence),
                tags: vec![category.to_string()],
                created_at: now,
            };
            kept.push((tokens, finding));
        }

        findings.extend(kept.into_iter().map(|(_, f)| f));
    }

    findings
}

fn priority_for(confidence: f64) -> PriorityLevel {
    if confidence >= PRIORITY_HIGH_CONFIDENCE {
        PriorityLevel::High
    } else if confidence >= PRIORITY_MEDIUM_CONFIDENCE {
        PriorityLevel::Medium
    } else {
        PriorityLevel::Low
    }
}

/// Lowercased word set for similarity comparison.
fn normalize_tokens(content: &str) -> HashSet<String> {
    content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
