use dealscout_common::FindingType;
use research_client::QueryRequest;

/// System framing shared by every research query.
const RESEARCH_SYSTEM: &str = "\
You are a research analyst for an early-stage investment pipeline. \
Answer from verifiable public sources, cite them, and say so plainly when \
information is unavailable. Do not speculate.";

/// A parameterized research-query definition belonging to a category.
#[derive(Debug, Clone, Copy)]
pub struct ResearchTemplate {
    pub id: u32,
    pub category: FindingType,
    pub title: &'static str,
    /// Prompt with `{company_name}` / `{company_description}` slots.
    pub prompt: &'static str,
    /// Rounded-up dispatch estimate, settled against provider usage later.
    pub estimated_cost_usd: f64,
}

impl ResearchTemplate {
    /// Render the template into a dispatchable request.
    pub fn render(&self, company_name: &str, company_description: Option<&str>) -> QueryRequest {
        let description = company_description.unwrap_or("(no description on file)");
        let query = self
            .prompt
            .replace("{company_name}", company_name)
            .replace("{company_description}", description);
        QueryRequest::new(RESEARCH_SYSTEM, query)
    }
}

/// The full default catalog, in execution order.
pub const CATALOG: &[ResearchTemplate] = &[
    ResearchTemplate {
        id: 1,
        category: FindingType::CompanyOverview,
        title: "Company overview",
        prompt: "Summarize what {company_name} does, who its customers are, and how it \
                 positions itself. Known context: {company_description}",
        estimated_cost_usd: 0.02,
    },
    ResearchTemplate {
        id: 2,
        category: FindingType::Founders,
        title: "Founding team",
        prompt: "Who founded {company_name}? Cover prior companies, notable employers, \
                 and public technical work for each founder.",
        estimated_cost_usd: 0.02,
    },
    ResearchTemplate {
        id: 3,
        category: FindingType::Funding,
        title: "Funding history",
        prompt: "What funding has {company_name} raised? List rounds, amounts, dates, \
                 and lead investors where disclosed.",
        estimated_cost_usd: 0.02,
    },
    ResearchTemplate {
        id: 4,
        category: FindingType::Market,
        title: "Market and traction",
        prompt: "What market does {company_name} sell into, how large is it, and what \
                 public traction signals exist (customers, case studies, usage numbers)?",
        estimated_cost_usd: 0.03,
    },
    ResearchTemplate {
        id: 5,
        category: FindingType::Competitors,
        title: "Competitive landscape",
        prompt: "Who competes with {company_name}? Name direct competitors and how \
                 {company_name} differentiates. Context: {company_description}",
        estimated_cost_usd: 0.03,
    },
    ResearchTemplate {
        id: 6,
        category: FindingType::Technology,
        title: "Technology footprint",
        prompt: "Describe the public technology footprint of {company_name}: open-source \
                 repositories, published models, papers, and developer adoption signals.",
        estimated_cost_usd: 0.03,
    },
    ResearchTemplate {
        id: 7,
        category: FindingType::Hiring,
        title: "Hiring signals",
        prompt: "Is {company_name} hiring? Which roles, which locations, and what does \
                 the hiring pattern suggest about their roadmap?",
        estimated_cost_usd: 0.02,
    },
    ResearchTemplate {
        id: 8,
        category: FindingType::Outreach,
        title: "Outreach angles",
        prompt: "Given what is publicly known about {company_name} \
                 ({company_description}), list concrete recent developments that would \
                 make credible, specific openers for a first outreach email.",
        estimated_cost_usd: 0.03,
    },
];

pub fn template_by_id(id: u32) -> Option<&'static ResearchTemplate> {
    CATALOG.iter().find(|t| t.id == id)
}

/// Resolve a research-type keyword to an ordered template list. Unrecognized
/// keywords fall back to the full default catalog.
pub fn templates_for_research_type(research_type: &str) -> Vec<u32> {
    match research_type {
        "quick_scan" => vec![1, 3, 7],
        "deep_dive" => vec![1, 2, 3, 4, 5, 6, 7],
        "outreach_prep" => vec![1, 2, 7, 8],
        _ => CATALOG.iter().map(|t| t.id).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in CATALOG {
            assert!(seen.insert(t.id), "duplicate template id {}", t.id);
        }
    }

    #[test]
    fn known_research_types_resolve_to_known_templates() {
        for rt in ["quick_scan", "deep_dive", "outreach_prep"] {
            let ids = templates_for_research_type(rt);
            assert!(!ids.is_empty());
            for id in ids {
                assert!(template_by_id(id).is_some(), "{rt} references unknown id {id}");
            }
        }
    }

    #[test]
    fn unknown_research_type_falls_back_to_full_catalog() {
        let ids = templates_for_research_type("does_not_exist");
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn render_fills_slots() {
        let t = template_by_id(5).unwrap();
        let req = t.render("Acme", Some("b2b api platform"));
        assert!(req.query.contains("Acme"));
        assert!(req.query.contains("b2b api platform"));
        assert!(!req.query.contains("{company_name}"));
    }

    #[test]
    fn render_without_description_uses_placeholder() {
        let t = template_by_id(1).unwrap();
        let req = t.render("Acme", None);
        assert!(!req.query.contains("{company_description}"));
    }
}
