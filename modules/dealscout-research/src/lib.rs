pub mod budget;
pub mod orchestrator;
pub mod registry;
pub mod synthesizer;
pub mod templates;

pub use budget::BudgetTracker;
pub use orchestrator::{CompanyRef, Orchestrator, Persistence, SessionConfig};
pub use registry::SessionRegistry;
pub use synthesizer::synthesize;
pub use templates::{templates_for_research_type, ResearchTemplate, CATALOG};
