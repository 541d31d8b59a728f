pub mod findings;
pub mod score_history;
pub mod sessions;

pub use findings::FindingStore;
pub use score_history::ScoreStore;
pub use sessions::SessionStore;
