pub mod perplexity;
pub mod traits;

pub use perplexity::PerplexityClient;
pub use traits::{QueryExecutor, QueryRequest, QueryResult};
