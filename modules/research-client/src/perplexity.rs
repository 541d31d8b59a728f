use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{QueryExecutor, QueryRequest, QueryResult};

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar-pro";

/// Cost per million tokens, blended input/output. Rounded up the same way
/// the per-operation estimates are.
const USD_PER_MILLION_TOKENS: f64 = 4.0;

/// Online-research provider speaking the OpenAI-compatible chat API with
/// citation support.
pub struct PerplexityClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl PerplexityClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http: reqwest::Client::new(),
            base_url: PERPLEXITY_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl QueryExecutor for PerplexityClient {
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, "Research query dispatch");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.query },
            ],
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Research provider error ({}): {}", status, error_text));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("Research provider returned no choices"))?;

        let tokens_used = parsed
            .usage
            .as_ref()
            .map(|u| u.prompt_tokens + u.completion_tokens)
            .unwrap_or(0);
        let cost_usd = parsed
            .usage
            .as_ref()
            .map(|_| tokens_used as f64 / 1_000_000.0 * USD_PER_MILLION_TOKENS);

        // The provider doesn't self-report confidence; cite-backed answers
        // get a higher prior than bare ones.
        let confidence = if parsed.citations.is_empty() { 0.5 } else { 0.8 };

        Ok(QueryResult {
            content,
            citations: parsed.citations,
            confidence,
            cost_usd,
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_with_citations_and_usage() {
        let json = r#"{
            "choices": [{"message": {"content": "Acme builds APIs."}}],
            "citations": ["https://acme.dev"],
            "usage": {"prompt_tokens": 120, "completion_tokens": 380}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Acme builds APIs.");
        assert_eq!(parsed.citations.len(), 1);
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens + usage.completion_tokens, 500);
    }

    #[test]
    fn response_parses_without_optional_fields() {
        let json = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.citations.is_empty());
        assert!(parsed.usage.is_none());
    }
}
