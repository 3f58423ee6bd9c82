//! Answer generation through the DeepSeek chat API.
//!
//! The generator trait mirrors the embedding provider seam: the DeepSeek
//! client is the production implementation, tests substitute a stub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::store::Document;
use crate::retrieve::Retriever;

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// Produces an answer for a query grounded in retrieved documents.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &[Document]) -> Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// DeepSeek Client
// ============================================================================

/// OpenAI-style chat completions endpoint.
/// source: https://api-docs.deepseek.com/
const DEEPSEEK_CHAT_URL: &str = "https://api.deepseek.com/v1/chat/completions";

const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 512;

pub struct DeepSeekClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl DeepSeekClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            api_key,
            client,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RagError::Config("API key not found. Set DEEPSEEK_API_KEY.".to_string())
            })?;
        Self::new(key)
    }

    pub fn with_options(
        mut self,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        self.model = model.into();
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_prompt(query: &str, context: &[Document]) -> String {
        let combined = context
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Answer the user's query based on the provided context.\n\n\
             Context:\n{}\n\n\
             Query:\n{}\n\n\
             Answer in Persian:",
            combined, query
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct DeepSeekError {
    error: DeepSeekErrorDetail,
}

#[derive(Debug, Deserialize)]
struct DeepSeekErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[async_trait]
impl AnswerGenerator for DeepSeekClient {
    async fn generate(&self, query: &str, context: &[Document]) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a helpful assistant.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(query, context),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(DEEPSEEK_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<DeepSeekError>(&body) {
                return Err(RagError::Generation(format!(
                    "{}: {}",
                    err.error.kind, err.error.message
                )));
            }
            return Err(RagError::Generation(format!("{}: {}", status, body)));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Generation(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::Generation("empty choices in response".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// QueryProcessor
// ============================================================================

/// Retrieval plus generation, end to end.
pub struct QueryProcessor {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn AnswerGenerator>,
}

impl QueryProcessor {
    pub fn new(retriever: Arc<dyn Retriever>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub async fn process(&self, query: &str) -> Result<String> {
        let documents = self.retriever.retrieve(query).await?;
        tracing::info!(
            retriever = self.retriever.name(),
            documents = documents.len(),
            "generating answer"
        );
        self.generator.generate(query, &documents).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::testing::meta;

    #[test]
    fn test_prompt_carries_context_and_query() {
        let context = vec![
            Document::new("hotel info block", meta("h1")),
            Document::new("hotel review block", meta("h1")),
        ];
        let prompt = DeepSeekClient::build_prompt("بهترین هتل تهران؟", &context);

        assert!(prompt.contains("Context:\nhotel info block\n\nhotel review block"));
        assert!(prompt.contains("Query:\nبهترین هتل تهران؟"));
        assert!(prompt.ends_with("Answer in Persian:"));
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"پاسخ"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "پاسخ");
    }

    #[tokio::test]
    async fn test_processor_feeds_retrieved_docs_to_generator() {
        struct StubRetriever;

        #[async_trait]
        impl Retriever for StubRetriever {
            async fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
                Ok(vec![Document::new("stub context", meta("h1"))])
            }

            fn name(&self) -> &str {
                "stub"
            }
        }

        struct EchoGenerator;

        #[async_trait]
        impl AnswerGenerator for EchoGenerator {
            async fn generate(&self, query: &str, context: &[Document]) -> Result<String> {
                Ok(format!("{} | {}", query, context[0].content))
            }

            fn name(&self) -> &str {
                "echo"
            }
        }

        let processor = QueryProcessor::new(Arc::new(StubRetriever), Arc::new(EchoGenerator));
        let answer = processor.process("question").await.unwrap();
        assert_eq!(answer, "question | stub context");
    }
}
