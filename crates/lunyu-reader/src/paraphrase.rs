//! AI paraphrase and question answering over a `generateContent`-style
//! REST endpoint.
//!
//! [`TextCompletion`] is the seam: [`GeminiClient`] talks to the real service,
//! tests plug in canned completions. [`Paraphraser`] wraps any completion
//! source with a per-attempt timeout and the retry policy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::retry::{RetryPolicy, retry_if};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const VERSE_SYSTEM: &str = "你是一位精通國學的現代講師，擅長將論語智慧應用於現代生活。";
const ASK_SYSTEM: &str = "你是一位充滿智慧的儒家導師，熟悉《論語》全文。請用現代人的語言，結合《論語》的原文智慧來回答使用者的生活疑惑。";

#[derive(Debug, Error)]
pub enum ParaphraseError {
    #[error("AI service is not configured: missing API key")]
    MissingApiKey,
    #[error("AI service returned HTTP {0}")]
    Status(u16),
    #[error("AI request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("AI request timed out after {} s", .0.as_secs())]
    Timeout(Duration),
    #[error("malformed AI response: {0}")]
    Malformed(String),
}

impl ParaphraseError {
    /// Configuration problems never fix themselves; everything else may.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ParaphraseError::MissingApiKey)
    }
}

/// A user prompt plus the system instruction framing it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub system_instruction: String,
}

impl Prompt {
    pub fn for_verse(verse_text: &str) -> Self {
        Self {
            text: format!(
                "請用平易近人的現代繁體中文解釋這句論語：「{verse_text}」。\n1. 先給出白話翻譯。\n2. 再簡要說明這句話的現代應用或核心哲理。"
            ),
            system_instruction: VERSE_SYSTEM.to_string(),
        }
    }

    pub fn for_question(question: &str) -> Self {
        Self {
            text: format!(
                "使用者問題：「{question}」\n\n請根據論語的智慧回答這個問題。請引用至少一句相關的論語原文來佐證你的回答。回答語氣要溫和、有智慧，並以繁體中文回答。"
            ),
            system_instruction: ASK_SYSTEM.to_string(),
        }
    }
}

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, ParaphraseError>> + Send + 'a>>;

/// One completion attempt; retries and timeouts live in [`Paraphraser`].
pub trait TextCompletion: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> CompletionFuture<'a>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, ParaphraseError> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| ParaphraseError::Malformed("no candidate text".to_string()))
    }
}

/// Client for the Gemini `models/{model}:generateContent` call.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, endpoint: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ParaphraseError> {
        let key = self.api_key.as_deref().ok_or(ParaphraseError::MissingApiKey)?;
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt.text }],
            }],
            system_instruction: Content {
                parts: [Part {
                    text: &prompt.system_instruction,
                }],
            },
        };
        let response = self
            .http
            .post(self.url())
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParaphraseError::Status(status.as_u16()));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ParaphraseError::Malformed(e.to_string()))?;
        parsed.into_text()
    }
}

impl TextCompletion for GeminiClient {
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> CompletionFuture<'a> {
        Box::pin(self.generate(prompt))
    }
}

/// Completion source plus timeout and retry policy.
#[derive(Clone)]
pub struct Paraphraser {
    client: Arc<dyn TextCompletion>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Paraphraser {
    pub fn new(client: Arc<dyn TextCompletion>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    pub async fn run(&self, prompt: &Prompt) -> Result<String, ParaphraseError> {
        let client = &self.client;
        let timeout = self.timeout;
        let result = retry_if(
            &self.policy,
            |attempt| async move {
                if attempt > 0 {
                    info!("AI request attempt {}", attempt + 1);
                }
                match tokio::time::timeout(timeout, client.complete(prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(ParaphraseError::Timeout(timeout)),
                }
            },
            ParaphraseError::is_retryable,
        )
        .await;
        if let Err(err) = &result {
            error!("AI request failed: {err}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String, ParaphraseError>>>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, ParaphraseError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextCompletion for Scripted {
        fn complete<'a>(&'a self, prompt: &'a Prompt) -> CompletionFuture<'a> {
            self.prompts.lock().unwrap().push(prompt.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ParaphraseError::Status(500)));
            Box::pin(async move { reply })
        }
    }

    struct Stalled;

    impl TextCompletion for Stalled {
        fn complete<'a>(&'a self, _prompt: &'a Prompt) -> CompletionFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            })
        }
    }

    #[test]
    fn verse_prompt_quotes_the_text() {
        let prompt = Prompt::for_verse("學而時習之");
        assert!(prompt.text.contains("「學而時習之」"));
        assert_eq!(prompt.system_instruction, VERSE_SYSTEM);
        assert!(Prompt::for_question("如何交友").text.contains("如何交友"));
    }

    #[test]
    fn request_body_uses_camel_case_instruction() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: "q" }],
            }],
            system_instruction: Content {
                parts: [Part { text: "s" }],
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "q");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "s");
    }

    #[test]
    fn extracts_first_candidate_text() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "白話"}, {"text": "x"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "白話");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(empty.into_text(), Err(ParaphraseError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_key_is_not_retried() {
        let client = GeminiClient::new(Some("  ".into()), DEFAULT_ENDPOINT.into(), DEFAULT_MODEL.into());
        assert!(!client.is_configured());
        let paraphraser = Paraphraser::new(Arc::new(client), RetryPolicy::default(), Duration::from_secs(5));
        let err = paraphraser.run(&Prompt::for_question("?")).await.unwrap_err();
        assert!(matches!(err, ParaphraseError::MissingApiKey));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(ParaphraseError::Status(503)),
            Ok("答".to_string()),
        ]));
        let paraphraser = Paraphraser::new(scripted.clone(), RetryPolicy::default(), Duration::from_secs(5));
        let text = paraphraser.run(&Prompt::for_verse("學而")).await.unwrap();
        assert_eq!(text, "答");
        assert_eq!(scripted.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn each_attempt_is_bounded_by_timeout() {
        let paraphraser = Paraphraser::new(
            Arc::new(Stalled),
            RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            Duration::from_secs(10),
        );
        let err = paraphraser.run(&Prompt::for_verse("學而")).await.unwrap_err();
        assert!(matches!(err, ParaphraseError::Timeout(d) if d == Duration::from_secs(10)));
    }
}
