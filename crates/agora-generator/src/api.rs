//! HTTP generator using OpenAI-compatible or Anthropic endpoints.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use agora_types::{Agent, GeneratorSettings, TopicBrief};

use super::{EngagementDecision, GeneratedUnit, GenerationContext, GenerationError, Generator};

/// Configuration for the HTTP generator.
#[derive(Debug, Clone)]
pub struct ApiGeneratorConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// API key; `None` means the credential is missing
    pub api_key: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,
}

impl ApiGeneratorConfig {
    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: Some(SecretString::from(api_key.into())),
            timeout: Duration::from_secs(60),
        }
    }

    /// Create config for Claude API.
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: model.into(),
            api_key: Some(SecretString::from(api_key.into())),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from loaded settings. An empty key counts as missing.
    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        let default_base = if settings.provider == "anthropic" {
            "https://api.anthropic.com/v1"
        } else {
            "https://api.openai.com/v1"
        };
        Self {
            base_url: settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string()),
            model: settings.model.clone(),
            api_key: settings
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .map(|k| SecretString::from(k.to_string())),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    fn is_anthropic(&self) -> bool {
        self.base_url.contains("anthropic")
    }
}

/// Generator backed by a hosted model.
pub struct ApiGenerator {
    client: Client,
    config: ApiGeneratorConfig,
}

impl ApiGenerator {
    pub fn new(config: ApiGeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::ConfigError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or_else(|| GenerationError::ConfigError("missing API key".to_string()))
    }

    /// Send one prompt and parse the JSON object in the reply.
    async fn call<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, GenerationError> {
        debug!(model = %self.config.model, "Calling generation API");
        let text = if self.config.is_anthropic() {
            self.make_anthropic_request(prompt).await?
        } else {
            self.make_openai_request(prompt).await?
        };

        let json = extract_json(&text);
        if let Ok(refusal) = serde_json::from_str::<RefusalBody>(&json) {
            return Err(GenerationError::Refused(refusal.refusal));
        }
        serde_json::from_str(&json).map_err(|e| GenerationError::ParseError(e.to_string()))
    }

    async fn make_openai_request(&self, prompt: &str) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            messages: Vec<OpenAIMessage<'a>>,
            response_format: OpenAIResponseFormat,
        }

        #[derive(Serialize)]
        struct OpenAIMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct OpenAIResponseFormat {
            #[serde(rename = "type")]
            format_type: &'static str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAIMessageResponse {
            #[serde(default)]
            content: Option<String>,
            #[serde(default)]
            refusal: Option<String>,
        }

        let request = OpenAIRequest {
            model: &self.config.model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
            response_format: OpenAIResponseFormat {
                format_type: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()?))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::ApiError(e.to_string()))?;

        let response = check_status(response).await?;
        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        let message = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| GenerationError::ParseError("No choices in response".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(GenerationError::Refused(refusal));
        }
        message.content.ok_or(GenerationError::EmptyResponse)
    }

    async fn make_anthropic_request(&self, prompt: &str) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct AnthropicRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<AnthropicMessage<'a>>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
            #[serde(default)]
            stop_reason: Option<String>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: String,
        }

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: 1024,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::ApiError(e.to_string()))?;

        let response = check_status(response).await?;
        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        if body.stop_reason.as_deref() == Some("refusal") {
            return Err(GenerationError::Refused("stop_reason=refusal".to_string()));
        }
        body.content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| GenerationError::ParseError("No content in response".to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    if response.status() == 429 {
        return Err(GenerationError::RateLimitExceeded);
    }
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::ApiError(format!("HTTP {}: {}", status, body)));
    }
    Ok(response)
}

/// A model reply that declines the request.
#[derive(Deserialize)]
struct RefusalBody {
    refusal: String,
}

#[derive(Deserialize)]
struct TopicUnitsBody {
    posts: Vec<GeneratedUnit>,
}

#[derive(Deserialize)]
struct DecisionBody {
    action: EngagementDecision,
}

#[derive(Deserialize)]
struct CommentBody {
    comment: String,
}

/// Extract JSON object from text (handles markdown code blocks).
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            return text[start + 3..start + 3 + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}

fn persona_header(agent: &Agent) -> String {
    format!(
        "You are @{} ({}). Bio: {}. Personality: {}.",
        agent.handle,
        agent.display_name,
        agent.bio,
        agent.personality_line()
    )
}

const UNIT_SCHEMA: &str = r#"{
  "body": "post text",
  "tags": ["tag1", "tag2"],
  "kind": "text" | "image" | "video" | "meme",
  "media_url": null,
  "media_kind": null,
  "media_source": null
}"#;

fn build_unit_prompt(agent: &Agent, context: &GenerationContext) -> String {
    let recent: String = context
        .recent
        .iter()
        .map(|u| format!("- {}", u.body))
        .collect::<Vec<_>>()
        .join("\n");
    let topics: String = context
        .topics
        .iter()
        .map(|t| format!("- {} ({}, {}): {}", t.headline, t.category, t.mood, t.summary))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{header}

Write one new social post in your own voice.

RECENT POSTS ON THE NETWORK:
{recent}

TRENDING TOPICS (optional inspiration):
{topics}

Respond with JSON only:
{UNIT_SCHEMA}"#,
        header = persona_header(agent),
    )
}

fn build_topic_prompt(agent: &Agent, brief: &TopicBrief) -> String {
    format!(
        r#"{header}

Write 2 or 3 short posts covering this breaking topic.

HEADLINE: {headline}
SUMMARY: {summary}
MOOD: {mood}
CATEGORY: {category}

Respond with JSON only:
{{"posts": [{UNIT_SCHEMA}]}}"#,
        header = persona_header(agent),
        headline = brief.headline,
        summary = brief.summary,
        mood = brief.mood,
        category = brief.category,
    )
}

fn build_decision_prompt(reactor: &Agent, unit_body: &str, author_handle: &str) -> String {
    format!(
        r#"{header}

@{author_handle} posted:
"{unit_body}"

Decide whether you ignore it, like it, or comment on it.
Respond with JSON only: {{"action": "none" | "like" | "comment"}}"#,
        header = persona_header(reactor),
    )
}

fn build_comment_prompt(reactor: &Agent, author: &Agent, unit_body: &str) -> String {
    format!(
        r#"{header}

Reply to this post by @{author} ({author_name}):
"{unit_body}"

Keep it under 200 characters.
Respond with JSON only: {{"comment": "your reply"}}"#,
        header = persona_header(reactor),
        author = author.handle,
        author_name = author.display_name,
    )
}

#[async_trait]
impl Generator for ApiGenerator {
    fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn generate_unit(
        &self,
        agent: &Agent,
        context: &GenerationContext,
    ) -> Result<GeneratedUnit, GenerationError> {
        let prompt = build_unit_prompt(agent, context);
        self.call::<GeneratedUnit>(&prompt).await?.validated()
    }

    async fn generate_topic_units(
        &self,
        agent: &Agent,
        brief: &TopicBrief,
    ) -> Result<Vec<GeneratedUnit>, GenerationError> {
        let prompt = build_topic_prompt(agent, brief);
        let body: TopicUnitsBody = self.call(&prompt).await?;
        let units = body
            .posts
            .into_iter()
            .filter_map(|u| u.validated().ok())
            .collect::<Vec<_>>();
        if units.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(units)
    }

    async fn decide_engagement(
        &self,
        reactor: &Agent,
        unit_body: &str,
        author_handle: &str,
    ) -> Result<EngagementDecision, GenerationError> {
        let prompt = build_decision_prompt(reactor, unit_body, author_handle);
        let body: DecisionBody = self.call(&prompt).await?;
        Ok(body.action)
    }

    async fn generate_comment(
        &self,
        reactor: &Agent,
        author: &Agent,
        unit_body: &str,
    ) -> Result<String, GenerationError> {
        let prompt = build_comment_prompt(reactor, author, unit_body);
        let body: CommentBody = self.call(&prompt).await?;
        let comment = body.comment.trim().to_string();
        if comment.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::UnitKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent() -> Agent {
        Agent::new("a1", "nova", "Nova").with_bio("night-shift baker")
    }

    fn openai_generator(server: &MockServer) -> ApiGenerator {
        let mut config = ApiGeneratorConfig::openai("test-key", "gpt-4o-mini");
        config.base_url = server.uri();
        ApiGenerator::new(config).unwrap()
    }

    fn openai_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": content}}]
        }))
    }

    #[test]
    fn test_extract_json_code_block() {
        let text = "Here you go:\n```json\n{\"action\": \"like\"}\n```";
        assert_eq!(extract_json(text), "{\"action\": \"like\"}");
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let text = r#"Sure! {"comment": "nice"} hope that helps"#;
        assert_eq!(extract_json(text), r#"{"comment": "nice"}"#);
    }

    #[test]
    fn test_from_settings_missing_key() {
        let settings = GeneratorSettings {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        let generator = ApiGenerator::new(ApiGeneratorConfig::from_settings(&settings)).unwrap();
        assert!(!generator.has_credential());
    }

    #[test]
    fn test_from_settings_anthropic_base() {
        let settings = GeneratorSettings {
            provider: "anthropic".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let config = ApiGeneratorConfig::from_settings(&settings);
        assert!(config.is_anthropic());
        assert!(config.api_key.is_some());
    }

    #[test]
    fn test_unit_prompt_includes_context() {
        let mut context = GenerationContext::default();
        context.topics.push(
            TopicBrief::new("t1", "Solar flare", chrono::Duration::hours(1))
                .with_tags("urgent", "science"),
        );
        let prompt = build_unit_prompt(&agent(), &context);
        assert!(prompt.contains("@nova"));
        assert!(prompt.contains("Solar flare"));
    }

    #[tokio::test]
    async fn test_generate_unit_openai() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(openai_reply(
                r#"{"body": "Fresh sourdough at 4am", "tags": ["bread"], "kind": "text"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let unit = openai_generator(&server)
            .generate_unit(&agent(), &GenerationContext::default())
            .await
            .unwrap();

        assert_eq!(unit.body, "Fresh sourdough at 4am");
        assert_eq!(unit.kind, UnitKind::Text);
        assert_eq!(unit.tags, vec!["bread".to_string()]);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let result = openai_generator(&server)
            .generate_unit(&agent(), &GenerationContext::default())
            .await;
        assert!(matches!(result, Err(GenerationError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = openai_generator(&server)
            .decide_engagement(&agent(), "hello", "sol")
            .await;
        assert!(matches!(result, Err(GenerationError::RateLimitExceeded)));
    }

    #[tokio::test]
    async fn test_refusal_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null, "refusal": "cannot help"}}]
            })))
            .mount(&server)
            .await;

        let result = openai_generator(&server)
            .generate_unit(&agent(), &GenerationContext::default())
            .await;
        assert!(matches!(result, Err(GenerationError::Refused(_))));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(openai_reply("I'd rather not say"))
            .mount(&server)
            .await;

        let result = openai_generator(&server)
            .decide_engagement(&agent(), "hello", "sol")
            .await;
        assert!(matches!(result, Err(GenerationError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_topic_units_and_decision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(openai_reply(
                r#"{"posts": [
                    {"body": "Flare incoming", "kind": "video",
                     "media_url": "https://cdn.example/f.mp4", "media_kind": "video",
                     "media_source": "generated"},
                    {"body": "Stay safe", "kind": "text"},
                    {"body": "  "}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let brief = TopicBrief::new("t1", "Solar flare", chrono::Duration::hours(1));
        let units = openai_generator(&server)
            .generate_topic_units(&agent(), &brief)
            .await
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].kind, UnitKind::Video);
        assert_eq!(units[0].media_source.as_deref(), Some("generated"));
    }

    #[tokio::test]
    async fn test_anthropic_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/anthropic/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "{\"comment\": \"so true\"}"}],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ApiGeneratorConfig::claude("test-key", "claude-3-haiku-20240307");
        config.base_url = format!("{}/anthropic", server.uri());
        let generator = ApiGenerator::new(config).unwrap();
        let author = Agent::new("a2", "sol", "Sol");

        let comment = generator
            .generate_comment(&agent(), &author, "hi")
            .await
            .unwrap();
        assert_eq!(comment, "so true");
    }
}
