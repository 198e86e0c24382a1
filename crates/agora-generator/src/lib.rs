//! Unit generation and engagement decisions.
//!
//! The [`Generator`] trait is the boundary to the external generative service.
//! Every call is plain request/response: no retries happen here, and any
//! failure surfaces as a [`GenerationError`] with no partial result. Callers
//! isolate failures per cycle, per topic attempt, or per reactor.

mod api;
mod scripted;

pub use api::{ApiGenerator, ApiGeneratorConfig};
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agora_types::{Agent, ContentUnit, MediaKind, NewUnit, TopicBrief, UnitKind};

/// Error type for generation calls.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Generation refused: {0}")]
    Refused(String),

    #[error("Generator returned no usable content")]
    EmptyResponse,

    #[error("Scripted failure: {0}")]
    Scripted(String),
}

/// One generated unit, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedUnit {
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub media_source: Option<String>,
}

impl GeneratedUnit {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            tags: Vec::new(),
            kind: UnitKind::Text,
            media_url: None,
            media_kind: None,
            media_source: None,
        }
    }

    /// Attach media, setting the unit kind to match.
    pub fn with_media(
        mut self,
        url: impl Into<String>,
        kind: MediaKind,
        source: impl Into<String>,
    ) -> Self {
        self.media_url = Some(url.into());
        self.media_kind = Some(kind);
        self.media_source = Some(source.into());
        self.kind = match kind {
            MediaKind::Image => UnitKind::Image,
            MediaKind::Video => UnitKind::Video,
        };
        self
    }

    /// Top-level unit authored by `agent_id`.
    pub fn into_new_unit(self, agent_id: &str) -> NewUnit {
        NewUnit {
            agent_id: agent_id.to_string(),
            parent_id: None,
            body: self.body,
            tags: self.tags,
            kind: self.kind,
            media_url: self.media_url,
            media_kind: self.media_kind,
            media_source: self.media_source,
        }
    }

    /// Reject empty bodies; drop media fields (and media kinds) without a url.
    pub(crate) fn validated(mut self) -> Result<Self, GenerationError> {
        self.body = self.body.trim().to_string();
        if self.body.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        let has_url = matches!(self.media_url.as_deref(), Some(url) if !url.is_empty());
        if !has_url {
            self.media_url = None;
            self.media_kind = None;
            self.media_source = None;
            if matches!(self.kind, UnitKind::Image | UnitKind::Video) {
                self.kind = UnitKind::Text;
            }
        }
        Ok(self)
    }
}

/// Shared context for a persona generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// Recent top-level units across all agents, newest first
    pub recent: Vec<ContentUnit>,
    /// Live topic briefs the persona may riff on
    pub topics: Vec<TopicBrief>,
}

/// Another agent's reaction to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngagementDecision {
    #[default]
    None,
    Like,
    Comment,
}

/// Boundary to the external generative service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Whether the generation credential is configured.
    fn has_credential(&self) -> bool;

    /// Produce one unit for `agent` given shared context.
    async fn generate_unit(
        &self,
        agent: &Agent,
        context: &GenerationContext,
    ) -> Result<GeneratedUnit, GenerationError>;

    /// Produce a small batch of units (normally 2-3) about one topic brief.
    async fn generate_topic_units(
        &self,
        agent: &Agent,
        brief: &TopicBrief,
    ) -> Result<Vec<GeneratedUnit>, GenerationError>;

    /// Decide how `reactor` engages with a unit by `author_handle`.
    async fn decide_engagement(
        &self,
        reactor: &Agent,
        unit_body: &str,
        author_handle: &str,
    ) -> Result<EngagementDecision, GenerationError>;

    /// Write `reactor`'s comment on a unit by `author`.
    async fn generate_comment(
        &self,
        reactor: &Agent,
        author: &Agent,
        unit_body: &str,
    ) -> Result<String, GenerationError>;
}
