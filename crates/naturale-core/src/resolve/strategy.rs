//! Translation strategies, tried in order until one succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{NaturaleError, NaturaleResult};
use crate::models::{MetadataSnapshot, TranslationContext, TranslationMethod};
use crate::query::{analyzer, compiler, validate};
use crate::resolve::ai::AiCollaborator;

pub const AI_CONFIDENCE: f64 = 0.9;
pub const BASIC_FALLBACK_CONFIDENCE: f64 = 0.3;

/// Everything a strategy may look at for one request.
pub struct StrategyInput<'a> {
    pub text: &'a str,
    pub snapshot: &'a MetadataSnapshot,
    pub context: &'a TranslationContext,
}

/// A successful attempt. Confidence is unclamped here.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub url: String,
    pub query_string: Option<String>,
    pub confidence: f64,
    pub method: TranslationMethod,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, input: &StrategyInput<'_>) -> NaturaleResult<Resolution>;
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

pub struct AiStrategy {
    collaborator: Arc<dyn AiCollaborator>,
}

impl AiStrategy {
    pub fn new(collaborator: Arc<dyn AiCollaborator>) -> Self {
        Self { collaborator }
    }
}

fn decoded_wiql(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "wiql")
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl Strategy for AiStrategy {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn attempt(&self, input: &StrategyInput<'_>) -> NaturaleResult<Resolution> {
        let suggestion = self
            .collaborator
            .suggest(input.text, input.snapshot, input.context)
            .await
            .map_err(|e| match e {
                NaturaleError::AiStrategy(_) => e,
                other => NaturaleError::AiStrategy(other.to_string()),
            })?;
        validate::validate_query_url(&suggestion.url)?;
        debug!(url = %suggestion.url, "AI suggestion accepted");
        Ok(Resolution {
            query_string: decoded_wiql(&suggestion.url),
            url: suggestion.url,
            confidence: AI_CONFIDENCE,
            method: TranslationMethod::Ai,
            reasoning: suggestion
                .reasoning
                .unwrap_or_else(|| "Generated by AI".to_string()),
            suggestions: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PatternStrategy;

#[async_trait]
impl Strategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "patterns"
    }

    async fn attempt(&self, input: &StrategyInput<'_>) -> NaturaleResult<Resolution> {
        let query = analyzer::analyze(input.text, input.snapshot, input.context);
        let compiled = compiler::compile(&query, input.snapshot, input.context)?;
        let method = if input.snapshot.is_fallback {
            TranslationMethod::PatternMatching
        } else {
            TranslationMethod::EnhancedPatterns
        };
        Ok(Resolution {
            url: compiled.url,
            query_string: Some(compiled.query_string),
            confidence: query.confidence,
            method,
            reasoning: query.reasoning_text(),
            suggestions: analyzer::suggestions(&query),
        })
    }
}

// ---------------------------------------------------------------------------
// Title search
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BasicFallbackStrategy;

#[async_trait]
impl Strategy for BasicFallbackStrategy {
    fn name(&self) -> &'static str {
        "basic-fallback"
    }

    async fn attempt(&self, input: &StrategyInput<'_>) -> NaturaleResult<Resolution> {
        let compiled = compiler::compile_basic(input.text, input.context)?;
        Ok(Resolution {
            url: compiled.url,
            query_string: Some(compiled.query_string),
            confidence: BASIC_FALLBACK_CONFIDENCE,
            method: TranslationMethod::BasicFallback,
            reasoning: "Using basic text search on work item titles".to_string(),
            suggestions: Vec::new(),
        })
    }
}
