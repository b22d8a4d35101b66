//! The public entry point: one request in, one [`TranslationResult`] out.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{BackendClient, MetadataSource, WorkItemReference};
use crate::config::NaturaleConfig;
use crate::errors::{NaturaleError, NaturaleResult};
use crate::metadata::{fallback_snapshot, CacheStatus, MetadataStore};
use crate::models::{ProjectTarget, TranslationContext, TranslationResult};
use crate::query::{guards, hosting};
use crate::resolve::ai::{AiCollaborator, AzureOpenAiCollaborator};
use crate::resolve::strategy::{
    AiStrategy, BasicFallbackStrategy, PatternStrategy, Resolution, Strategy, StrategyInput,
};

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn unresolved() -> NaturaleError {
    NaturaleError::MetadataFetch("Unable to determine organization and project".to_string())
}

pub struct Translator {
    store: MetadataStore,
    source: Arc<dyn MetadataSource>,
    strategies: Vec<Box<dyn Strategy>>,
}

impl Translator {
    /// Strategy order: AI (when given), pattern matching, title search.
    pub fn new(store: MetadataStore, source: Arc<dyn MetadataSource>, ai: Option<Arc<dyn AiCollaborator>>) -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
        if let Some(collaborator) = ai {
            strategies.push(Box::new(AiStrategy::new(collaborator)));
        }
        strategies.push(Box::new(PatternStrategy));
        strategies.push(Box::new(BasicFallbackStrategy));
        Self {
            store,
            source,
            strategies,
        }
    }

    /// Wire the reqwest backend, the cache and the optional AI client from
    /// configuration.
    pub fn from_config(config: &NaturaleConfig) -> NaturaleResult<Self> {
        let source: Arc<dyn MetadataSource> = Arc::new(BackendClient::new(&config.backend)?);
        let store = MetadataStore::from_config(Arc::clone(&source), &config.cache)?;
        let ai = match config.active_ai() {
            Some(ai_config) => {
                let collaborator: Arc<dyn AiCollaborator> = Arc::new(AzureOpenAiCollaborator::new(ai_config)?);
                Some(collaborator)
            }
            None => None,
        };
        info!(ai = ai.is_some(), persisted = config.cache.db_path.is_some(), "translator ready");
        Ok(Self::new(store, source, ai))
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Translate `text`. Failures are reported inside the result.
    pub async fn translate(&self, text: &str, context: &TranslationContext) -> TranslationResult {
        let start = Instant::now();
        let text = guards::truncate_query(text);
        if text.is_empty() {
            return TranslationResult::failure(NaturaleError::EmptyInput.to_string(), elapsed_ms(start));
        }

        let snapshot = match hosting::resolve_target(context) {
            Some(target) => self.store.get_snapshot(&target).await,
            None => {
                debug!("no project target, using fallback metadata");
                Arc::new(fallback_snapshot(
                    context.organization.as_deref().unwrap_or_default(),
                    context.project.as_deref().unwrap_or_default(),
                ))
            }
        };

        let input = StrategyInput {
            text: &text,
            snapshot: snapshot.as_ref(),
            context,
        };
        let mut last_error: Option<NaturaleError> = None;
        for strategy in &self.strategies {
            let attempt_start = Instant::now();
            match strategy.attempt(&input).await {
                Ok(resolution) => {
                    debug!(
                        strategy = strategy.name(),
                        elapsed_ms = elapsed_ms(attempt_start),
                        "strategy succeeded"
                    );
                    return success(resolution, elapsed_ms(start));
                }
                Err(err) => {
                    warn!(
                        strategy = strategy.name(),
                        elapsed_ms = elapsed_ms(attempt_start),
                        error = %err,
                        "strategy failed"
                    );
                    let recoverable = err.is_recoverable();
                    last_error = Some(err);
                    if !recoverable {
                        break;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "No translation strategy available".to_string());
        TranslationResult::failure(message, elapsed_ms(start))
    }

    fn target(context: &TranslationContext) -> NaturaleResult<ProjectTarget> {
        hosting::resolve_target(context).ok_or_else(unresolved)
    }

    /// Run a compiled query against the backend.
    pub async fn execute(&self, context: &TranslationContext, wiql: &str) -> NaturaleResult<Vec<WorkItemReference>> {
        let target = Self::target(context)?;
        self.source.execute_wiql(&target, wiql).await
    }

    /// Force a metadata fetch for the context's project.
    pub async fn refresh_metadata(&self, context: &TranslationContext) -> NaturaleResult<Option<CacheStatus>> {
        let target = Self::target(context)?;
        self.store.refresh(&target).await;
        self.store.cache_status(&target.key).await
    }

    pub async fn cache_status(&self, context: &TranslationContext) -> NaturaleResult<Option<CacheStatus>> {
        let target = Self::target(context)?;
        self.store.cache_status(&target.key).await
    }

    pub async fn cache_status_all(&self) -> NaturaleResult<Vec<CacheStatus>> {
        self.store.cache_status_all().await
    }

    /// Drop one project's metadata, or everything when `context` is `None`.
    /// Returns the number of entries removed.
    pub async fn clear_cache(&self, context: Option<&TranslationContext>) -> NaturaleResult<usize> {
        match context {
            Some(context) => {
                let target = Self::target(context)?;
                Ok(usize::from(self.store.invalidate(&target.key).await?))
            }
            None => self.store.clear().await,
        }
    }
}

fn success(resolution: Resolution, processing_time_ms: u64) -> TranslationResult {
    TranslationResult {
        success: true,
        url: Some(resolution.url),
        query_string: resolution.query_string,
        confidence: guards::clamp_confidence(resolution.confidence),
        method: resolution.method,
        reasoning: resolution.reasoning,
        error: None,
        processing_time_ms,
        suggestions: resolution.suggestions,
    }
}
