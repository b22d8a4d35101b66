//! Resolution orchestration: strategies, the AI collaborator and the
//! translator that ties them to the metadata cache.

pub mod ai;
pub mod strategy;
pub mod translator;

pub use ai::{AiCollaborator, AiSuggestion, AzureOpenAiCollaborator};
pub use strategy::{Resolution, Strategy, StrategyInput};
pub use translator::Translator;
