//! Naturale core library: translates natural-language work-item requests
//! into WIQL queries and backend query URLs.
//!
//! A [`Translator`] resolves the target project, obtains a metadata snapshot
//! through the [`MetadataStore`] cache, and tries its strategies in order: an
//! optional AI collaborator, the local pattern analyzer + compiler, and a
//! title search. It never returns an error; failures come back inside the
//! [`TranslationResult`].

pub mod backend;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod models;
pub mod query;
pub mod resolve;
pub mod store;

pub use config::NaturaleConfig;
pub use errors::{NaturaleError, NaturaleResult};
pub use metadata::{CacheStatus, MetadataStore};
pub use models::{HostShape, TranslationContext, TranslationMethod, TranslationResult};
pub use resolve::Translator;
