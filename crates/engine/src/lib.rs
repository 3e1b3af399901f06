//! dApp Discover Engine — favorites persistence and AI research pipeline
//!
//! Provides:
//! - Wallet-scoped ordered favorites store with optimistic-retry writes
//! - 3-strategy research pipeline with progressive fallback (agentic →
//!   structured schema → free text + heuristic parse)
//! - Output normalizer guaranteeing a well-typed research result
//! - Built-in dApp catalog for the discovery endpoints

pub mod api;
pub mod catalog;
pub mod favorites;
pub mod identity;
pub mod normalize;
pub mod research;
pub mod strategies;
pub mod types;

// Re-exports for convenience
pub use api::chat::{ChatClient, ChatMessage, ChatTransport, ProviderConfig};
pub use catalog::DAppCatalog;
pub use favorites::{FavoritesError, FavoritesStore};
pub use identity::{resolve_key, GLOBAL_NAMESPACE};
pub use normalize::{extract_json, normalize, normalize_text, FALLBACK_OVERVIEW};
pub use research::{
    fallback_result, run_research, ResearchProgress, ResearchStatus, StrategyAttempt,
};
pub use strategies::{
    default_strategies, AgenticStrategy, ResearchStrategy, SimpleTextStrategy, StrategyError,
    StructuredSchemaStrategy,
};
pub use types::*;
