//! Types for the favorites store and research pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage statistics attached to a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppStats {
    pub users_24h: Option<u64>,
    pub volume_24h: Option<f64>,
    pub rating: Option<f64>,
}

/// A decentralized application record as served by the catalog.
///
/// Favoriting stores an immutable copy of this record, so later catalog
/// changes never rewrite a saved favorite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppRecord {
    pub id: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stats: Option<DAppStats>,
}

/// One saved favorite: dApp snapshot plus its ordering position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub dapp_id: String,
    pub dapp: DAppRecord,
    /// Ordering key only; resolved to a dense 1..N total order on every write
    pub position: i64,
    pub added_at: DateTime<Utc>,
}

/// Immutable input to the research pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub subject_name: String,
    pub subject_description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
}

impl ResearchRequest {
    pub fn for_dapp(dapp: &DAppRecord) -> Self {
        Self {
            subject_name: dapp.name.clone(),
            subject_description: dapp.description.clone(),
            category: Some(dapp.category.clone()),
            chains: dapp.chains.clone(),
        }
    }
}

/// A dated development/news item in a research result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Development {
    pub date: String,
    pub description: String,
}

/// Community sentiment, as a positive percentage in [0, 100]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub positive: f64,
    pub count: Option<u64>,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            positive: 50.0,
            count: None,
        }
    }
}

/// Canonical output of the research pipeline.
///
/// `overview` is always non-empty in any value returned to a caller; every
/// other field is optional and defaults to empty/absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchResult {
    pub overview: String,
    pub features: Vec<String>,
    pub developments: Vec<Development>,
    pub sentiment: Option<Sentiment>,
    pub competitors: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub future_outlook: Option<String>,
    pub security_audit: Option<String>,
    pub technical_analysis: Option<String>,
    pub investment_potential: Option<String>,
    pub risk_factors: Vec<String>,
    pub additional_resources: Vec<String>,
    pub community_insights: Option<String>,
}
