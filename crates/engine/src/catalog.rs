//! Built-in dApp catalog
//!
//! Static catalogue of well-known dApps across categories, backing the
//! random-pick and trending discovery endpoints. A third-party aggregator can
//! replace this without touching the rest of the engine.

use crate::types::{DAppRecord, DAppStats};
use rand::seq::SliceRandom;

/// Catalog with random and trending lookups
pub struct DAppCatalog {
    entries: Vec<DAppRecord>,
}

impl DAppCatalog {
    pub fn new() -> Self {
        Self {
            entries: builtin_catalog(),
        }
    }

    pub fn with_entries(entries: Vec<DAppRecord>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Random pick, optionally restricted to a category (case-insensitive).
    /// `None` when the category matches nothing.
    pub fn get_random(&self, category: Option<&str>) -> Option<DAppRecord> {
        let mut rng = rand::thread_rng();
        match category {
            Some(category) => {
                let matching: Vec<&DAppRecord> = self
                    .entries
                    .iter()
                    .filter(|d| d.category.eq_ignore_ascii_case(category))
                    .collect();
                matching.choose(&mut rng).map(|d| (*d).clone())
            }
            None => self.entries.choose(&mut rng).cloned(),
        }
    }

    /// Top entries by 24h users, descending
    pub fn get_trending(&self, limit: usize) -> Vec<DAppRecord> {
        let mut sorted: Vec<DAppRecord> = self.entries.clone();
        sorted.sort_by_key(|d| {
            std::cmp::Reverse(d.stats.as_ref().and_then(|s| s.users_24h).unwrap_or(0))
        });
        sorted.truncate(limit);
        sorted
    }

    pub fn get_by_id(&self, id: &str) -> Option<&DAppRecord> {
        self.entries.iter().find(|d| d.id == id)
    }
}

impl Default for DAppCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn entry(
    id: &str,
    name: &str,
    category: &str,
    subcategory: &str,
    description: &str,
    website: &str,
    chains: &[&str],
    tags: &[&str],
    users_24h: u64,
    volume_24h: f64,
    rating: f64,
) -> DAppRecord {
    DAppRecord {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        subcategory: Some(subcategory.to_string()),
        description: Some(description.to_string()),
        website: Some(website.to_string()),
        image: None,
        chains: chains.iter().map(|c| c.to_string()).collect(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        stats: Some(DAppStats {
            users_24h: Some(users_24h),
            volume_24h: Some(volume_24h),
            rating: Some(rating),
        }),
    }
}

/// The built-in static catalogue
pub fn builtin_catalog() -> Vec<DAppRecord> {
    vec![
        entry(
            "uniswap",
            "Uniswap",
            "DeFi",
            "DEX",
            "Automated market maker for permissionless token swaps.",
            "https://uniswap.org",
            &["ethereum", "arbitrum", "optimism", "polygon"],
            &["amm", "swap", "liquidity"],
            310_000,
            1_450_000_000.0,
            4.8,
        ),
        entry(
            "aave",
            "Aave",
            "DeFi",
            "Lending",
            "Non-custodial liquidity protocol for lending and borrowing.",
            "https://aave.com",
            &["ethereum", "avalanche", "polygon"],
            &["lending", "borrowing", "flash-loans"],
            42_000,
            320_000_000.0,
            4.7,
        ),
        entry(
            "curve",
            "Curve Finance",
            "DeFi",
            "DEX",
            "Stableswap AMM optimized for like-priced assets.",
            "https://curve.fi",
            &["ethereum", "arbitrum"],
            &["amm", "stablecoins"],
            18_000,
            210_000_000.0,
            4.4,
        ),
        entry(
            "lido",
            "Lido",
            "DeFi",
            "Liquid Staking",
            "Liquid staking for ETH and other proof-of-stake assets.",
            "https://lido.fi",
            &["ethereum"],
            &["staking", "steth"],
            9_500,
            95_000_000.0,
            4.6,
        ),
        entry(
            "gmx",
            "GMX",
            "DeFi",
            "Perpetuals",
            "Decentralized perpetual exchange with low swap fees.",
            "https://gmx.io",
            &["arbitrum", "avalanche"],
            &["perps", "leverage"],
            26_000,
            480_000_000.0,
            4.3,
        ),
        entry(
            "opensea",
            "OpenSea",
            "NFT",
            "Marketplace",
            "Marketplace for NFTs across many chains.",
            "https://opensea.io",
            &["ethereum", "polygon", "base"],
            &["nft", "marketplace"],
            120_000,
            18_000_000.0,
            4.2,
        ),
        entry(
            "blur",
            "Blur",
            "NFT",
            "Marketplace",
            "Pro-trader NFT marketplace and aggregator.",
            "https://blur.io",
            &["ethereum"],
            &["nft", "aggregator"],
            15_000,
            24_000_000.0,
            4.0,
        ),
        entry(
            "axie-infinity",
            "Axie Infinity",
            "Gaming",
            "Play-to-Earn",
            "Battle, breed, and trade fantasy creatures called Axies.",
            "https://axieinfinity.com",
            &["ronin"],
            &["gaming", "p2e"],
            88_000,
            3_200_000.0,
            4.1,
        ),
        entry(
            "ens",
            "ENS",
            "Infrastructure",
            "Naming",
            "Decentralized naming: human-readable names for wallets and sites.",
            "https://ens.domains",
            &["ethereum"],
            &["identity", "naming"],
            11_000,
            600_000.0,
            4.7,
        ),
        entry(
            "lens-protocol",
            "Lens Protocol",
            "Social",
            "Social Graph",
            "Composable, user-owned social graph.",
            "https://lens.xyz",
            &["polygon"],
            &["social", "graph"],
            34_000,
            150_000.0,
            4.2,
        ),
        entry(
            "farcaster",
            "Farcaster",
            "Social",
            "Protocol",
            "Sufficiently decentralized social network protocol.",
            "https://farcaster.xyz",
            &["optimism", "base"],
            &["social", "casts"],
            62_000,
            90_000.0,
            4.5,
        ),
        entry(
            "compound",
            "Compound",
            "DeFi",
            "Lending",
            "Algorithmic money markets for supplying and borrowing assets.",
            "https://compound.finance",
            &["ethereum", "base"],
            &["lending", "interest"],
            7_800,
            88_000_000.0,
            4.3,
        ),
    ]
}
