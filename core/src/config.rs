use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// Loaded from `data/insight_config.json` in production.
/// In tests, use `InsightConfig::default_test()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightConfig {
    /// Canonical attribution source; always preferred when comparable.
    pub primary_source: String,
    /// Ordered fallbacks used when the primary source is not comparable.
    pub fallback_sources: Vec<String>,
    /// Key names searched, in order, inside nested valuation structures.
    pub priority_keys: Vec<String>,
    /// Aggregate per-source differences at or below this magnitude are dropped.
    pub noise_threshold: f64,
    /// Manual handling time each processed vehicle would have cost.
    pub minutes_per_vehicle: u64,
    /// Record count at which aggregation fans out across worker threads.
    /// 0 keeps aggregation on the calling thread.
    #[serde(default)]
    pub parallel_threshold: usize,
    /// Window for the "recent activity" counter.
    pub recent_activity_days: i64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            primary_source: "KBB".into(),
            fallback_sources: vec![
                "rBook".into(),
                "J.D. Power".into(),
                "MMR".into(),
                "Black Book".into(),
            ],
            priority_keys: DEFAULT_PRIORITY_KEYS.iter().map(|k| k.to_string()).collect(),
            noise_threshold: 1e-6,
            minutes_per_vehicle: 11,
            parallel_threshold: 512,
            recent_activity_days: 7,
        }
    }
}

/// Nested-structure keys that carry a representative amount, most specific first.
pub const DEFAULT_PRIORITY_KEYS: &[&str] = &[
    "total", "Total", "overall", "Overall", "aggregate", "Aggregate",
    "value", "Value", "amount", "Amount", "current", "Current",
    "after", "After", "before", "Before", "retail", "Retail",
    "clean_retail", "cleanRetail", "Clean Retail", "cleanRetailValue",
    "clean_trade", "cleanTrade", "Clean Trade-In", "wholesale", "Wholesale",
];

impl InsightConfig {
    /// Load from a JSON file. Missing optional fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: InsightConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        log::debug!(
            "Loaded insight config from {path}: primary={}, {} fallbacks",
            config.primary_source,
            config.fallback_sources.len()
        );
        Ok(config)
    }

    /// Configuration used by tests. Parallel aggregation is disabled so
    /// every test runs the sequential fold unless it opts in.
    pub fn default_test() -> Self {
        Self {
            parallel_threshold: 0,
            ..Self::default()
        }
    }

    /// Attribution preference: primary first, then fallbacks in order.
    pub fn source_preference(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_source.as_str())
            .chain(self.fallback_sources.iter().map(String::as_str))
    }
}
