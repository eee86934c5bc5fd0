//! Region normalization: free-text region strings to canonical labels.
//!
//! RULE: the first alias (in table order) contained in the input wins.
//! Known ambiguity: when several aliases are substrings of the same input,
//! table order decides. "南京" resolves through the Beijing abbreviation
//! "京" before the Jiangsu city alias is reached. This is preserved as-is.

use crate::config::{default_region_aliases, RegionAliasConfig};
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct RegionNormalizer {
    /// Flattened (alias, canonical) pairs in resolution order.
    table: Vec<(String, String)>,
}

impl RegionNormalizer {
    pub fn from_aliases(entries: &[RegionAliasConfig]) -> Self {
        let table = entries
            .iter()
            .flat_map(|entry| {
                entry
                    .aliases
                    .iter()
                    .filter(|alias| !alias.is_empty())
                    .map(move |alias| (alias.clone(), entry.region.clone()))
            })
            .collect();
        Self { table }
    }

    /// Process-wide normalizer over the built-in alias table.
    pub fn standard() -> &'static RegionNormalizer {
        static STANDARD: OnceLock<RegionNormalizer> = OnceLock::new();
        STANDARD.get_or_init(|| RegionNormalizer::from_aliases(&default_region_aliases()))
    }

    /// Canonical label of the first alias contained in `text`; the input
    /// unchanged when nothing matches.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        self.table
            .iter()
            .find(|(alias, _)| text.contains(alias.as_str()))
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| text.to_string())
    }

    /// Regions are compatible when either side is blank or both sides
    /// normalize to the same label.
    pub fn compatible(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() || a == b {
            return true;
        }
        self.normalize(a) == self.normalize(b)
    }

    pub fn canonical_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for (_, canonical) in &self.table {
            if !labels.contains(&canonical.as_str()) {
                labels.push(canonical);
            }
        }
        labels
    }
}
