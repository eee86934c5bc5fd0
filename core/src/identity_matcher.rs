//! Identity matcher: resolves social-security records to broker ids.
//!
//! Rules, first hit wins:
//!   1. Exact composite key: phonetic(name) + normalized(region).
//!   2. Same phonetic key, any region, gated by region compatibility.
//!   3. Normalized edit-distance similarity >= threshold against any
//!      indexed phonetic key, gated by region compatibility.
//!
//! Ties are broken by the lowest agent id. Rules 2 and 3 scan the whole
//! phonetic index, so each miss costs O(brokers).
//!
//! Limitation: only brokers that carry a display name get a phonetic
//! entry. The canonical broker extract has no name column, so in practice
//! the phonetic index is often empty and every record stays unmatched.

use crate::{
    config::KpiConfig,
    model::{Broker, SocialSecurityRecord},
    phonetic::{phonetic_key, similarity},
    region::RegionNormalizer,
    types::AgentId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Composite lookup key: phonetic name key plus canonical region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub phonetic: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Phonetic(IdentityKey),
    /// Raw per-broker entry; never matched by name rules.
    Sentinel(AgentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExactKey,
    PhoneticAnyRegion,
    Fuzzy,
    /// Kept an upstream-assigned id that names a known broker.
    Preassigned,
}

#[derive(Debug, Clone, Default)]
pub struct BrokerIndex {
    keys: HashMap<IndexKey, AgentId>,
    /// Phonetic entries ordered by ascending agent id (scan order).
    scan: Vec<(IdentityKey, AgentId)>,
}

impl BrokerIndex {
    pub fn build(brokers: &[Broker], regions: &RegionNormalizer) -> Self {
        let mut ordered: Vec<&Broker> = brokers.iter().collect();
        ordered.sort_by_key(|b| b.agent_id);

        let mut index = BrokerIndex::default();
        for broker in ordered {
            let region = regions.normalize(broker.region.as_deref().unwrap_or(""));
            if let Some(name) = broker.name.as_deref() {
                let phonetic = phonetic_key(name);
                if !phonetic.is_empty() {
                    let key = IdentityKey { phonetic, region };
                    index
                        .keys
                        .entry(IndexKey::Phonetic(key.clone()))
                        .or_insert(broker.agent_id);
                    index.scan.push((key, broker.agent_id));
                }
            }
            index
                .keys
                .insert(IndexKey::Sentinel(broker.agent_id), broker.agent_id);
        }
        index
    }

    pub fn lookup(&self, key: &IdentityKey) -> Option<AgentId> {
        self.keys.get(&IndexKey::Phonetic(key.clone())).copied()
    }

    pub fn contains_broker(&self, agent_id: AgentId) -> bool {
        self.keys.contains_key(&IndexKey::Sentinel(agent_id))
    }

    pub fn phonetic_entries(&self) -> &[(IdentityKey, AgentId)] {
        &self.scan
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedSample {
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub total: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub match_rate: f64,
    pub unmatched_samples: Vec<UnmatchedSample>,
}

pub struct IdentityMatcher {
    regions: RegionNormalizer,
    threshold: f64,
    sample_limit: usize,
}

impl IdentityMatcher {
    pub fn new(config: &KpiConfig) -> Self {
        Self {
            regions: RegionNormalizer::from_aliases(&config.region_aliases),
            threshold: config.match_threshold,
            sample_limit: config.unmatched_sample_limit,
        }
    }

    pub fn build_index(&self, brokers: &[Broker]) -> BrokerIndex {
        BrokerIndex::build(brokers, &self.regions)
    }

    /// Attach `matched_agent_id` to every record. Records that no rule
    /// resolves keep a preassigned id only when it names a known broker;
    /// otherwise they end up with `None`.
    pub fn match_records(
        &self,
        mut records: Vec<SocialSecurityRecord>,
        brokers: &[Broker],
    ) -> Vec<SocialSecurityRecord> {
        let index = self.build_index(brokers);
        let mut by_rule: HashMap<MatchRule, usize> = HashMap::new();

        for record in &mut records {
            let resolved = self.resolve(&record.name, record.region.as_deref(), &index);
            let resolved = resolved.or_else(|| {
                record
                    .matched_agent_id
                    .filter(|id| index.contains_broker(*id))
                    .map(|id| (id, MatchRule::Preassigned))
            });
            if let Some((_, rule)) = resolved {
                *by_rule.entry(rule).or_default() += 1;
            }
            record.matched_agent_id = resolved.map(|(id, _)| id);
        }

        let report = self.report(&records);
        log::info!(
            "matcher: {} records, {} matched ({:.1}%), {} unmatched; exact={} phonetic={} fuzzy={} preassigned={}",
            report.total,
            report.matched_count,
            report.match_rate * 100.0,
            report.unmatched_count,
            by_rule.get(&MatchRule::ExactKey).unwrap_or(&0),
            by_rule.get(&MatchRule::PhoneticAnyRegion).unwrap_or(&0),
            by_rule.get(&MatchRule::Fuzzy).unwrap_or(&0),
            by_rule.get(&MatchRule::Preassigned).unwrap_or(&0),
        );
        records
    }

    /// Resolve a single (name, region) pair against a prepared index.
    pub fn resolve(
        &self,
        name: &str,
        region: Option<&str>,
        index: &BrokerIndex,
    ) -> Option<(AgentId, MatchRule)> {
        if name.trim().is_empty() {
            return None;
        }
        let phonetic = phonetic_key(name);
        if phonetic.is_empty() {
            return None;
        }
        let region = self.regions.normalize(region.unwrap_or(""));

        let key = IdentityKey {
            phonetic: phonetic.clone(),
            region: region.clone(),
        };
        if let Some(id) = index.lookup(&key) {
            return Some((id, MatchRule::ExactKey));
        }

        let entries = index.phonetic_entries();
        if let Some((_, id)) = entries
            .iter()
            .find(|(k, _)| k.phonetic == phonetic && self.regions.compatible(&region, &k.region))
        {
            return Some((*id, MatchRule::PhoneticAnyRegion));
        }

        entries
            .iter()
            .find(|(k, _)| {
                self.is_similar(&phonetic, &k.phonetic)
                    && self.regions.compatible(&region, &k.region)
            })
            .map(|(_, id)| (*id, MatchRule::Fuzzy))
    }

    fn is_similar(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        // Tolerance keeps exact-threshold ratios such as 4/5 from failing
        // on float representation.
        similarity(a, b) + 1e-9 >= self.threshold
    }

    pub fn report(&self, records: &[SocialSecurityRecord]) -> MatchReport {
        let total = records.len();
        let matched_count = records
            .iter()
            .filter(|r| r.matched_agent_id.is_some())
            .count();
        let unmatched_samples = records
            .iter()
            .filter(|r| r.matched_agent_id.is_none())
            .take(self.sample_limit)
            .map(|r| UnmatchedSample {
                name: r.name.clone(),
                region: r.region.clone(),
            })
            .collect();
        MatchReport {
            total,
            matched_count,
            unmatched_count: total - matched_count,
            match_rate: if total > 0 {
                matched_count as f64 / total as f64
            } else {
                0.0
            },
            unmatched_samples,
        }
    }
}
