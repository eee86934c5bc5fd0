//! The KPI engine: wires the store, the identity matcher and analytics.
//!
//! INGESTION ORDER (fixed):
//!   1. Coerce raw rows into typed records.
//!   2. Match social-security records against the known brokers
//!      (stored brokers overlaid with the batch's brokers).
//!   3. Persist the batch in one transaction.
//!
//! RULES:
//!   - A stored `matched_agent_id` always names a known broker.
//!   - Analytics only read through the store's KpiSource impl.

use crate::{
    analytics::KpiAnalytics,
    config::KpiConfig,
    error::KpiResult,
    filter::BrokerFilter,
    identity_matcher::{IdentityMatcher, MatchReport},
    ingest::{IngestBatch, RawBatch},
    model::Broker,
    store::{KpiStore, SaveSummary},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub save: SaveSummary,
    pub report: MatchReport,
}

pub struct KpiEngine {
    pub config: KpiConfig,
    pub store: KpiStore,
    matcher: IdentityMatcher,
}

impl KpiEngine {
    pub fn build(store: KpiStore, config: KpiConfig) -> Self {
        let matcher = IdentityMatcher::new(&config);
        let store = store.with_tiers(config.tiers.clone());
        Self {
            config,
            store,
            matcher,
        }
    }

    /// In-memory store, migrated, default configuration.
    pub fn build_test() -> KpiResult<Self> {
        let store = KpiStore::in_memory()?;
        store.migrate()?;
        Ok(Self::build(store, KpiConfig::default_test()))
    }

    pub fn matcher(&self) -> &IdentityMatcher {
        &self.matcher
    }

    pub fn ingest(&self, raw: &RawBatch) -> KpiResult<IngestOutcome> {
        let batch = IngestBatch::from_raw(raw, &self.config);
        self.ingest_batch(batch)
    }

    /// Match and persist an already coerced batch.
    pub fn ingest_batch(&self, mut batch: IngestBatch) -> KpiResult<IngestOutcome> {
        if !batch.social_security.is_empty() {
            let known = self.known_brokers(&batch.brokers)?;
            let records = std::mem::take(&mut batch.social_security);
            batch.social_security = self.matcher.match_records(records, &known);
        }
        let report = self.matcher.report(&batch.social_security);
        let save = self.store.save_batch(&batch)?;
        Ok(IngestOutcome { save, report })
    }

    /// Stored brokers with the incoming ones layered on top, by id.
    fn known_brokers(&self, incoming: &[Broker]) -> KpiResult<Vec<Broker>> {
        let mut by_id: BTreeMap<_, Broker> = self
            .store
            .brokers(&BrokerFilter::default(), self.config.default_year)?
            .into_iter()
            .map(|b| (b.agent_id, b))
            .collect();
        for broker in incoming {
            by_id.insert(broker.agent_id, broker.clone());
        }
        Ok(by_id.into_values().collect())
    }

    pub fn analytics(&self) -> KpiAnalytics<'_, KpiStore> {
        KpiAnalytics::new(&self.store, &self.config)
    }

    pub fn clear(&self) -> KpiResult<()> {
        self.store.clear_all()
    }
}
