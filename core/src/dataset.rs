//! In-memory dataset: the full extract held in process.

use crate::{
    config::PremiumTier,
    error::KpiResult,
    filter::BrokerFilter,
    ingest::IngestBatch,
    margin::{employer_ss_summary, points_summary},
    model::{Broker, PointsLedgerEntry, PointsSummary, SocialSecurityRecord},
    source::KpiSource,
    types::{AgentId, Year},
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub brokers: BTreeMap<AgentId, Broker>,
    pub points: Vec<PointsLedgerEntry>,
    pub social_security: Vec<SocialSecurityRecord>,
    pub id_mapping: BTreeMap<String, AgentId>,
    tiers: Vec<PremiumTier>,
}

impl Dataset {
    pub fn new(tiers: Vec<PremiumTier>) -> Self {
        Self {
            tiers,
            ..Default::default()
        }
    }

    pub fn with_brokers(mut self, brokers: impl IntoIterator<Item = Broker>) -> Self {
        for broker in brokers {
            self.brokers.insert(broker.agent_id, broker);
        }
        self
    }

    pub fn with_points(mut self, entries: impl IntoIterator<Item = PointsLedgerEntry>) -> Self {
        self.points.extend(entries);
        self
    }

    pub fn with_social_security(
        mut self,
        records: impl IntoIterator<Item = SocialSecurityRecord>,
    ) -> Self {
        self.social_security.extend(records);
        self
    }

    /// Apply an ingestion batch: brokers upsert by id (last write wins),
    /// ledger and social-security records append.
    pub fn apply(&mut self, batch: IngestBatch) {
        for broker in batch.brokers {
            self.brokers.insert(broker.agent_id, broker);
        }
        self.points.extend(batch.points);
        self.social_security.extend(batch.social_security);
        self.id_mapping.extend(batch.id_mapping);
    }

    pub fn clear(&mut self) {
        self.brokers.clear();
        self.points.clear();
        self.social_security.clear();
        self.id_mapping.clear();
    }
}

fn retain_ids<V>(mut map: HashMap<AgentId, V>, ids: &[AgentId]) -> HashMap<AgentId, V> {
    if !ids.is_empty() {
        map.retain(|id, _| ids.contains(id));
    }
    map
}

impl KpiSource for Dataset {
    fn get_brokers(&self, filter: &BrokerFilter, year: Year) -> KpiResult<Vec<Broker>> {
        Ok(self
            .brokers
            .values()
            .filter(|b| filter.matches(b, year, &self.tiers))
            .cloned()
            .collect())
    }

    fn get_points_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, PointsSummary>> {
        Ok(retain_ids(points_summary(&self.points, year), ids))
    }

    fn get_social_security_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, f64>> {
        Ok(retain_ids(employer_ss_summary(&self.social_security, year), ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::default_tiers, model::PointsKind};

    #[test]
    fn apply_upserts_brokers_and_appends_records() {
        let mut data = Dataset::new(default_tiers());
        let mut first = Broker::new(1);
        first.region = Some("Beijing".into());
        let mut second = Broker::new(1);
        second.region = Some("Tianjin".into());

        data.apply(IngestBatch {
            brokers: vec![first],
            points: vec![PointsLedgerEntry::new(1, PointsKind::Grant, 10.0, 2024)],
            ..Default::default()
        });
        data.apply(IngestBatch {
            brokers: vec![second],
            points: vec![PointsLedgerEntry::new(1, PointsKind::Grant, 5.0, 2024)],
            ..Default::default()
        });

        assert_eq!(data.brokers.len(), 1);
        assert_eq!(data.brokers[&1].region.as_deref(), Some("Tianjin"));
        let points = data.get_points_summary(&[1], 2024).unwrap();
        assert_eq!(points[&1].granted, 15.0);
        assert!(data.get_points_summary(&[2], 2024).unwrap().is_empty());

        data.clear();
        assert!(data.brokers.is_empty() && data.points.is_empty());
    }
}
