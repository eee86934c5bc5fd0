//! Margin calculator: per-broker per-year margin contribution.
//!
//!   net_points  = granted - |deducted|
//!   employer_ss = Σ employer-borne contributions with a service month in the year
//!   margin      = FYC - income - net_points - employer_ss
//!   margin_rate = margin / FYC, or 0 when FYC <= 0

use crate::{
    model::{Broker, PointsKind, PointsLedgerEntry, PointsSummary, SocialSecurityRecord},
    types::{AgentId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginRecord {
    pub agent_id: AgentId,
    pub year: Year,
    pub fyc: f64,
    pub income: f64,
    pub net_points: f64,
    pub employer_ss: f64,
    pub margin: f64,
    pub margin_rate: f64,
}

impl MarginRecord {
    pub fn compute(broker: &Broker, year: Year, net_points: f64, employer_ss: f64) -> Self {
        let figures = broker.year(year);
        let margin = figures.fyc - figures.income - net_points - employer_ss;
        Self {
            agent_id: broker.agent_id,
            year,
            fyc: figures.fyc,
            income: figures.income,
            net_points,
            employer_ss,
            margin,
            margin_rate: if figures.fyc > 0.0 {
                margin / figures.fyc
            } else {
                0.0
            },
        }
    }
}

/// A broker paired with its margin for the analysed year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMetrics {
    pub broker: Broker,
    pub margin: MarginRecord,
}

/// Points totals per broker for `year`, summarised from raw ledger entries.
/// Entries with no year or of an unrecognised kind do not count.
pub fn points_summary(
    entries: &[PointsLedgerEntry],
    year: Year,
) -> HashMap<AgentId, PointsSummary> {
    let mut totals: HashMap<AgentId, (f64, f64)> = HashMap::new();
    for entry in entries.iter().filter(|e| e.year == Some(year)) {
        let slot = totals.entry(entry.agent_id).or_default();
        match entry.kind {
            PointsKind::Grant => slot.0 += entry.amount,
            PointsKind::Deduction => slot.1 += entry.amount.abs(),
            PointsKind::Other => {}
        }
    }
    totals
        .into_iter()
        .map(|(id, (granted, used))| (id, PointsSummary::new(granted, used)))
        .collect()
}

/// Employer-borne social-security totals per matched broker for `year`.
/// Unmatched records and records without a service month are skipped.
pub fn employer_ss_summary(
    records: &[SocialSecurityRecord],
    year: Year,
) -> HashMap<AgentId, f64> {
    let mut totals: HashMap<AgentId, f64> = HashMap::new();
    for record in records {
        let Some(agent_id) = record.matched_agent_id else {
            continue;
        };
        if record.service_year() == Some(year) {
            *totals.entry(agent_id).or_default() += record.employer_total;
        }
    }
    totals
}

/// Attach a margin to every broker. Brokers missing from either summary
/// contribute zero points or social security.
pub fn enrich(
    brokers: Vec<Broker>,
    year: Year,
    points: &HashMap<AgentId, PointsSummary>,
    social_security: &HashMap<AgentId, f64>,
) -> Vec<BrokerMetrics> {
    brokers
        .into_iter()
        .map(|broker| {
            let net_points = points.get(&broker.agent_id).map_or(0.0, |p| p.net);
            let employer_ss = social_security.get(&broker.agent_id).copied().unwrap_or(0.0);
            let margin = MarginRecord::compute(&broker, year, net_points, employer_ss);
            BrokerMetrics { broker, margin }
        })
        .collect()
}

/// Margins keyed by (year, broker), used where a metric spans several years.
#[derive(Debug, Clone, Default)]
pub struct MarginBook {
    by_year: HashMap<Year, HashMap<AgentId, MarginRecord>>,
}

impl MarginBook {
    pub fn insert(&mut self, record: MarginRecord) {
        self.by_year
            .entry(record.year)
            .or_default()
            .insert(record.agent_id, record);
    }

    pub fn get(&self, agent_id: AgentId, year: Year) -> Option<&MarginRecord> {
        self.by_year.get(&year).and_then(|m| m.get(&agent_id))
    }

    /// Margin for the broker and year; 0 when never computed.
    pub fn margin(&self, agent_id: AgentId, year: Year) -> f64 {
        self.get(agent_id, year).map_or(0.0, |r| r.margin)
    }
}
