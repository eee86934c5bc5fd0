//! Entities handed over by the ingestion collaborator and persisted by
//! the store.

use crate::types::{is_supported_year, AgentId, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One year's performance figures for a broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct YearFigures {
    pub income: f64,
    pub fyp: f64,
    pub ape: f64,
    pub fyc: f64,
    pub md_qualified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    pub agent_id: AgentId,
    /// Display name. Absent in the canonical extract; only brokers that
    /// carry one take part in phonetic matching.
    pub name: Option<String>,
    pub region: Option<String>,
    pub education: Option<String>,
    pub years_of_service: Option<i64>,
    pub personal_level: Option<String>,
    pub manager_level: Option<String>,
    pub director_level: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub join_date: Option<String>,
    pub join_year: Option<Year>,
    pub team_leader_id: Option<AgentId>,
    pub is_peer: Option<String>,
    pub figures: BTreeMap<Year, YearFigures>,
}

impl Broker {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            ..Default::default()
        }
    }

    /// Figures for `year`; all-zero outside the supported window or when
    /// the extract had no value.
    pub fn year(&self, year: Year) -> YearFigures {
        self.figures.get(&year).copied().unwrap_or_default()
    }

    /// Set a year's figures. Years outside the supported window are ignored.
    pub fn set_year(&mut self, year: Year, figures: YearFigures) {
        if is_supported_year(year) {
            self.figures.insert(year, figures);
        }
    }

    pub fn with_year(mut self, year: Year, figures: YearFigures) -> Self {
        self.set_year(year, figures);
        self
    }

    pub fn is_active(&self, year: Year) -> bool {
        self.year(year).fyp > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsKind {
    Grant,
    Deduction,
    Other,
}

impl PointsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsKind::Grant => "grant",
            PointsKind::Deduction => "deduction",
            PointsKind::Other => "other",
        }
    }

    pub fn from_stored(s: &str) -> Self {
        match s {
            "grant" => PointsKind::Grant,
            "deduction" => PointsKind::Deduction,
            _ => PointsKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLedgerEntry {
    pub agent_id: AgentId,
    pub is_active: Option<String>,
    pub kind: PointsKind,
    pub amount: f64,
    pub category: Option<String>,
    pub director_team_amount: f64,
    pub transaction_time: Option<String>,
    pub year: Option<Year>,
    pub channel: Option<String>,
    pub order_name: Option<String>,
    pub order_id: Option<String>,
    pub remark: Option<String>,
}

impl PointsLedgerEntry {
    pub fn new(agent_id: AgentId, kind: PointsKind, amount: f64, year: Year) -> Self {
        Self {
            agent_id,
            is_active: None,
            kind,
            amount,
            category: None,
            director_team_amount: 0.0,
            transaction_time: None,
            year: Some(year),
            channel: None,
            order_name: None,
            order_id: None,
            remark: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSecurityRecord {
    pub name: String,
    pub bill_name: Option<String>,
    /// Normalized `YYYY-MM`.
    pub service_month: Option<String>,
    pub employer_total: f64,
    pub personal_total: f64,
    pub total: f64,
    pub region: Option<String>,
    pub matched_agent_id: Option<AgentId>,
}

impl SocialSecurityRecord {
    pub fn new(name: &str, region: &str, service_month: &str, employer_total: f64) -> Self {
        Self {
            name: name.to_string(),
            bill_name: None,
            service_month: Some(service_month.to_string()),
            employer_total,
            personal_total: 0.0,
            total: employer_total,
            region: (!region.is_empty()).then(|| region.to_string()),
            matched_agent_id: None,
        }
    }

    /// Year of the service month, when it is parseable.
    pub fn service_year(&self) -> Option<Year> {
        self.service_month
            .as_deref()
            .and_then(|m| m.get(0..4))
            .and_then(|y| y.parse().ok())
    }
}

/// Per-broker points totals for one year. `used` is the absolute value
/// of all deductions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointsSummary {
    pub granted: f64,
    pub used: f64,
    pub net: f64,
}

impl PointsSummary {
    pub fn new(granted: f64, used: f64) -> Self {
        Self {
            granted,
            used,
            net: granted - used,
        }
    }
}
