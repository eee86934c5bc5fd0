//! Efficiency trend engine: year-over-year per-broker averages.
//!
//! The active set for a year is always brokers with FYP > 0, whatever the
//! metric. A year with no active broker reports value 0 and no change,
//! and does not replace the previous year's carried average.

use crate::{
    error::{KpiError, KpiResult},
    group_aggregator::GroupField,
    margin::MarginBook,
    model::Broker,
    types::{round_to, Year, SUPPORTED_YEARS},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyMetric {
    AvgFyp,
    AvgApe,
    AvgFyc,
    AvgMargin,
}

impl EfficiencyMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            EfficiencyMetric::AvgFyp => "avg_fyp",
            EfficiencyMetric::AvgApe => "avg_ape",
            EfficiencyMetric::AvgFyc => "avg_fyc",
            EfficiencyMetric::AvgMargin => "avg_margin",
        }
    }

    pub fn needs_margins(&self) -> bool {
        matches!(self, EfficiencyMetric::AvgMargin)
    }

    fn value(&self, broker: &Broker, year: Year, margins: &MarginBook) -> f64 {
        let figures = broker.year(year);
        match self {
            EfficiencyMetric::AvgFyp => figures.fyp,
            EfficiencyMetric::AvgApe => figures.ape,
            EfficiencyMetric::AvgFyc => figures.fyc,
            EfficiencyMetric::AvgMargin => margins.margin(broker.agent_id, year),
        }
    }
}

impl FromStr for EfficiencyMetric {
    type Err = KpiError;

    fn from_str(s: &str) -> KpiResult<Self> {
        match s {
            "avg_fyp" => Ok(EfficiencyMetric::AvgFyp),
            "avg_ape" => Ok(EfficiencyMetric::AvgApe),
            "avg_fyc" => Ok(EfficiencyMetric::AvgFyc),
            "avg_margin" => Ok(EfficiencyMetric::AvgMargin),
            other => Err(KpiError::unsupported(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyPoint {
    pub year: Year,
    pub active_count: usize,
    pub value: f64,
    pub yoy_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTrend {
    pub group_name: String,
    pub points: Vec<EfficiencyPoint>,
}

/// Trend over the supported years, chronologically.
pub fn trend_for(
    brokers: &[&Broker],
    metric: EfficiencyMetric,
    margins: &MarginBook,
) -> Vec<EfficiencyPoint> {
    let mut previous: Option<f64> = None;
    let mut points = Vec::with_capacity(SUPPORTED_YEARS.len());

    for year in SUPPORTED_YEARS {
        let active: Vec<&Broker> = brokers.iter().copied().filter(|b| b.is_active(year)).collect();
        if active.is_empty() {
            points.push(EfficiencyPoint {
                year,
                active_count: 0,
                value: 0.0,
                yoy_change: None,
            });
            continue;
        }

        let total: f64 = active.iter().map(|b| metric.value(b, year, margins)).sum();
        let avg = total / active.len() as f64;
        let yoy_change = previous
            .filter(|prev| *prev != 0.0)
            .map(|prev| round_to((avg - prev) / prev, 4));

        points.push(EfficiencyPoint {
            year,
            active_count: active.len(),
            value: round_to(avg, 2),
            yoy_change,
        });
        previous = Some(avg);
    }
    points
}

pub fn efficiency_by_group(
    brokers: &[Broker],
    field: &GroupField,
    metric: EfficiencyMetric,
    margins: &MarginBook,
) -> Vec<GroupTrend> {
    let mut groups: BTreeMap<String, Vec<&Broker>> = BTreeMap::new();
    for broker in brokers {
        groups.entry(field.group_of(broker)).or_default().push(broker);
    }
    groups
        .into_iter()
        .map(|(group_name, members)| GroupTrend {
            group_name,
            points: trend_for(&members, metric, margins),
        })
        .collect()
}
