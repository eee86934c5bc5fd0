//! Retention cohort engine.
//!
//! Brokers are cohorted by join year inside each group. A cohort's base
//! year is its join year, pinned up to the earliest data year for legacy
//! joins. The base-active set (FYP > 0 in the base year) is fixed: later
//! years only count members of that set, nobody re-enters or leaves the
//! denominator. Ratios are not clamped; amount retention may exceed 1.

use crate::{
    group_aggregator::GroupField,
    model::Broker,
    types::{round_to, Year, EARLIEST_DATA_YEAR, SUPPORTED_YEARS},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionYear {
    pub year: Year,
    pub years_after_join: i32,
    pub active_count: usize,
    pub fyp: f64,
    pub count_retention: f64,
    pub amount_retention: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionCohort {
    pub join_year: Year,
    pub base_year: Year,
    pub base_count: usize,
    pub base_fyp: f64,
    pub years: Vec<RetentionYear>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRetention {
    pub group_name: String,
    pub cohorts: Vec<RetentionCohort>,
}

pub fn base_year_for(join_year: Year) -> Year {
    join_year.max(EARLIEST_DATA_YEAR)
}

/// Cohorts of `brokers` by join year, ascending. Brokers without a join
/// year are left out; cohorts with nobody active in the base year are
/// dropped.
pub fn cohorts_for(brokers: &[&Broker]) -> Vec<RetentionCohort> {
    let mut by_join_year: BTreeMap<Year, Vec<&Broker>> = BTreeMap::new();
    for broker in brokers {
        if let Some(join_year) = broker.join_year {
            by_join_year.entry(join_year).or_default().push(broker);
        }
    }

    by_join_year
        .into_iter()
        .filter_map(|(join_year, members)| cohort(join_year, &members))
        .collect()
}

fn cohort(join_year: Year, members: &[&Broker]) -> Option<RetentionCohort> {
    let base_year = base_year_for(join_year);
    let base_active: Vec<&Broker> = members
        .iter()
        .copied()
        .filter(|b| b.is_active(base_year))
        .collect();
    if base_active.is_empty() {
        return None;
    }
    let base_count = base_active.len();
    let base_fyp: f64 = base_active.iter().map(|b| b.year(base_year).fyp).sum();

    let years = SUPPORTED_YEARS
        .iter()
        .copied()
        .filter(|y| *y >= base_year)
        .map(|year| {
            let current: Vec<&Broker> = base_active
                .iter()
                .copied()
                .filter(|b| b.is_active(year))
                .collect();
            let fyp: f64 = current.iter().map(|b| b.year(year).fyp).sum();
            RetentionYear {
                year,
                years_after_join: year - base_year,
                active_count: current.len(),
                fyp: round_to(fyp, 2),
                count_retention: round_to(current.len() as f64 / base_count as f64, 4),
                amount_retention: if base_fyp > 0.0 {
                    round_to(fyp / base_fyp, 4)
                } else {
                    0.0
                },
            }
        })
        .collect();

    Some(RetentionCohort {
        join_year,
        base_year,
        base_count,
        base_fyp: round_to(base_fyp, 2),
        years,
    })
}

/// Retention cohorts for every group, in group-name order.
pub fn retention_by_group(brokers: &[Broker], field: &GroupField) -> Vec<GroupRetention> {
    let mut groups: BTreeMap<String, Vec<&Broker>> = BTreeMap::new();
    for broker in brokers {
        groups.entry(field.group_of(broker)).or_default().push(broker);
    }
    groups
        .into_iter()
        .map(|(group_name, members)| GroupRetention {
            group_name,
            cohorts: cohorts_for(&members),
        })
        .collect()
}
