//! Group aggregator: grouped and cross-tabulated margin statistics.
//!
//! Brokers are partitioned by the string value of a grouping attribute.
//! Missing or blank values share the "unknown" bucket. Monetary sums and
//! averages are rounded to 2 decimals, rates to 4.

use crate::{
    margin::BrokerMetrics,
    model::Broker,
    types::{round_to, Year, TOTAL_COLUMN, UNKNOWN_GROUP},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Region,
    JoinYear,
    PersonalLevel,
    ManagerLevel,
    DirectorLevel,
    Education,
    IsPeer,
    YearsOfService,
    /// A name no attribute answers to. Every broker lands in "unknown".
    Unrecognized(String),
}

impl GroupField {
    pub fn from_name(name: &str) -> Self {
        match name {
            "region" => GroupField::Region,
            "join_year" => GroupField::JoinYear,
            "personal_level" => GroupField::PersonalLevel,
            "manager_level" => GroupField::ManagerLevel,
            "director_level" => GroupField::DirectorLevel,
            "education" => GroupField::Education,
            "is_peer" => GroupField::IsPeer,
            "years" | "years_of_service" => GroupField::YearsOfService,
            other => {
                log::warn!("aggregator: unrecognized group field '{other}', bucketing as unknown");
                GroupField::Unrecognized(other.to_string())
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GroupField::Region => "region",
            GroupField::JoinYear => "join_year",
            GroupField::PersonalLevel => "personal_level",
            GroupField::ManagerLevel => "manager_level",
            GroupField::DirectorLevel => "director_level",
            GroupField::Education => "education",
            GroupField::IsPeer => "is_peer",
            GroupField::YearsOfService => "years",
            GroupField::Unrecognized(name) => name,
        }
    }

    /// Raw attribute value, `None` when absent.
    pub fn value_of(&self, broker: &Broker) -> Option<String> {
        match self {
            GroupField::Region => broker.region.clone(),
            GroupField::JoinYear => broker.join_year.map(|y| y.to_string()),
            GroupField::PersonalLevel => broker.personal_level.clone(),
            GroupField::ManagerLevel => broker.manager_level.clone(),
            GroupField::DirectorLevel => broker.director_level.clone(),
            GroupField::Education => broker.education.clone(),
            GroupField::IsPeer => broker.is_peer.clone(),
            GroupField::YearsOfService => broker.years_of_service.map(|y| y.to_string()),
            GroupField::Unrecognized(_) => None,
        }
    }

    /// Bucket label: the attribute value or "unknown".
    pub fn group_of(&self, broker: &Broker) -> String {
        self.value_of(broker)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_name: String,
    pub broker_count: usize,
    pub total_fyc: f64,
    pub total_income: f64,
    pub total_points: f64,
    pub total_social_security: f64,
    pub total_margin: f64,
    pub margin_rate: f64,
    pub avg_fyp: f64,
    pub avg_ape: f64,
    pub avg_fyc: f64,
    pub avg_margin: f64,
}

impl GroupStats {
    /// Placeholder for an empty cell.
    pub fn zero(group_name: &str) -> Self {
        Self {
            group_name: group_name.to_string(),
            broker_count: 0,
            total_fyc: 0.0,
            total_income: 0.0,
            total_points: 0.0,
            total_social_security: 0.0,
            total_margin: 0.0,
            margin_rate: 0.0,
            avg_fyp: 0.0,
            avg_ape: 0.0,
            avg_fyc: 0.0,
            avg_margin: 0.0,
        }
    }

    pub fn compute(group_name: &str, members: &[&BrokerMetrics], year: Year) -> Self {
        let count = members.len();
        if count == 0 {
            return Self::zero(group_name);
        }

        let mut total_fyc = 0.0;
        let mut total_income = 0.0;
        let mut total_fyp = 0.0;
        let mut total_ape = 0.0;
        let mut total_points = 0.0;
        let mut total_ss = 0.0;
        let mut total_margin = 0.0;
        for m in members {
            let figures = m.broker.year(year);
            total_fyc += figures.fyc;
            total_income += figures.income;
            total_fyp += figures.fyp;
            total_ape += figures.ape;
            total_points += m.margin.net_points;
            total_ss += m.margin.employer_ss;
            total_margin += m.margin.margin;
        }

        let n = count as f64;
        Self {
            group_name: group_name.to_string(),
            broker_count: count,
            total_fyc: round_to(total_fyc, 2),
            total_income: round_to(total_income, 2),
            total_points: round_to(total_points, 2),
            total_social_security: round_to(total_ss, 2),
            total_margin: round_to(total_margin, 2),
            margin_rate: if total_fyc > 0.0 {
                round_to(total_margin / total_fyc, 4)
            } else {
                0.0
            },
            avg_fyp: round_to(total_fyp / n, 2),
            avg_ape: round_to(total_ape / n, 2),
            avg_fyc: round_to(total_fyc / n, 2),
            avg_margin: round_to(total_margin / n, 2),
        }
    }
}

fn partition<'a>(
    entities: &'a [BrokerMetrics],
    field: &GroupField,
) -> BTreeMap<String, Vec<&'a BrokerMetrics>> {
    let mut groups: BTreeMap<String, Vec<&BrokerMetrics>> = BTreeMap::new();
    for entity in entities {
        groups
            .entry(field.group_of(&entity.broker))
            .or_default()
            .push(entity);
    }
    groups
}

/// One stats row per group, sorted by margin rate descending. Equal rates
/// keep group-name order.
pub fn aggregate(entities: &[BrokerMetrics], field: &GroupField, year: Year) -> Vec<GroupStats> {
    let mut result: Vec<GroupStats> = partition(entities, field)
        .into_iter()
        .map(|(name, members)| GroupStats::compute(&name, &members, year))
        .collect();
    result.sort_by(|a, b| b.margin_rate.total_cmp(&a.margin_rate));
    result
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRow {
    pub row_name: String,
    /// One cell per column, in `CrossTab::columns` order, ending with the
    /// row total.
    pub cells: Vec<GroupStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTab {
    pub row_field: String,
    pub col_field: String,
    pub columns: Vec<String>,
    pub rows: Vec<CrossRow>,
}

/// Row x column tabulation. Rows and columns are sorted by name, missing
/// cells hold a zero placeholder and every row ends with a "Total" cell
/// computed over all of the row's members.
pub fn aggregate_cross(
    entities: &[BrokerMetrics],
    row_field: &GroupField,
    col_field: &GroupField,
    year: Year,
) -> CrossTab {
    let mut cells: BTreeMap<String, BTreeMap<String, Vec<&BrokerMetrics>>> = BTreeMap::new();
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for entity in entities {
        let row = row_field.group_of(&entity.broker);
        let col = col_field.group_of(&entity.broker);
        columns.insert(col.clone());
        cells.entry(row).or_default().entry(col).or_default().push(entity);
    }

    let rows = cells
        .iter()
        .map(|(row_name, row_cells)| {
            let mut out: Vec<GroupStats> = columns
                .iter()
                .map(|col| match row_cells.get(col) {
                    Some(members) => GroupStats::compute(col, members, year),
                    None => GroupStats::zero(col),
                })
                .collect();
            let all: Vec<&BrokerMetrics> = row_cells.values().flatten().copied().collect();
            out.push(GroupStats::compute(TOTAL_COLUMN, &all, year));
            CrossRow {
                row_name: row_name.clone(),
                cells: out,
            }
        })
        .collect();

    let mut columns: Vec<String> = columns.into_iter().collect();
    columns.push(TOTAL_COLUMN.to_string());

    CrossTab {
        row_field: row_field.name().to_string(),
        col_field: col_field.name().to_string(),
        columns,
        rows,
    }
}
