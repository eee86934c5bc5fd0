//! Analytics facade: margin, retention and efficiency reports over any
//! `KpiSource`, plus flat tables for export.
//!
//! RULE: Every call recomputes from the source. Nothing is cached between
//! calls.

use crate::{
    config::KpiConfig,
    efficiency::{efficiency_by_group, EfficiencyMetric, GroupTrend},
    error::{KpiError, KpiResult},
    filter::BrokerFilter,
    group_aggregator::{aggregate, aggregate_cross, CrossTab, GroupField, GroupStats},
    margin::{enrich, BrokerMetrics, MarginBook, MarginRecord},
    model::Broker,
    retention::{retention_by_group, GroupRetention},
    source::KpiSource,
    types::{AgentId, Year, SUPPORTED_YEARS},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

/// Years-after-join axis reported alongside retention cohorts.
pub const YEARS_AFTER_JOIN: [i32; 4] = [1, 2, 3, 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MarginLayout {
    Grouped { groups: Vec<GroupStats> },
    Cross(CrossTab),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginAnalysis {
    pub year: Year,
    pub layout: MarginLayout,
    /// Stats over every selected broker; `None` when the selection is empty.
    pub summary: Option<GroupStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionAnalysis {
    pub groups: Vec<GroupRetention>,
    pub years_after_join: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyTrend {
    pub metric: EfficiencyMetric,
    pub groups: Vec<GroupTrend>,
    pub years: Vec<Year>,
}

// ── Export ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Margin,
    Retention,
    Efficiency,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Margin => "margin",
            ExportKind::Retention => "retention",
            ExportKind::Efficiency => "efficiency",
        }
    }
}

impl FromStr for ExportKind {
    type Err = KpiError;

    fn from_str(s: &str) -> KpiResult<Self> {
        match s {
            "margin" => Ok(ExportKind::Margin),
            "retention" => Ok(ExportKind::Retention),
            "efficiency" => Ok(ExportKind::Efficiency),
            other => Err(KpiError::unsupported(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    pub filter: BrokerFilter,
    pub group_by: String,
    pub year: Year,
    pub metric: String,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            filter: BrokerFilter::default(),
            group_by: "region".into(),
            year: 2024,
            metric: EfficiencyMetric::AvgFyp.as_str().into(),
        }
    }
}

/// Header plus rows; cells are JSON values so absent figures stay `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub kind: ExportKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

// ── Facade ──────────────────────────────────────────────────────────────────

pub struct KpiAnalytics<'a, S: KpiSource> {
    source: &'a S,
    config: &'a KpiConfig,
}

impl<'a, S: KpiSource> KpiAnalytics<'a, S> {
    pub fn new(source: &'a S, config: &'a KpiConfig) -> Self {
        Self { source, config }
    }

    /// Selected brokers with their margins for `year`.
    pub fn broker_metrics(&self, filter: &BrokerFilter, year: Year) -> KpiResult<Vec<BrokerMetrics>> {
        let brokers = self.source.get_brokers(filter, year)?;
        if brokers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<AgentId> = brokers.iter().map(|b| b.agent_id).collect();
        let points = self.source.get_points_summary(&ids, year)?;
        let social_security = self.source.get_social_security_summary(&ids, year)?;
        Ok(enrich(brokers, year, &points, &social_security))
    }

    pub fn margin_analysis(
        &self,
        filter: &BrokerFilter,
        group_by: &str,
        cross_group_by: Option<&str>,
        year: Year,
    ) -> KpiResult<MarginAnalysis> {
        let entities = self.broker_metrics(filter, year)?;
        let row_field = GroupField::from_name(group_by);

        let layout = match cross_group_by {
            Some(col) => MarginLayout::Cross(aggregate_cross(
                &entities,
                &row_field,
                &GroupField::from_name(col),
                year,
            )),
            None => MarginLayout::Grouped {
                groups: aggregate(&entities, &row_field, year),
            },
        };
        let summary = if entities.is_empty() {
            None
        } else {
            let all: Vec<&BrokerMetrics> = entities.iter().collect();
            Some(GroupStats::compute("all", &all, year))
        };

        log::debug!(
            "analytics: margin {year} by {row_field}, {} brokers",
            entities.len()
        );
        Ok(MarginAnalysis {
            year,
            layout,
            summary,
        })
    }

    /// Cohort retention per group. Year-dependent filter conditions are
    /// evaluated against the configured default year.
    pub fn retention_analysis(
        &self,
        filter: &BrokerFilter,
        group_by: &str,
    ) -> KpiResult<RetentionAnalysis> {
        let brokers = self.source.get_brokers(filter, self.config.default_year)?;
        let field = GroupField::from_name(group_by);
        Ok(RetentionAnalysis {
            groups: retention_by_group(&brokers, &field),
            years_after_join: YEARS_AFTER_JOIN.to_vec(),
        })
    }

    /// Per-group yearly averages of `metric`. Fails with `UnsupportedKind`
    /// before touching the source when the metric name is unknown.
    pub fn efficiency_trend(
        &self,
        filter: &BrokerFilter,
        group_by: &str,
        metric: &str,
    ) -> KpiResult<EfficiencyTrend> {
        let metric: EfficiencyMetric = metric.parse()?;
        let brokers = self.source.get_brokers(filter, self.config.default_year)?;
        let margins = if metric.needs_margins() {
            self.margin_book(&brokers)?
        } else {
            MarginBook::default()
        };
        let field = GroupField::from_name(group_by);
        Ok(EfficiencyTrend {
            metric,
            groups: efficiency_by_group(&brokers, &field, metric, &margins),
            years: SUPPORTED_YEARS.to_vec(),
        })
    }

    fn margin_book(&self, brokers: &[Broker]) -> KpiResult<MarginBook> {
        let mut book = MarginBook::default();
        if brokers.is_empty() {
            return Ok(book);
        }
        let ids: Vec<AgentId> = brokers.iter().map(|b| b.agent_id).collect();
        for year in SUPPORTED_YEARS {
            let points = self.source.get_points_summary(&ids, year)?;
            let social_security = self.source.get_social_security_summary(&ids, year)?;
            for broker in brokers {
                let net = points.get(&broker.agent_id).map_or(0.0, |p| p.net);
                let ss = social_security.get(&broker.agent_id).copied().unwrap_or(0.0);
                book.insert(MarginRecord::compute(broker, year, net, ss));
            }
        }
        Ok(book)
    }

    pub fn export_table(&self, kind: &str, params: &ExportParams) -> KpiResult<ExportTable> {
        let kind: ExportKind = kind.parse()?;
        let table = match kind {
            ExportKind::Margin => self.margin_table(params)?,
            ExportKind::Retention => self.retention_table(params)?,
            ExportKind::Efficiency => self.efficiency_table(params)?,
        };
        log::info!(
            "analytics: exported {} table with {} rows",
            kind.as_str(),
            table.rows.len()
        );
        Ok(table)
    }

    fn margin_table(&self, params: &ExportParams) -> KpiResult<ExportTable> {
        let analysis = self.margin_analysis(&params.filter, &params.group_by, None, params.year)?;
        let groups = match analysis.layout {
            MarginLayout::Grouped { groups } => groups,
            MarginLayout::Cross(_) => Vec::new(),
        };
        let headers = [
            "group_name",
            "broker_count",
            "total_fyc",
            "total_income",
            "total_points",
            "total_social_security",
            "total_margin",
            "margin_rate",
            "avg_fyp",
            "avg_ape",
            "avg_fyc",
            "avg_margin",
        ];
        let rows = groups
            .iter()
            .map(|g| {
                vec![
                    json!(g.group_name),
                    json!(g.broker_count),
                    json!(g.total_fyc),
                    json!(g.total_income),
                    json!(g.total_points),
                    json!(g.total_social_security),
                    json!(g.total_margin),
                    json!(g.margin_rate),
                    json!(g.avg_fyp),
                    json!(g.avg_ape),
                    json!(g.avg_fyc),
                    json!(g.avg_margin),
                ]
            })
            .collect();
        Ok(table(ExportKind::Margin, &headers, rows))
    }

    fn retention_table(&self, params: &ExportParams) -> KpiResult<ExportTable> {
        let analysis = self.retention_analysis(&params.filter, &params.group_by)?;
        let headers = [
            "group_name",
            "join_year",
            "year",
            "years_after_join",
            "active_count",
            "fyp",
            "count_retention",
            "amount_retention",
        ];
        let mut rows = Vec::new();
        for group in &analysis.groups {
            for cohort in &group.cohorts {
                for y in &cohort.years {
                    rows.push(vec![
                        json!(group.group_name),
                        json!(cohort.join_year),
                        json!(y.year),
                        json!(y.years_after_join),
                        json!(y.active_count),
                        json!(y.fyp),
                        json!(y.count_retention),
                        json!(y.amount_retention),
                    ]);
                }
            }
        }
        Ok(table(ExportKind::Retention, &headers, rows))
    }

    fn efficiency_table(&self, params: &ExportParams) -> KpiResult<ExportTable> {
        let trend = self.efficiency_trend(&params.filter, &params.group_by, &params.metric)?;
        let headers = ["group_name", "year", "active_count", "value", "yoy_change"];
        let mut rows = Vec::new();
        for group in &trend.groups {
            for point in &group.points {
                rows.push(vec![
                    json!(group.group_name),
                    json!(point.year),
                    json!(point.active_count),
                    json!(point.value),
                    json!(point.yoy_change),
                ]);
            }
        }
        Ok(table(ExportKind::Efficiency, &headers, rows))
    }
}

fn table(kind: ExportKind, headers: &[&str], rows: Vec<Vec<Value>>) -> ExportTable {
    ExportTable {
        kind,
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}
