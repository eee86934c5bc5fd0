//! Ingestion coercion: raw extract rows to typed records.
//!
//! The spreadsheet collaborator hands over arrays of JSON objects keyed by
//! canonical field names. Nothing here fails: malformed numbers become 0,
//! rows without a usable broker id are dropped, unparseable dates become
//! `None`.

use crate::{
    config::KpiConfig,
    model::{Broker, PointsKind, PointsLedgerEntry, SocialSecurityRecord, YearFigures},
    types::{AgentId, Year, SUPPORTED_YEARS},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type RawRow = Map<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBatch {
    pub brokers: Vec<RawRow>,
    pub points: Vec<RawRow>,
    pub social_security: Vec<RawRow>,
    /// `pe_id -> uid`
    pub mapping: Map<String, Value>,
}

impl RawBatch {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestBatch {
    pub brokers: Vec<Broker>,
    pub points: Vec<PointsLedgerEntry>,
    pub social_security: Vec<SocialSecurityRecord>,
    pub id_mapping: BTreeMap<String, AgentId>,
}

impl IngestBatch {
    pub fn from_raw(raw: &RawBatch, config: &KpiConfig) -> Self {
        let brokers: Vec<Broker> = raw
            .brokers
            .iter()
            .filter_map(|row| broker_from_row(row, config))
            .collect();
        let points: Vec<PointsLedgerEntry> = raw
            .points
            .iter()
            .filter_map(|row| points_from_row(row, config))
            .collect();
        let social_security: Vec<SocialSecurityRecord> = raw
            .social_security
            .iter()
            .filter_map(social_security_from_row)
            .collect();
        let id_mapping: BTreeMap<String, AgentId> = raw
            .mapping
            .iter()
            .filter_map(|(pe_id, uid)| coerce_agent_id(uid).map(|uid| (pe_id.clone(), uid)))
            .collect();

        let dropped = raw.brokers.len() - brokers.len();
        if dropped > 0 {
            log::warn!("ingest: dropped {dropped} broker rows without a usable agent_id");
        }
        log::info!(
            "ingest: {} brokers, {} points entries, {} social-security records, {} id mappings",
            brokers.len(),
            points.len(),
            social_security.len(),
            id_mapping.len()
        );

        Self {
            brokers,
            points,
            social_security,
            id_mapping,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
            && self.points.is_empty()
            && self.social_security.is_empty()
            && self.id_mapping.is_empty()
    }
}

// ── Row conversion ───────────────────────────────────────────────────────────

fn field<'a>(row: &'a RawRow, key: &str) -> &'a Value {
    row.get(key).unwrap_or(&Value::Null)
}

fn broker_from_row(row: &RawRow, config: &KpiConfig) -> Option<Broker> {
    let agent_id = coerce_agent_id(field(row, "agent_id"))?;
    let mut broker = Broker::new(agent_id);

    broker.name = coerce_text(field(row, "name"));
    broker.region = coerce_text(field(row, "region"));
    broker.education = coerce_text(field(row, "education"));
    broker.years_of_service = coerce_int(field(row, "years"));
    broker.personal_level = coerce_text(field(row, "personal_level"));
    broker.manager_level = coerce_text(field(row, "manager_level"));
    broker.director_level = coerce_text(field(row, "director_level"));
    broker.team_leader_id = coerce_agent_id(field(row, "team_leader_id"));
    broker.is_peer = coerce_text(field(row, "is_peer"));

    let join_date = coerce_text(field(row, "join_date")).and_then(|t| parse_date(&t));
    broker.join_date = join_date.map(|d| d.format("%Y-%m-%d").to_string());
    broker.join_year = join_date
        .map(|d| d.year())
        .or_else(|| coerce_int(field(row, "join_year")).map(|y| y as Year));

    for year in SUPPORTED_YEARS {
        let figures = YearFigures {
            income: coerce_f64(field(row, &format!("income_{year}"))),
            fyp: coerce_f64(field(row, &format!("fyp_{year}"))),
            ape: coerce_f64(field(row, &format!("ape_{year}"))),
            fyc: coerce_f64(field(row, &format!("fyc_{year}"))),
            md_qualified: coerce_flag(field(row, &format!("md_qualified_{year}")), config),
        };
        if figures != YearFigures::default() {
            broker.set_year(year, figures);
        }
    }
    Some(broker)
}

fn points_from_row(row: &RawRow, config: &KpiConfig) -> Option<PointsLedgerEntry> {
    let raw_id = field(row, "agent_id");
    if let Value::String(s) = raw_id {
        if s.trim().starts_with(config.note_marker.as_str()) {
            return None;
        }
    }
    let agent_id = coerce_agent_id(raw_id)?;

    let kind = coerce_text(field(row, "transaction_type"))
        .map(|label| points_kind(&label, config))
        .unwrap_or(PointsKind::Other);
    let transaction_time = coerce_text(field(row, "transaction_time"));
    let year = coerce_int(field(row, "transaction_year"))
        .map(|y| y as Year)
        .or_else(|| transaction_time.as_deref().and_then(parse_date).map(|d| d.year()));

    Some(PointsLedgerEntry {
        agent_id,
        is_active: coerce_text(field(row, "is_active")),
        kind,
        amount: coerce_f64(field(row, "amount")),
        category: coerce_text(field(row, "category")),
        director_team_amount: coerce_f64(field(row, "director_team_amount")),
        transaction_time,
        year,
        channel: coerce_text(field(row, "channel")),
        order_name: coerce_text(field(row, "order_name")),
        order_id: coerce_text(field(row, "order_id")),
        remark: coerce_text(field(row, "remark")),
    })
}

fn social_security_from_row(row: &RawRow) -> Option<SocialSecurityRecord> {
    let name = coerce_text(field(row, "name"))?;
    let employer_total = coerce_f64(field(row, "company_total"));
    if employer_total <= 0.0 {
        return None;
    }
    let bill_name = coerce_text(field(row, "bill_name"));
    // The bill name embeds the paying branch when no region column exists.
    let region = coerce_text(field(row, "region")).or_else(|| bill_name.clone());

    Some(SocialSecurityRecord {
        name,
        bill_name,
        service_month: normalize_service_month(field(row, "service_month")),
        employer_total,
        personal_total: coerce_f64(field(row, "personal_total")),
        total: coerce_f64(field(row, "total")),
        region,
        matched_agent_id: coerce_agent_id(field(row, "matched_agent_id")),
    })
}

fn points_kind(label: &str, config: &KpiConfig) -> PointsKind {
    if config.grant_labels.iter().any(|l| l == label) {
        PointsKind::Grant
    } else if config.deduction_labels.iter().any(|l| l == label) {
        PointsKind::Deduction
    } else {
        PointsKind::Other
    }
}

// ── Scalar coercion ──────────────────────────────────────────────────────────

/// Numeric value of a cell; 0 for anything malformed or missing.
pub fn coerce_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v,
        _ => {
            if !value.is_null() {
                log::debug!("ingest: coerced malformed number {value} to 0");
            }
            0.0
        }
    }
}

/// Broker id from integers, integer-valued floats or their text forms
/// (`"12345"`, `"12345.0"`).
pub fn coerce_agent_id(value: &Value) -> Option<AgentId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| whole_in_range(*f)).map(|f| f as i64)),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|f| whole_in_range(*f))
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Whole number that `as i64` converts without saturating.
fn whole_in_range(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64
}

fn coerce_int(value: &Value) -> Option<i64> {
    coerce_agent_id(value)
}

/// Trimmed text; numbers are rendered, blanks and nulls are `None`.
pub fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_flag(value: &Value, config: &KpiConfig) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::String(s) => {
            let t = s.trim();
            t == config.qualified_label || t.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}

/// Parse dates written as `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD` or a
/// date-time with either separator.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(dt.date());
        }
    }
    // ISO timestamps with fractional seconds or offsets.
    t.get(0..10)
        .filter(|_| t.len() > 10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

/// Service month as `YYYY-MM`. Accepts `YYYY-MM`, `YYYY/MM`, `YYYYMM`,
/// `YYYY年MM月`, full dates and spreadsheet numbers like `202403`.
pub fn normalize_service_month(value: &Value) -> Option<String> {
    let text = match value {
        Value::Number(n) => n.as_f64().map(|f| format!("{}", f as i64))?,
        other => coerce_text(other)?,
    };
    if let Some(date) = parse_date(&text) {
        return Some(format!("{:04}-{:02}", date.year(), date.month()));
    }

    let digits: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect();
    let (year, month) = match digits.as_slice() {
        [ym] if *ym >= 100_000 && *ym <= 999_999 => (ym / 100, ym % 100),
        [y, m, ..] => (*y, *m),
        _ => return None,
    };
    if !(1000..=9999).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{year:04}-{month:02}"))
}
