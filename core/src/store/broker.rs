use super::{int_value, text_value, BrokerDetail, KpiStore, PointsYearTotal, SocialSecurityMonth};
use crate::{
    error::KpiResult,
    filter::BrokerFilter,
    group_aggregator::GroupField,
    model::{Broker, YearFigures},
    types::{AgentId, Year, SUPPORTED_YEARS},
};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension, Row};

const ATTRIBUTE_COLUMNS: [&str; 11] = [
    "name",
    "education",
    "region",
    "years_of_service",
    "personal_level",
    "manager_level",
    "director_level",
    "join_date",
    "join_year",
    "team_leader_id",
    "is_peer",
];

fn yearly_columns() -> Vec<String> {
    SUPPORTED_YEARS
        .iter()
        .flat_map(|y| {
            [
                format!("income_{y}"),
                format!("fyp_{y}"),
                format!("ape_{y}"),
                format!("fyc_{y}"),
                format!("md_qualified_{y}"),
            ]
        })
        .collect()
}

fn broker_values(b: &Broker, updated_at: &str) -> Vec<SqlValue> {
    let mut values = vec![
        SqlValue::Integer(b.agent_id),
        text_value(&b.name),
        text_value(&b.education),
        text_value(&b.region),
        int_value(b.years_of_service),
        text_value(&b.personal_level),
        text_value(&b.manager_level),
        text_value(&b.director_level),
        text_value(&b.join_date),
        int_value(b.join_year.map(i64::from)),
        int_value(b.team_leader_id),
        text_value(&b.is_peer),
    ];
    for year in SUPPORTED_YEARS {
        let f = b.year(year);
        values.push(SqlValue::Real(f.income));
        values.push(SqlValue::Real(f.fyp));
        values.push(SqlValue::Real(f.ape));
        values.push(SqlValue::Real(f.fyc));
        values.push(SqlValue::Integer(i64::from(f.md_qualified)));
    }
    values.push(SqlValue::Text(updated_at.to_string()));
    values
}

pub(super) fn upsert_brokers(
    conn: &Connection,
    brokers: &[Broker],
    updated_at: &str,
) -> KpiResult<usize> {
    let mut columns: Vec<String> = ATTRIBUTE_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(yearly_columns());
    columns.push("updated_at".into());

    let placeholders = vec!["?"; columns.len() + 1].join(", ");
    let assignments = columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO broker (agent_id, {}) VALUES ({placeholders})
         ON CONFLICT(agent_id) DO UPDATE SET {assignments}",
        columns.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    for broker in brokers {
        stmt.execute(params_from_iter(broker_values(broker, updated_at)))?;
    }
    Ok(brokers.len())
}

fn broker_from_row(row: &Row<'_>) -> rusqlite::Result<Broker> {
    let mut broker = Broker {
        agent_id: row.get("agent_id")?,
        name: row.get("name")?,
        region: row.get("region")?,
        education: row.get("education")?,
        years_of_service: row.get("years_of_service")?,
        personal_level: row.get("personal_level")?,
        manager_level: row.get("manager_level")?,
        director_level: row.get("director_level")?,
        join_date: row.get("join_date")?,
        join_year: row.get("join_year")?,
        team_leader_id: row.get("team_leader_id")?,
        is_peer: row.get("is_peer")?,
        figures: Default::default(),
    };
    for year in SUPPORTED_YEARS {
        let figures = YearFigures {
            income: row.get(format!("income_{year}").as_str())?,
            fyp: row.get(format!("fyp_{year}").as_str())?,
            ape: row.get(format!("ape_{year}").as_str())?,
            fyc: row.get(format!("fyc_{year}").as_str())?,
            md_qualified: row.get::<_, i64>(format!("md_qualified_{year}").as_str())? != 0,
        };
        if figures != YearFigures::default() {
            broker.set_year(year, figures);
        }
    }
    Ok(broker)
}

impl KpiStore {
    /// Brokers passing `filter`. Attribute equality is pushed into SQL;
    /// qualification and tier conditions depend on `year` and are applied
    /// to the loaded rows.
    pub fn brokers(&self, filter: &BrokerFilter, year: Year) -> KpiResult<Vec<Broker>> {
        let mut sql = String::from("SELECT * FROM broker WHERE 1=1");
        let mut values: Vec<SqlValue> = Vec::new();

        let text_conditions = [
            ("region", &filter.region),
            ("is_peer", &filter.is_peer),
            ("personal_level", &filter.personal_level),
            ("manager_level", &filter.manager_level),
            ("director_level", &filter.director_level),
        ];
        for (column, wanted) in text_conditions {
            if let Some(v) = wanted {
                sql.push_str(&format!(" AND {column} = ?"));
                values.push(SqlValue::Text(v.clone()));
            }
        }
        if let Some(join_year) = filter.join_year {
            sql.push_str(" AND join_year = ?");
            values.push(SqlValue::Integer(i64::from(join_year)));
        }
        sql.push_str(" ORDER BY agent_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), broker_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|b| filter.matches_year(b, year, &self.tiers))
            .collect())
    }

    pub fn get_broker(&self, agent_id: AgentId) -> KpiResult<Option<Broker>> {
        let mut stmt = self.conn.prepare("SELECT * FROM broker WHERE agent_id = ?1")?;
        let broker = stmt
            .query_row(params![agent_id], broker_from_row)
            .optional()?;
        Ok(broker)
    }

    pub fn broker_count(&self) -> KpiResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM broker", [], |r| r.get(0))?)
    }

    /// Broker with per-year points totals and matched social-security months.
    pub fn get_broker_detail(&self, agent_id: AgentId) -> KpiResult<Option<BrokerDetail>> {
        let Some(broker) = self.get_broker(agent_id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT transaction_year, kind, SUM(amount)
             FROM points_ledger WHERE agent_id = ?1
             GROUP BY transaction_year, kind
             ORDER BY transaction_year, kind",
        )?;
        let points = stmt
            .query_map(params![agent_id], |r| {
                Ok(PointsYearTotal {
                    year: r.get(0)?,
                    kind: r.get(1)?,
                    total_amount: r.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT service_month, employer_total, personal_total
             FROM social_security WHERE matched_agent_id = ?1
             ORDER BY service_month",
        )?;
        let social_security = stmt
            .query_map(params![agent_id], |r| {
                Ok(SocialSecurityMonth {
                    service_month: r.get(0)?,
                    employer_total: r.get(1)?,
                    personal_total: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(BrokerDetail {
            broker,
            points,
            social_security,
        }))
    }

    /// Drill-down: brokers of one group under the same bucketing rules the
    /// aggregator uses ("unknown" selects brokers missing the attribute).
    pub fn brokers_by_group(
        &self,
        field: &GroupField,
        value: &str,
        filter: &BrokerFilter,
        year: Year,
    ) -> KpiResult<Vec<Broker>> {
        Ok(self
            .brokers(filter, year)?
            .into_iter()
            .filter(|b| field.group_of(b) == value)
            .collect())
    }
}
