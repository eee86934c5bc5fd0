use super::{id_list, KpiStore, ID_CHUNK};
use crate::{
    error::KpiResult,
    model::SocialSecurityRecord,
    types::{AgentId, Year},
};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection};
use std::collections::HashMap;

pub(super) fn insert_records(
    conn: &Connection,
    batch_id: &str,
    records: &[SocialSecurityRecord],
) -> KpiResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO social_security (
             batch_id, name, bill_name, service_month, employer_total,
             personal_total, total, region, matched_agent_id
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
    )?;
    for r in records {
        stmt.execute(params![
            batch_id,
            r.name,
            r.bill_name,
            r.service_month,
            r.employer_total,
            r.personal_total,
            r.total,
            r.region,
            r.matched_agent_id,
        ])?;
    }
    Ok(records.len())
}

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SocialSecurityRecord> {
    Ok(SocialSecurityRecord {
        name: r.get(0)?,
        bill_name: r.get(1)?,
        service_month: r.get(2)?,
        employer_total: r.get(3)?,
        personal_total: r.get(4)?,
        total: r.get(5)?,
        region: r.get(6)?,
        matched_agent_id: r.get(7)?,
    })
}

const RECORD_COLUMNS: &str = "name, bill_name, service_month, employer_total,
                              personal_total, total, region, matched_agent_id";

impl KpiStore {
    /// Employer-borne contributions per matched broker whose service month
    /// falls in `year`.
    pub fn social_security_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, f64>> {
        let base = "SELECT matched_agent_id, COALESCE(SUM(employer_total), 0)
                    FROM social_security
                    WHERE matched_agent_id IS NOT NULL AND service_month LIKE ?";
        let month_pattern = format!("{year}-%");

        let mut summary = HashMap::new();
        let mut run = |extra: &str, mut values: Vec<SqlValue>| -> KpiResult<()> {
            values.insert(0, SqlValue::Text(month_pattern.clone()));
            let sql = format!("{base}{extra} GROUP BY matched_agent_id");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (id, total) = row?;
                summary.insert(id, total);
            }
            Ok(())
        };

        if ids.is_empty() {
            run("", Vec::new())?;
        } else {
            for chunk in ids.chunks(ID_CHUNK) {
                let (list, values) = id_list(chunk);
                run(&format!(" AND matched_agent_id IN {list}"), values)?;
            }
        }
        Ok(summary)
    }

    /// Oldest unmatched records first, at most `limit`.
    pub fn unmatched_social_security(&self, limit: usize) -> KpiResult<Vec<SocialSecurityRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM social_security
             WHERE matched_agent_id IS NULL ORDER BY id ASC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], record_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
