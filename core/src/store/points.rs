use super::{id_list, KpiStore, ID_CHUNK};
use crate::{
    error::KpiResult,
    model::{PointsKind, PointsLedgerEntry, PointsSummary},
    types::{AgentId, Year},
};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection};
use std::collections::HashMap;

pub(super) fn insert_entries(
    conn: &Connection,
    batch_id: &str,
    entries: &[PointsLedgerEntry],
) -> KpiResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO points_ledger (
             batch_id, agent_id, is_active, kind, amount, category,
             director_team_amount, transaction_time, transaction_year,
             channel, order_name, order_id, remark
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
    )?;
    for e in entries {
        stmt.execute(params![
            batch_id,
            e.agent_id,
            e.is_active,
            e.kind.as_str(),
            e.amount,
            e.category,
            e.director_team_amount,
            e.transaction_time,
            e.year,
            e.channel,
            e.order_name,
            e.order_id,
            e.remark,
        ])?;
    }
    Ok(entries.len())
}

impl KpiStore {
    /// Granted, used (absolute deductions) and net points per broker.
    pub fn points_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, PointsSummary>> {
        let base = "SELECT agent_id,
                        COALESCE(SUM(CASE WHEN kind = 'grant' THEN amount ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN kind = 'deduction' THEN ABS(amount) ELSE 0 END), 0)
                    FROM points_ledger WHERE transaction_year = ?";

        let mut summary = HashMap::new();
        let mut run = |extra: &str, mut values: Vec<SqlValue>| -> KpiResult<()> {
            values.insert(0, SqlValue::Integer(i64::from(year)));
            let sql = format!("{base}{extra} GROUP BY agent_id");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?))
            })?;
            for row in rows {
                let (id, granted, used) = row?;
                summary.insert(id, PointsSummary::new(granted, used));
            }
            Ok(())
        };

        if ids.is_empty() {
            run("", Vec::new())?;
        } else {
            for chunk in ids.chunks(ID_CHUNK) {
                let (list, values) = id_list(chunk);
                run(&format!(" AND agent_id IN {list}"), values)?;
            }
        }
        Ok(summary)
    }

    pub fn points_entries(&self, agent_id: AgentId) -> KpiResult<Vec<PointsLedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, is_active, kind, amount, category, director_team_amount,
                    transaction_time, transaction_year, channel, order_name, order_id, remark
             FROM points_ledger WHERE agent_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![agent_id], |r| {
            Ok(PointsLedgerEntry {
                agent_id: r.get(0)?,
                is_active: r.get(1)?,
                kind: PointsKind::from_stored(&r.get::<_, String>(2)?),
                amount: r.get(3)?,
                category: r.get(4)?,
                director_team_amount: r.get(5)?,
                transaction_time: r.get(6)?,
                year: r.get(7)?,
                channel: r.get(8)?,
                order_name: r.get(9)?,
                order_id: r.get(10)?,
                remark: r.get(11)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
