use super::{DataSummary, FilterOptions, KpiStore};
use crate::{
    error::KpiResult,
    types::{Year, SUPPORTED_YEARS},
};
use rusqlite::OptionalExtension;
use std::collections::BTreeMap;

impl KpiStore {
    fn distinct_text(&self, column: &str) -> KpiResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM broker
             WHERE {column} IS NOT NULL AND {column} != '' ORDER BY {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn count(&self, sql: &str) -> KpiResult<i64> {
        Ok(self.conn.query_row(sql, [], |r| r.get(0))?)
    }

    /// Distinct attribute values available for filtering, plus the
    /// configured tier labels and the supported years.
    pub fn filter_options(&self) -> KpiResult<FilterOptions> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT join_year FROM broker
             WHERE join_year IS NOT NULL ORDER BY join_year",
        )?;
        let join_years = stmt
            .query_map([], |r| r.get::<_, Year>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterOptions {
            regions: self.distinct_text("region")?,
            join_years,
            is_peer: self.distinct_text("is_peer")?,
            personal_levels: self.distinct_text("personal_level")?,
            manager_levels: self.distinct_text("manager_level")?,
            director_levels: self.distinct_text("director_level")?,
            educations: self.distinct_text("education")?,
            tiers: self.tiers.iter().map(|t| t.label.clone()).collect(),
            years: SUPPORTED_YEARS.to_vec(),
        })
    }

    /// Row counts, active brokers per year and the latest ingestion batch.
    pub fn data_summary(&self) -> KpiResult<DataSummary> {
        let mut active_brokers = BTreeMap::new();
        for year in SUPPORTED_YEARS {
            let n = self.count(&format!("SELECT COUNT(*) FROM broker WHERE fyp_{year} > 0"))?;
            active_brokers.insert(year, n);
        }

        let last = self
            .conn
            .query_row(
                "SELECT batch_id, ingested_at FROM ingest_batch
                 ORDER BY ingested_at DESC, rowid DESC LIMIT 1",
                [],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        let (last_batch_id, last_updated_at) = match last {
            Some((id, at)) => (Some(id), Some(at)),
            None => (None, None),
        };

        Ok(DataSummary {
            total_brokers: self.count("SELECT COUNT(*) FROM broker")?,
            active_brokers,
            points_records: self.count("SELECT COUNT(*) FROM points_ledger")?,
            social_security_records: self.count("SELECT COUNT(*) FROM social_security")?,
            matched_social_security_records: self.count(
                "SELECT COUNT(*) FROM social_security WHERE matched_agent_id IS NOT NULL",
            )?,
            last_updated_at,
            last_batch_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ingest::IngestBatch,
        model::{Broker, YearFigures},
    };

    #[test]
    fn empty_store_summary_has_no_batch() {
        let store = KpiStore::in_memory().unwrap();
        store.migrate().unwrap();
        let summary = store.data_summary().unwrap();
        assert_eq!(summary.total_brokers, 0);
        assert!(summary.last_batch_id.is_none());
        assert_eq!(summary.active_brokers.len(), SUPPORTED_YEARS.len());
    }

    #[test]
    fn filter_options_are_sorted_and_distinct() {
        let store = KpiStore::in_memory().unwrap();
        store.migrate().unwrap();
        let mut a = Broker::new(1);
        a.region = Some("Shanghai".into());
        a.join_year = Some(2023);
        let mut b = Broker::new(2).with_year(
            2024,
            YearFigures {
                fyp: 10.0,
                ..Default::default()
            },
        );
        b.region = Some("Beijing".into());
        b.join_year = Some(2021);
        let mut c = Broker::new(3);
        c.region = Some("Beijing".into());

        let batch = IngestBatch {
            brokers: vec![a, b, c],
            ..Default::default()
        };
        store.save_batch(&batch).unwrap();

        let options = store.filter_options().unwrap();
        assert_eq!(options.regions, vec!["Beijing", "Shanghai"]);
        assert_eq!(options.join_years, vec![2021, 2023]);
        assert_eq!(options.years, SUPPORTED_YEARS.to_vec());
        assert_eq!(options.tiers.len(), store.tiers().len());

        let summary = store.data_summary().unwrap();
        assert_eq!(summary.total_brokers, 3);
        assert_eq!(summary.active_brokers[&2024], 1);
        assert!(summary.last_batch_id.is_some());
    }
}
