//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Analytics read through the KpiSource trait; they never execute SQL.
//! Every query recomputes from source rows, there is no cache above it.

use crate::{
    config::{default_tiers, PremiumTier},
    error::KpiResult,
    filter::BrokerFilter,
    ingest::IngestBatch,
    model::{Broker, PointsSummary},
    source::KpiSource,
    types::{AgentId, Year},
};
use rusqlite::{types::Value as SqlValue, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

mod broker;
mod points;
mod social_security;
mod summary;

/// Largest id list bound into a single `IN (...)` clause.
const ID_CHUNK: usize = 500;

pub struct KpiStore {
    conn: Connection,
    tiers: Vec<PremiumTier>,
}

impl KpiStore {
    pub fn open(path: &str) -> KpiResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            tiers: default_tiers(),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> KpiResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            tiers: default_tiers(),
        })
    }

    /// Premium tiers used to resolve tier filter labels.
    pub fn with_tiers(mut self, tiers: Vec<PremiumTier>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn tiers(&self) -> &[PremiumTier] {
        &self.tiers
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> KpiResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_schema.sql"))?;
        Ok(())
    }

    // ── Ingestion ──────────────────────────────────────────────

    /// Persist one ingestion batch. Brokers upsert by id (last write wins);
    /// ledger and social-security rows append; mappings upsert by pe_id.
    pub fn save_batch(&self, batch: &IngestBatch) -> KpiResult<SaveSummary> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        let brokers_upserted = broker::upsert_brokers(&tx, &batch.brokers, &now)?;
        let points_inserted = points::insert_entries(&tx, &batch_id, &batch.points)?;
        let social_security_inserted =
            social_security::insert_records(&tx, &batch_id, &batch.social_security)?;

        let mut mapping_upserted = 0;
        for (pe_id, uid) in &batch.id_mapping {
            tx.execute(
                "INSERT INTO id_mapping (pe_id, uid) VALUES (?1, ?2)
                 ON CONFLICT(pe_id) DO UPDATE SET uid = excluded.uid",
                rusqlite::params![pe_id, uid],
            )?;
            mapping_upserted += 1;
        }

        let matched_count = batch
            .social_security
            .iter()
            .filter(|r| r.matched_agent_id.is_some())
            .count();
        tx.execute(
            "INSERT INTO ingest_batch (
                 batch_id, ingested_at, broker_count, points_count,
                 social_security_count, matched_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                batch_id,
                now,
                brokers_upserted as i64,
                points_inserted as i64,
                social_security_inserted as i64,
                matched_count as i64,
            ],
        )?;
        tx.commit()?;

        let summary = SaveSummary {
            batch_id,
            brokers_upserted,
            points_inserted,
            social_security_inserted,
            mapping_upserted,
            matched_count,
        };
        log::info!(
            "store: batch {} saved ({} brokers, {} points, {} social security, {} mappings)",
            summary.batch_id,
            summary.brokers_upserted,
            summary.points_inserted,
            summary.social_security_inserted,
            summary.mapping_upserted
        );
        Ok(summary)
    }

    /// Full data reset. The only path that deletes brokers.
    pub fn clear_all(&self) -> KpiResult<()> {
        self.conn.execute_batch(
            "DELETE FROM social_security;
             DELETE FROM points_ledger;
             DELETE FROM id_mapping;
             DELETE FROM ingest_batch;
             DELETE FROM broker;",
        )?;
        log::info!("store: all business data cleared");
        Ok(())
    }

    pub fn id_mapping(&self) -> KpiResult<BTreeMap<String, AgentId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT pe_id, uid FROM id_mapping ORDER BY pe_id")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(Into::into)
    }
}

impl KpiSource for KpiStore {
    fn get_brokers(&self, filter: &BrokerFilter, year: Year) -> KpiResult<Vec<Broker>> {
        self.brokers(filter, year)
    }

    fn get_points_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, PointsSummary>> {
        self.points_summary(ids, year)
    }

    fn get_social_security_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, f64>> {
        self.social_security_summary(ids, year)
    }
}

/// `(?, ?, ...)` placeholder list plus the bound values for an id chunk.
fn id_list(ids: &[AgentId]) -> (String, Vec<SqlValue>) {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let values = ids.iter().map(|id| SqlValue::Integer(*id)).collect();
    (format!("({placeholders})"), values)
}

fn text_value(v: &Option<String>) -> SqlValue {
    v.clone().map_or(SqlValue::Null, SqlValue::Text)
}

fn int_value(v: Option<i64>) -> SqlValue {
    v.map_or(SqlValue::Null, SqlValue::Integer)
}

// ── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub batch_id: String,
    pub brokers_upserted: usize,
    pub points_inserted: usize,
    pub social_security_inserted: usize,
    pub mapping_upserted: usize,
    pub matched_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsYearTotal {
    pub year: Option<Year>,
    pub kind: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSecurityMonth {
    pub service_month: Option<String>,
    pub employer_total: f64,
    pub personal_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerDetail {
    pub broker: Broker,
    pub points: Vec<PointsYearTotal>,
    pub social_security: Vec<SocialSecurityMonth>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub join_years: Vec<Year>,
    pub is_peer: Vec<String>,
    pub personal_levels: Vec<String>,
    pub manager_levels: Vec<String>,
    pub director_levels: Vec<String>,
    pub educations: Vec<String>,
    pub tiers: Vec<String>,
    pub years: Vec<Year>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_brokers: i64,
    pub active_brokers: BTreeMap<Year, i64>,
    pub points_records: i64,
    pub social_security_records: i64,
    pub matched_social_security_records: i64,
    pub last_updated_at: Option<String>,
    pub last_batch_id: Option<String>,
}
