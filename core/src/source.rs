//! Storage collaborator contract.
//!
//! RULE: analytics read data only through KpiSource. Both the SQLite
//! store and the in-memory dataset implement it.

use crate::{
    error::KpiResult,
    filter::BrokerFilter,
    model::{Broker, PointsSummary},
    types::{AgentId, Year},
};
use std::collections::HashMap;

pub trait KpiSource {
    /// Brokers passing `filter`, ordered by agent id. `year` selects the
    /// figures that year-dependent filter conditions look at.
    fn get_brokers(&self, filter: &BrokerFilter, year: Year) -> KpiResult<Vec<Broker>>;

    /// Points totals for `year`. An empty `ids` slice means every broker.
    /// Brokers without ledger entries are absent from the map.
    fn get_points_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, PointsSummary>>;

    /// Employer-borne social-security totals for `year`, keyed by matched
    /// broker. An empty `ids` slice means every broker.
    fn get_social_security_summary(
        &self,
        ids: &[AgentId],
        year: Year,
    ) -> KpiResult<HashMap<AgentId, f64>>;
}
