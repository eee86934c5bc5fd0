//! Broker filters shared by the SQLite store and the in-memory dataset.

use crate::{
    config::PremiumTier,
    model::Broker,
    types::Year,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qualification {
    Qualified,
    NotQualified,
}

/// Conjunctive filter; `None` fields impose no condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerFilter {
    pub region: Option<String>,
    pub join_year: Option<Year>,
    pub is_peer: Option<String>,
    pub personal_level: Option<String>,
    pub manager_level: Option<String>,
    pub director_level: Option<String>,
    /// Tested against the selected year's qualification flag.
    pub md_qualified: Option<Qualification>,
    /// Tier label over the selected year's FYP.
    pub fyp_tier: Option<String>,
    /// Tier label over the selected year's APE.
    pub ape_tier: Option<String>,
}

fn text_eq(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(w) => actual.as_deref() == Some(w.as_str()),
        None => true,
    }
}

impl BrokerFilter {
    pub fn is_empty(&self) -> bool {
        *self == BrokerFilter::default()
    }

    /// Equality conditions on broker attributes.
    pub fn matches_attributes(&self, broker: &Broker) -> bool {
        text_eq(&self.region, &broker.region)
            && self.join_year.map_or(true, |y| broker.join_year == Some(y))
            && text_eq(&self.is_peer, &broker.is_peer)
            && text_eq(&self.personal_level, &broker.personal_level)
            && text_eq(&self.manager_level, &broker.manager_level)
            && text_eq(&self.director_level, &broker.director_level)
    }

    /// Conditions on the selected year's figures. Unknown tier labels
    /// impose no condition.
    pub fn matches_year(&self, broker: &Broker, year: Year, tiers: &[PremiumTier]) -> bool {
        let figures = broker.year(year);
        let qualified_ok = match self.md_qualified {
            Some(Qualification::Qualified) => figures.md_qualified,
            Some(Qualification::NotQualified) => !figures.md_qualified,
            None => true,
        };
        qualified_ok
            && tier_ok(&self.fyp_tier, figures.fyp, tiers)
            && tier_ok(&self.ape_tier, figures.ape, tiers)
    }

    pub fn matches(&self, broker: &Broker, year: Year, tiers: &[PremiumTier]) -> bool {
        self.matches_attributes(broker) && self.matches_year(broker, year, tiers)
    }
}

fn tier_ok(label: &Option<String>, value: f64, tiers: &[PremiumTier]) -> bool {
    let Some(label) = label else {
        return true;
    };
    match tiers.iter().find(|t| &t.label == label) {
        Some(tier) => tier.contains(value),
        None => {
            log::debug!("filter: unknown tier label '{label}' ignored");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::default_tiers, model::YearFigures};

    fn broker() -> Broker {
        let mut b = Broker::new(7);
        b.region = Some("Beijing".into());
        b.join_year = Some(2021);
        b.with_year(
            2024,
            YearFigures {
                fyp: 60_000.0,
                ape: 10_000.0,
                md_qualified: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = BrokerFilter::default();
        assert!(f.is_empty());
        assert!(f.matches(&broker(), 2024, &default_tiers()));
    }

    #[test]
    fn attribute_and_year_conditions_combine() {
        let tiers = default_tiers();
        let f = BrokerFilter {
            region: Some("Beijing".into()),
            md_qualified: Some(Qualification::Qualified),
            fyp_tier: Some("50k-100k".into()),
            ..Default::default()
        };
        assert!(f.matches(&broker(), 2024, &tiers));
        // 2023 has no figures: not qualified, FYP 0 is outside the tier
        assert!(!f.matches(&broker(), 2023, &tiers));

        let other_region = BrokerFilter {
            region: Some("Tianjin".into()),
            ..Default::default()
        };
        assert!(!other_region.matches(&broker(), 2024, &tiers));
    }

    #[test]
    fn unknown_tier_is_ignored() {
        let f = BrokerFilter {
            ape_tier: Some("gold".into()),
            ..Default::default()
        };
        assert!(f.matches(&broker(), 2024, &default_tiers()));
    }
}
