//! Retention cohorts by join year.

use broker_kpi_core::{
    analytics::KpiAnalytics,
    config::{default_tiers, KpiConfig},
    dataset::Dataset,
    filter::BrokerFilter,
    model::{Broker, YearFigures},
    retention::base_year_for,
};

fn fyp(v: f64) -> YearFigures {
    YearFigures {
        fyp: v,
        ..Default::default()
    }
}

fn joined(agent_id: i64, join_year: i32, region: &str, yearly_fyp: &[(i32, f64)]) -> Broker {
    let mut b = Broker::new(agent_id);
    b.join_year = Some(join_year);
    b.region = Some(region.into());
    for (year, v) in yearly_fyp {
        b.set_year(*year, fyp(*v));
    }
    b
}

#[test]
fn legacy_joins_are_pinned_to_first_data_year() {
    assert_eq!(base_year_for(2015), 2022);
    assert_eq!(base_year_for(2022), 2022);
    assert_eq!(base_year_for(2024), 2024);
}

#[test]
fn base_year_retention_is_exactly_one() {
    let data = Dataset::new(default_tiers()).with_brokers([
        joined(1, 2019, "Beijing", &[(2022, 100.0), (2023, 50.0)]),
        joined(2, 2023, "Beijing", &[(2023, 10.0)]),
        joined(3, 2023, "Beijing", &[(2023, 30.0), (2024, 60.0)]),
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .retention_analysis(&BrokerFilter::default(), "region")
        .unwrap();

    assert_eq!(analysis.years_after_join, vec![1, 2, 3, 4]);
    for group in &analysis.groups {
        for cohort in &group.cohorts {
            let base = &cohort.years[0];
            assert_eq!(base.year, cohort.base_year);
            assert_eq!(base.years_after_join, 0);
            assert_eq!(
                base.count_retention, 1.0,
                "cohort {} base year must retain everyone",
                cohort.join_year
            );
        }
    }
}

#[test]
fn denominator_is_fixed_to_base_active_set() {
    // Broker 12 is inactive in 2023 and active in 2024: it never enters.
    let data = Dataset::new(default_tiers()).with_brokers([
        joined(10, 2023, "Shanghai", &[(2023, 100.0), (2024, 150.0)]),
        joined(11, 2023, "Shanghai", &[(2023, 100.0)]),
        joined(12, 2023, "Shanghai", &[(2024, 999.0)]),
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .retention_analysis(&BrokerFilter::default(), "region")
        .unwrap();

    let cohort = &analysis.groups[0].cohorts[0];
    assert_eq!(cohort.base_year, 2023);
    assert_eq!(cohort.base_count, 2);
    assert_eq!(cohort.base_fyp, 200.0);

    let years: Vec<i32> = cohort.years.iter().map(|y| y.year).collect();
    assert_eq!(years, vec![2023, 2024, 2025], "no year before the base year");

    let y2024 = &cohort.years[1];
    assert_eq!(y2024.active_count, 1);
    assert_eq!(y2024.count_retention, 0.5);
    assert_eq!(y2024.fyp, 150.0);
    assert_eq!(y2024.amount_retention, 0.75);

    let y2025 = &cohort.years[2];
    assert_eq!(y2025.active_count, 0);
    assert_eq!(y2025.count_retention, 0.0);
}

#[test]
fn amount_retention_may_exceed_one() {
    let data = Dataset::new(default_tiers())
        .with_brokers([joined(1, 2024, "Beijing", &[(2024, 100.0), (2025, 300.0)])]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .retention_analysis(&BrokerFilter::default(), "region")
        .unwrap();
    let y2025 = &analysis.groups[0].cohorts[0].years[1];
    assert_eq!(y2025.amount_retention, 3.0);
}

#[test]
fn cohorts_without_base_activity_or_join_year_are_dropped() {
    let mut no_join = Broker::new(3).with_year(2022, fyp(10.0));
    no_join.region = Some("Beijing".into());
    let data = Dataset::new(default_tiers()).with_brokers([
        joined(1, 2024, "Beijing", &[(2025, 100.0)]),
        no_join,
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .retention_analysis(&BrokerFilter::default(), "region")
        .unwrap();
    assert_eq!(analysis.groups.len(), 1);
    assert!(analysis.groups[0].cohorts.is_empty());
}
