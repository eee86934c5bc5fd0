//! Efficiency trends and year-over-year change.

use broker_kpi_core::{
    analytics::KpiAnalytics,
    config::{default_tiers, KpiConfig},
    dataset::Dataset,
    error::KpiError,
    filter::BrokerFilter,
    model::{Broker, PointsKind, PointsLedgerEntry, YearFigures},
};

fn figures(fyp: f64, fyc: f64) -> YearFigures {
    YearFigures {
        fyp,
        ape: fyp / 2.0,
        fyc,
        ..Default::default()
    }
}

fn broker(agent_id: i64, region: &str, years: &[(i32, f64, f64)]) -> Broker {
    let mut b = Broker::new(agent_id);
    b.region = Some(region.into());
    for (year, fyp, fyc) in years {
        b.set_year(*year, figures(*fyp, *fyc));
    }
    b
}

#[test]
fn averages_over_active_brokers_with_yoy() {
    let data = Dataset::new(default_tiers()).with_brokers([
        broker(1, "Beijing", &[(2022, 100.0, 10.0), (2023, 300.0, 30.0)]),
        broker(2, "Beijing", &[(2022, 300.0, 30.0)]),
    ]);
    let config = KpiConfig::default_test();
    let trend = KpiAnalytics::new(&data, &config)
        .efficiency_trend(&BrokerFilter::default(), "region", "avg_fyp")
        .unwrap();

    assert_eq!(trend.years, vec![2022, 2023, 2024, 2025]);
    let points = &trend.groups[0].points;
    assert_eq!(points[0].active_count, 2);
    assert_eq!(points[0].value, 200.0);
    assert_eq!(points[0].yoy_change, None, "first year has no prior value");
    assert_eq!(points[1].active_count, 1);
    assert_eq!(points[1].value, 300.0);
    assert_eq!(points[1].yoy_change, Some(0.5));
}

#[test]
fn empty_year_reports_zero_and_keeps_previous_average() {
    let data = Dataset::new(default_tiers()).with_brokers([broker(
        1,
        "Beijing",
        &[(2022, 100.0, 0.0), (2024, 150.0, 0.0)],
    )]);
    let config = KpiConfig::default_test();
    let trend = KpiAnalytics::new(&data, &config)
        .efficiency_trend(&BrokerFilter::default(), "region", "avg_fyp")
        .unwrap();
    let points = &trend.groups[0].points;

    assert_eq!(points[1].active_count, 0);
    assert_eq!(points[1].value, 0.0);
    assert_eq!(points[1].yoy_change, None);
    // 2024 compares against 2022, the last year with activity.
    assert_eq!(points[2].yoy_change, Some(0.5));
}

#[test]
fn zero_previous_average_gives_no_yoy() {
    // Active (FYP > 0) but zero FYC in 2022.
    let data = Dataset::new(default_tiers()).with_brokers([broker(
        1,
        "Beijing",
        &[(2022, 100.0, 0.0), (2023, 100.0, 50.0)],
    )]);
    let config = KpiConfig::default_test();
    let trend = KpiAnalytics::new(&data, &config)
        .efficiency_trend(&BrokerFilter::default(), "region", "avg_fyc")
        .unwrap();
    let points = &trend.groups[0].points;
    assert_eq!(points[0].value, 0.0);
    assert_eq!(points[1].value, 50.0);
    assert_eq!(points[1].yoy_change, None);
}

#[test]
fn avg_margin_uses_each_years_points() {
    let data = Dataset::new(default_tiers())
        .with_brokers([broker(1, "Beijing", &[(2023, 100.0, 1_000.0), (2024, 100.0, 2_000.0)])])
        .with_points([PointsLedgerEntry::new(1, PointsKind::Grant, 400.0, 2024)]);
    let config = KpiConfig::default_test();
    let trend = KpiAnalytics::new(&data, &config)
        .efficiency_trend(&BrokerFilter::default(), "region", "avg_margin")
        .unwrap();
    let points = &trend.groups[0].points;
    assert_eq!(points[1].value, 1_000.0);
    assert_eq!(points[2].value, 1_600.0);
    assert_eq!(points[2].yoy_change, Some(0.6));
}

#[test]
fn unknown_metric_is_unsupported_kind() {
    let data = Dataset::new(default_tiers());
    let config = KpiConfig::default_test();
    let err = KpiAnalytics::new(&data, &config)
        .efficiency_trend(&BrokerFilter::default(), "region", "avg_happiness")
        .unwrap_err();
    match err {
        KpiError::UnsupportedKind { kind } => assert_eq!(kind, "avg_happiness"),
        other => panic!("expected UnsupportedKind, got {other}"),
    }
}
