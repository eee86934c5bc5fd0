//! Margin analysis over the in-memory dataset.

use broker_kpi_core::{
    analytics::{KpiAnalytics, MarginLayout},
    config::{default_tiers, KpiConfig},
    dataset::Dataset,
    filter::BrokerFilter,
    model::{Broker, PointsKind, PointsLedgerEntry, SocialSecurityRecord, YearFigures},
};

const EPS: f64 = 1e-6;

fn broker(agent_id: i64, region: &str, level: &str, fyc: f64, income: f64) -> Broker {
    let mut b = Broker::new(agent_id).with_year(
        2024,
        YearFigures {
            income,
            fyp: fyc * 2.0,
            ape: fyc * 1.5,
            fyc,
            md_qualified: false,
        },
    );
    b.region = Some(region.into());
    b.personal_level = Some(level.into());
    b
}

fn grouped(layout: MarginLayout) -> Vec<broker_kpi_core::group_aggregator::GroupStats> {
    match layout {
        MarginLayout::Grouped { groups } => groups,
        MarginLayout::Cross(_) => panic!("expected grouped layout"),
    }
}

#[test]
fn beijing_pair_sums_to_expected_margin() {
    let data = Dataset::new(default_tiers()).with_brokers([
        broker(1, "Beijing", "A", 100_000.0, 20_000.0),
        broker(2, "Beijing", "A", 50_000.0, 10_000.0),
    ]);
    let config = KpiConfig::default_test();
    let analytics = KpiAnalytics::new(&data, &config);

    let analysis = analytics
        .margin_analysis(&BrokerFilter::default(), "region", None, 2024)
        .unwrap();
    let groups = grouped(analysis.layout);
    assert_eq!(groups.len(), 1);
    let beijing = &groups[0];
    assert_eq!(beijing.group_name, "Beijing");
    assert_eq!(beijing.broker_count, 2);
    assert!((beijing.total_fyc - 150_000.0).abs() < EPS);
    assert!((beijing.total_margin - 120_000.0).abs() < EPS);
    assert!((beijing.margin_rate - 0.8).abs() < EPS);
}

#[test]
fn points_and_social_security_reduce_margin() {
    let mut ss = SocialSecurityRecord::new("张三", "北京", "2024-05", 1_500.0);
    ss.matched_agent_id = Some(1);
    let mut other_year = SocialSecurityRecord::new("张三", "北京", "2023-12", 9_999.0);
    other_year.matched_agent_id = Some(1);

    let data = Dataset::new(default_tiers())
        .with_brokers([broker(1, "Beijing", "A", 10_000.0, 2_000.0)])
        .with_points([
            PointsLedgerEntry::new(1, PointsKind::Grant, 800.0, 2024),
            PointsLedgerEntry::new(1, PointsKind::Deduction, -300.0, 2024),
            PointsLedgerEntry::new(1, PointsKind::Grant, 5_000.0, 2023),
        ])
        .with_social_security([ss, other_year]);
    let config = KpiConfig::default_test();
    let analytics = KpiAnalytics::new(&data, &config);

    let metrics = analytics
        .broker_metrics(&BrokerFilter::default(), 2024)
        .unwrap();
    let m = &metrics[0].margin;
    assert!((m.net_points - 500.0).abs() < EPS, "net = 800 - |−300|");
    assert!((m.employer_ss - 1_500.0).abs() < EPS, "only 2024 service months");
    // 10000 - 2000 - 500 - 1500
    assert!((m.margin - 6_000.0).abs() < EPS);
    assert!((m.margin_rate - 0.6).abs() < EPS);
}

#[test]
fn zero_fyc_gives_zero_rate_not_nan() {
    let data = Dataset::new(default_tiers()).with_brokers([broker(1, "Beijing", "A", 0.0, 3_000.0)]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .margin_analysis(&BrokerFilter::default(), "region", None, 2024)
        .unwrap();
    let groups = grouped(analysis.layout);
    assert_eq!(groups[0].margin_rate, 0.0);
    assert!((groups[0].total_margin + 3_000.0).abs() < EPS);
}

#[test]
fn groups_sorted_by_rate_and_partition_sums_to_total() {
    let data = Dataset::new(default_tiers()).with_brokers([
        broker(1, "Beijing", "A", 100_000.0, 80_000.0),
        broker(2, "Shanghai", "B", 100_000.0, 10_000.0),
        broker(3, "Tianjin", "A", 50_000.0, 25_000.0),
        broker(4, "Shanghai", "A", 30_000.0, 3_000.0),
        broker(5, "", "B", 20_000.0, 1_000.0),
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .margin_analysis(&BrokerFilter::default(), "region", None, 2024)
        .unwrap();
    let summary = analysis.summary.clone().unwrap();
    let groups = grouped(analysis.layout);

    for pair in groups.windows(2) {
        assert!(
            pair[0].margin_rate >= pair[1].margin_rate,
            "{} ({}) sorted before {} ({})",
            pair[0].group_name,
            pair[0].margin_rate,
            pair[1].group_name,
            pair[1].margin_rate
        );
    }
    assert!(
        groups.iter().any(|g| g.group_name == "unknown"),
        "blank region falls into the unknown bucket"
    );

    let partition_margin: f64 = groups.iter().map(|g| g.total_margin).sum();
    let partition_count: usize = groups.iter().map(|g| g.broker_count).sum();
    assert!((partition_margin - summary.total_margin).abs() < 0.01);
    assert_eq!(partition_count, summary.broker_count);
}

#[test]
fn cross_tab_has_sorted_axes_placeholders_and_total() {
    let data = Dataset::new(default_tiers()).with_brokers([
        broker(1, "Shanghai", "B", 10_000.0, 1_000.0),
        broker(2, "Beijing", "A", 10_000.0, 2_000.0),
        broker(3, "Beijing", "B", 20_000.0, 2_000.0),
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .margin_analysis(&BrokerFilter::default(), "region", Some("personal_level"), 2024)
        .unwrap();

    let MarginLayout::Cross(tab) = analysis.layout else {
        panic!("expected cross layout");
    };
    assert_eq!(tab.columns, vec!["A", "B", "Total"]);
    let row_names: Vec<&str> = tab.rows.iter().map(|r| r.row_name.as_str()).collect();
    assert_eq!(row_names, vec!["Beijing", "Shanghai"]);

    let shanghai = &tab.rows[1];
    assert_eq!(shanghai.cells.len(), 3);
    assert_eq!(shanghai.cells[0].broker_count, 0, "empty cell is a zero placeholder");
    assert_eq!(shanghai.cells[0].margin_rate, 0.0);

    let beijing_total = &tab.rows[0].cells[2];
    assert_eq!(beijing_total.group_name, "Total");
    assert_eq!(beijing_total.broker_count, 2);
    assert!((beijing_total.total_fyc - 30_000.0).abs() < EPS);
}

#[test]
fn empty_selection_yields_empty_groups_and_no_summary() {
    let data = Dataset::new(default_tiers()).with_brokers([broker(1, "Beijing", "A", 1.0, 0.0)]);
    let config = KpiConfig::default_test();
    let filter = BrokerFilter {
        region: Some("Chongqing".into()),
        ..Default::default()
    };
    let analysis = KpiAnalytics::new(&data, &config)
        .margin_analysis(&filter, "region", None, 2024)
        .unwrap();
    assert!(analysis.summary.is_none());
    assert!(grouped(analysis.layout).is_empty());
}

#[test]
fn unrecognized_group_field_buckets_everyone_as_unknown() {
    let data = Dataset::new(default_tiers()).with_brokers([
        broker(1, "Beijing", "A", 1_000.0, 0.0),
        broker(2, "Shanghai", "B", 1_000.0, 0.0),
    ]);
    let config = KpiConfig::default_test();
    let analysis = KpiAnalytics::new(&data, &config)
        .margin_analysis(&BrokerFilter::default(), "favourite_colour", None, 2024)
        .unwrap();
    let groups = grouped(analysis.layout);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].group_name, "unknown");
    assert_eq!(groups[0].broker_count, 2);
}
