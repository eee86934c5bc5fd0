//! End-to-end ingestion through the engine: coercion, matching, persistence
//! and analytics over the stored data.

use broker_kpi_core::{
    analytics::{ExportKind, ExportParams, MarginLayout},
    engine::KpiEngine,
    error::KpiError,
    filter::BrokerFilter,
    ingest::RawBatch,
};
use serde_json::json;

fn sample_batch() -> RawBatch {
    let text = json!({
        "brokers": [
            {
                "agent_id": "1001.0",
                "name": "张三",
                "region": "江苏",
                "join_date": "2021/03/15",
                "fyp_2024": "120,000",
                "fyc_2024": 40000,
                "income_2024": 10000,
                "md_qualified_2024": "符合"
            },
            { "agent_id": 1002, "name": "李四", "region": "北京", "fyc_2024": "n/a", "fyp_2024": 5000 },
            { "agent_id": "", "name": "no id" }
        ],
        "points": [
            { "agent_id": 1001, "transaction_type": "积分发放", "amount": 1000, "transaction_time": "2024-04-01 10:00:00" },
            { "agent_id": 1001, "transaction_type": "积分扣减", "amount": -200, "transaction_year": 2024 },
            { "agent_id": "注：本表为示例" }
        ],
        "social_security": [
            { "name": "Zhang San", "region": "Nanjing", "service_month": "2024年05月", "company_total": 3000 },
            { "name": "Wang Wu", "bill_name": "上海分公司", "service_month": 202405, "company_total": 800 },
            { "name": "Li Si", "service_month": "2024-05", "company_total": 0 }
        ],
        "mapping": { "PE-1001": "1001" }
    })
    .to_string();
    RawBatch::from_json(&text).unwrap()
}

#[test]
fn ingest_matches_and_persists() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = KpiEngine::build_test().unwrap();
    let outcome = engine.ingest(&sample_batch()).unwrap();

    assert_eq!(outcome.save.brokers_upserted, 2, "row without id is dropped");
    assert_eq!(outcome.save.points_inserted, 2, "note row is skipped");
    assert_eq!(outcome.save.social_security_inserted, 2, "zero employer total is skipped");
    assert_eq!(outcome.save.mapping_upserted, 1);

    assert_eq!(outcome.report.total, 2);
    assert_eq!(outcome.report.matched_count, 1);
    assert_eq!(outcome.report.unmatched_samples[0].name, "Wang Wu");

    let broker = engine.store.get_broker(1001).unwrap().unwrap();
    assert_eq!(broker.join_year, Some(2021));
    assert_eq!(broker.year(2024).fyp, 120_000.0);
    assert!(broker.year(2024).md_qualified);
    let other = engine.store.get_broker(1002).unwrap().unwrap();
    assert_eq!(other.year(2024).fyc, 0.0, "malformed number coerced to zero");
}

#[test]
fn later_batches_match_against_stored_brokers() {
    let engine = KpiEngine::build_test().unwrap();
    engine.ingest(&sample_batch()).unwrap();

    let follow_up = RawBatch::from_json(
        &json!({
            "social_security": [
                { "name": "李四", "region": "北京", "service_month": "2024-06", "company_total": 500 }
            ]
        })
        .to_string(),
    )
    .unwrap();
    let outcome = engine.ingest(&follow_up).unwrap();
    assert_eq!(outcome.report.matched_count, 1);

    let ss = engine.store.social_security_summary(&[1002], 2024).unwrap();
    assert_eq!(ss[&1002], 500.0);
}

#[test]
fn margin_over_stored_data() {
    let engine = KpiEngine::build_test().unwrap();
    engine.ingest(&sample_batch()).unwrap();

    let analysis = engine
        .analytics()
        .margin_analysis(&BrokerFilter::default(), "region", None, 2024)
        .unwrap();
    let MarginLayout::Grouped { groups } = analysis.layout else {
        panic!("expected grouped layout");
    };
    let jiangsu = groups.iter().find(|g| g.group_name == "江苏").unwrap();
    // 40000 - 10000 - (1000 - 200) - 3000
    assert_eq!(jiangsu.total_margin, 26_200.0);
    assert_eq!(jiangsu.margin_rate, 0.655);
}

#[test]
fn export_tables_flatten_results() {
    let engine = KpiEngine::build_test().unwrap();
    engine.ingest(&sample_batch()).unwrap();
    let analytics = engine.analytics();
    let params = ExportParams::default();

    let margin = analytics.export_table("margin", &params).unwrap();
    assert_eq!(margin.kind, ExportKind::Margin);
    assert_eq!(margin.headers[0], "group_name");
    assert_eq!(margin.rows.len(), 2);
    assert!(margin.rows.iter().all(|r| r.len() == margin.headers.len()));

    let efficiency = analytics.export_table("efficiency", &params).unwrap();
    // Two regions, one point per supported year each.
    assert_eq!(efficiency.rows.len(), 8);

    let retention = analytics.export_table("retention", &params).unwrap();
    assert_eq!(retention.headers.len(), 8);
}

#[test]
fn unknown_export_kind_is_rejected() {
    let engine = KpiEngine::build_test().unwrap();
    let err = engine
        .analytics()
        .export_table("pdf", &ExportParams::default())
        .unwrap_err();
    assert!(
        matches!(err, KpiError::UnsupportedKind { ref kind } if kind == "pdf"),
        "got {err}"
    );
}
