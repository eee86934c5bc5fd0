//! kpi-runner: headless ingestion and reporting for the broker KPI store.
//!
//! Usage:
//!   kpi-runner --db kpi.db --ingest batch.json
//!   kpi-runner --db kpi.db --report margin --group-by region --year 2024
//!   kpi-runner --db kpi.db --report drilldown --group-by region --group-value Beijing
//!   kpi-runner --db kpi.db --export efficiency --metric avg_fyc --out trend.json

use anyhow::{Context, Result};
use broker_kpi_core::{
    analytics::ExportParams,
    config::KpiConfig,
    engine::KpiEngine,
    filter::BrokerFilter,
    group_aggregator::GroupField,
    ingest::RawBatch,
    store::KpiStore,
    types::Year,
};
use serde::Serialize;
use std::env;
use std::fs;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let config = match str_arg(&args, "--config") {
        Some(path) => KpiConfig::load(path)?,
        None => KpiConfig::default(),
    };
    let filter: BrokerFilter = match str_arg(&args, "--filter") {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing filter {path}"))?
        }
        None => BrokerFilter::default(),
    };
    let year: Year = parse_arg(&args, "--year", config.default_year);
    let group_by = str_arg(&args, "--group-by").unwrap_or("region");
    let cross_group_by = str_arg(&args, "--cross-group-by");
    let metric = str_arg(&args, "--metric").unwrap_or("avg_fyp");

    println!("kpi-runner");
    println!("  db:        {db}");
    println!("  year:      {year}");
    println!("  group_by:  {group_by}");
    println!();

    let store = KpiStore::open(db)?;
    store.migrate()?;
    let engine = KpiEngine::build(store, config);

    if args.iter().any(|a| a == "--clear") {
        engine.clear()?;
        println!("all data cleared");
    }

    if let Some(path) = str_arg(&args, "--ingest") {
        let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let raw = RawBatch::from_json(&text).with_context(|| format!("parsing batch {path}"))?;
        let outcome = engine.ingest(&raw)?;
        println!("=== INGEST ===");
        println!("  batch:            {}", outcome.save.batch_id);
        println!("  brokers:          {}", outcome.save.brokers_upserted);
        println!("  points entries:   {}", outcome.save.points_inserted);
        println!("  social security:  {}", outcome.save.social_security_inserted);
        println!(
            "  matched:          {}/{} ({:.1}%)",
            outcome.report.matched_count,
            outcome.report.total,
            outcome.report.match_rate * 100.0
        );
        for sample in &outcome.report.unmatched_samples {
            println!(
                "    unmatched: {} ({})",
                sample.name,
                sample.region.as_deref().unwrap_or("-")
            );
        }
        println!();
    }

    let analytics = engine.analytics();
    if let Some(report) = str_arg(&args, "--report") {
        match report {
            "margin" => print_json(&analytics.margin_analysis(&filter, group_by, cross_group_by, year)?)?,
            "retention" => print_json(&analytics.retention_analysis(&filter, group_by)?)?,
            "efficiency" => print_json(&analytics.efficiency_trend(&filter, group_by, metric)?)?,
            "summary" => print_json(&engine.store.data_summary()?)?,
            "filters" => print_json(&engine.store.filter_options()?)?,
            "drilldown" => {
                let value = str_arg(&args, "--group-value")
                    .context("--report drilldown needs --group-value")?;
                let field = GroupField::from_name(group_by);
                print_json(&engine.store.brokers_by_group(&field, value, &filter, year)?)?
            }
            "unmatched" => print_json(
                &engine
                    .store
                    .unmatched_social_security(engine.config.unmatched_sample_limit)?,
            )?,
            other => anyhow::bail!("unknown report '{other}'"),
        }
    }

    if let Some(kind) = str_arg(&args, "--export") {
        let params = ExportParams {
            filter: filter.clone(),
            group_by: group_by.to_string(),
            year,
            metric: metric.to_string(),
        };
        let table = analytics.export_table(kind, &params)?;
        let out = str_arg(&args, "--out").unwrap_or("export.json");
        fs::write(out, serde_json::to_string_pretty(&table)?)
            .with_context(|| format!("writing {out}"))?;
        log::info!("runner: {kind} export written to {out}");
        println!("exported {} rows to {out}", table.rows.len());
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
