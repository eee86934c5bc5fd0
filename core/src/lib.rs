pub mod analytics;
pub mod config;
pub mod dataset;
pub mod efficiency;
pub mod engine;
pub mod error;
pub mod filter;
pub mod group_aggregator;
pub mod identity_matcher;
pub mod ingest;
pub mod margin;
pub mod model;
pub mod phonetic;
pub mod region;
pub mod retention;
pub mod source;
pub mod store;
pub mod types;
