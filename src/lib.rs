pub mod augment;
pub mod boosting;
pub mod config;
pub mod encoding;
pub mod error;
pub mod export;
pub mod feature_generator;
pub mod forest;
pub mod form;
pub mod head_to_head;
pub mod ingest;
pub mod integrate;
pub mod market_odds;
pub mod match_record;
pub mod metrics;
pub mod model;
pub mod model_data;
pub mod pipeline;
pub mod predict;
pub mod registry;
pub mod sample_data;
pub mod schedule;
pub mod team_names;
pub mod trainer;
pub mod tree;
pub mod venue_split;
pub mod weather;
