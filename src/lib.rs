pub mod analysis;
pub mod anomaly;
pub mod backtest;
pub mod calibration;
pub mod config;
pub mod elo;
pub mod ensemble;
pub mod error;
pub mod ev;
pub mod form;
pub mod historical_store;
pub mod http_client;
pub mod league_summary;
pub mod logging;
pub mod market;
pub mod match_store;
pub mod models;
pub mod odds_feed;
pub mod report_export;
pub mod sample_data;
pub mod sentiment;
pub mod team_stats;
