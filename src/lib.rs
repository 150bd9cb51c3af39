pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod freshness;
mod http;
pub mod output;
pub mod run_log;
pub mod store;
pub mod sync;
pub mod transfer;
