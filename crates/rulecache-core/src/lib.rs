pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod model;
pub mod plan_log;
pub mod providers;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod schema;
pub mod storage;
