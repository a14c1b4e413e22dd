//! Health Sync: daily health-data ingestion and reporting.

pub mod biometrics;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod remote;
pub mod report;
pub mod store;
