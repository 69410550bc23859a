pub mod asset_reconciliation;
pub mod audit;
pub mod config_normalizer;
pub mod developer_directory;
pub mod input_format;
pub mod property_config;
pub mod property_metrics;
pub mod storage;
pub mod submission;
pub mod wizard;
