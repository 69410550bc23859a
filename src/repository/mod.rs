pub mod property_store;
pub mod table_service;
