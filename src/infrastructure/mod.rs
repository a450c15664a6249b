pub mod config;
pub mod error;
pub mod record_mapper;
pub mod record_store;
pub mod rest_store;
pub mod session_store;
