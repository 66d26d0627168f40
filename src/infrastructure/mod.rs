pub mod config;
pub mod error;
pub mod repository;
pub mod sqlite_store;
pub mod storage;
