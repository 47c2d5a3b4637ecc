pub mod config;
pub mod error;
pub mod notification;
pub mod settings_store;
pub mod storage;
