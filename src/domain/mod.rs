pub mod activation;
pub mod generator;
pub mod models;
pub mod trigger;
