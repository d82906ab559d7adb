pub mod audit;
pub mod clock;
pub mod config;
pub mod conformity;
pub mod criteria_manifest;
pub mod db;
pub mod error;
pub mod migrations;
pub mod reports;
pub mod schema;
pub mod snapshot;
pub mod statistics;
pub mod store;
pub mod unit_of_work;

pub use sinalux_records as records;
