//! Core of VolleyStat: domain model, the storage port, and the services that
//! record matches, fan out notifications and export reports.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod export;
pub mod metrics;
pub mod observers;
pub mod ports;
pub mod training;
pub mod utils;
