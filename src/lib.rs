//! No-show guard library
//!
//! Risk scoring for upcoming service appointments and threshold-based
//! operational alerting on the fleet-wide no-show KPIs.

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod notifications;
pub mod repositories;
pub mod services;
