//! Beacon — report onboarding pipeline.

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod queue;
pub mod reports;
pub mod store;
pub mod worker;
