//! HTTP surface: decisions, health, statistics, readiness and metrics.

pub mod auth;
pub mod decision;
pub mod error;
pub mod health;
pub mod router;
pub mod statistics;


pub use router::{create_router, AppState};
