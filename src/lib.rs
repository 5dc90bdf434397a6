//! Standards mastery classification and reconciliation for Group Scholar
//! classrooms.

pub mod aggregate;
pub mod blend;
pub mod cache;
pub mod config;
pub mod cycle;
pub mod db;
pub mod engine;
pub mod error;
pub mod intervention;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod thresholds;

pub use engine::{EngineConfig, MasteryEngine};
pub use error::MasteryError;
