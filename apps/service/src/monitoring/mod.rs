pub mod probe;
/// Health monitoring module - probing targets and scheduling probe loops
///
/// This module is responsible for:
/// - Executing single HTTP probes and classifying their outcome
/// - Running one periodic, cancellable probe loop per configured check
/// - Validating check definitions before any probing starts
pub mod scheduler;
pub mod types;
pub mod validation;

pub use probe::Prober;
pub use scheduler::{CheckDefinition, HealthScheduler, StatusHandler};
pub use types::HealthStatus;
