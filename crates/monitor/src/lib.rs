//! Warden Monitor - watches for behavioral and file-level deviation
//!
//! # Key Types
//! - `DriftMonitor`: relative deviation of numeric metrics from a fixed baseline
//! - `IntegrityValidator`: content hashes of a fixed artifact manifest
//! - `SilentMonitor`: folds drift, integrity and compliance into one alert level

pub mod drift;
pub mod error;
pub mod integrity;
pub mod silent;

pub use drift::{DriftConfig, DriftMonitor, Observation};
pub use error::MonitorError;
pub use integrity::{IntegrityReport, IntegrityValidator};
pub use silent::{
    Alert, AlertKind, AlertLevel, HealingAction, HealthSample, SilentMonitor, SystemObservation,
};
