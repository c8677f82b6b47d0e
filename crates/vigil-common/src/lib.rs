//! ---
//! vigil_section: "01-core-functionality"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Shared primitives and utilities for the control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
//! Core shared primitives for the Vigil workspace.
//! This crate exposes configuration loading, tracing initialisation and the
//! clock abstraction consumed by the breaker and SLO components.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    load_table, AppConfig, BreakerSettings, LoadedAppConfig, LoggingConfig, RolloutConfig,
    ServicesConfig, SloConfig, SloDefinitionConfig, StageConfig,
};
pub use logging::{init_console, init_tracing, LogFormat};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
