//! Configuration for the scene engine.
//!
//! # Module structure
//!
//! - [`types`]: the root [`EngineConfig`] struct and its field defaults.
//! - [`logging`]: logging configuration and level/format enums.
//! - [`loader`]: layered loading (defaults -> file -> env overrides).
//! - [`validation`]: a separate, non-fatal sanity pass over a loaded config.

pub mod loader;
pub mod logging;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use types::{EngineConfig, SceneDefinition, SceneKind};
pub use validation::validate_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reconnection_grace_s, 30);
        assert_eq!(config.pyodide_load_timeout_s, 60);
        assert_eq!(config.probe_timeout_ms, 10_000);
        assert_eq!(config.input_buffer_size, 8);
        assert_eq!(config.input_delay_frames, 0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, back.port);
        assert_eq!(config.experiment_id, back.experiment_id);
    }
}
